//! # Tree Rewriting
//!
//! `ExprRewriter` walks an `Expr` depth first. `pre_visit` runs on the way down
//! and may stop the descent into a subtree; `post_visit` runs on the way up,
//! after every child has been rewritten, and returns the node that replaces the
//! visited one. Simplification is written as a post-visit rewrite, so a parent
//! always sees already-simplified children.

use crate::error::Result;
use crate::expr::Expr;

/// Whether the walk descends into the children of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recursion {
    Continue,
    Skip,
}

/// A bottom-up tree rewrite with an optional top-down pruning hook.
pub trait ExprRewriter {
    fn pre_visit(&mut self, _expr: &Expr) -> Result<Recursion> {
        Ok(Recursion::Continue)
    }

    /// Replace a node whose children have already been rewritten.
    fn post_visit(&mut self, expr: Expr) -> Result<Expr>;
}

impl Expr {
    /// Rewrite this tree with `rewriter`, returning the replacement root.
    pub fn rewrite<R: ExprRewriter + ?Sized>(mut self, rewriter: &mut R) -> Result<Expr> {
        if rewriter.pre_visit(&self)? == Recursion::Continue {
            for child in self.children_mut() {
                let taken = std::mem::replace(child, Expr::boolean(true));
                *child = taken.rewrite(rewriter)?;
            }
        }
        rewriter.post_visit(self)
    }
}
