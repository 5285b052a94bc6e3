//! # Candidate Plan Builder
//!
//! Builds one concrete operator tree from a `(seed, predicate order)` pair. The
//! same pair always yields the same tree, which is what lets the search keep
//! only seeds and orders in its beam.
//!
//! ## Procedure
//!
//! Every relation starts as its own *dangling* tree. Until no predicate is
//! left, a schedulable predicate is picked by walking the order and taking
//! each schedulable one with probability 1/2 (so early entries are favoured):
//!
//! - touching one tree, it becomes a `single_filter` on that tree, evaluated
//!   through an index when the tree is the bare relation;
//! - touching several trees, they are joined under it (extras are first
//!   Cartesian-joined onto the left side);
//! - an outer-join predicate joins its left-side trees with its right branch,
//!   assembled from all right-branch trees into one right input.
//!
//! Leftover trees are paired off at random with Cartesian joins. Static
//! predicates become a `static_filter` at the root, and a `sort` is added on
//! top when a requested order is not already the root's natural order.
//!
//! ## Scheduling Constraints
//!
//! A predicate is schedulable when all its relations are present and:
//!
//! - the tree it produces is either inside or disjoint from the right branch
//!   of every pending outer join;
//! - as an outer join, every tree meeting its right branch lies entirely in
//!   it, at least one tree lies outside it, and no predicate inside the branch
//!   is still pending;
//! - with a `right_dependancy`, no pending outer join's right branch
//!   intersects it.

use crate::graph::Relation;
use crate::predicate::QueryPredicate;
use qplan_core::error::{PlanError, Result};
use qplan_core::expr::{
    Expr, ExprKind, FilterKind, FunctionOp, IndexCandidate, JoinStrategy, JoinType, SortKey,
    TableName,
};
use qplan_core::properties::{natural_order, order_satisfies};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

/// Everything the builder needs, prepared once per planning call.
#[derive(Debug, Clone, Default)]
pub struct PlanInput {
    pub relations: Vec<Relation>,
    pub predicates: Vec<QueryPredicate>,
    /// Predicates without any relation dependency.
    pub statics: Vec<Expr>,
    pub order: Vec<SortKey>,
    /// Index able to deliver `order` when scanned first.
    pub sort_index: Option<IndexCandidate>,
}

/// A partial plan and the relations it covers.
#[derive(Debug)]
struct Dangling {
    tables: BTreeSet<TableName>,
    expr: Expr,
}

impl Dangling {
    fn cartesian(left: Dangling, right: Dangling) -> Dangling {
        let mut tables = left.tables;
        tables.extend(right.tables);
        Dangling {
            tables,
            expr: Expr::join(JoinType::Cartesian, left.expr, right.expr, None),
        }
    }

    fn bare_alias(&self) -> Option<&TableName> {
        self.expr.as_alias().map(|a| &a.alias)
    }
}

/// Build the candidate plan for `seed` and `predicate_order`.
pub fn build(input: &PlanInput, predicate_order: &[usize], seed: u64) -> Result<Expr> {
    let mut seen = BTreeSet::new();
    for &idx in predicate_order {
        if idx >= input.predicates.len() || !seen.insert(idx) {
            return Err(PlanError::Bookkeeping(format!(
                "predicate order {:?} is not a selection of {} predicate(s)",
                predicate_order,
                input.predicates.len()
            )));
        }
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut trees: Vec<Dangling> = input
        .relations
        .iter()
        .map(|r| Dangling {
            tables: BTreeSet::from([r.alias.clone()]),
            expr: Expr::alias(r.alias.clone(), r.table.clone()),
        })
        .collect();

    let mut pending: Vec<usize> = predicate_order.to_vec();
    while !pending.is_empty() {
        let pos = choose(input, &trees, &pending, &mut rng)?;
        let idx = pending.remove(pos);
        let predicate = input.predicates.get(idx).ok_or_else(|| {
            PlanError::Bookkeeping(format!("predicate order refers to missing predicate {}", idx))
        })?;
        apply(predicate, &mut trees, &mut rng)?;
    }

    while trees.len() > 1 {
        let a = trees.swap_remove(rng.gen_range(0..trees.len()));
        let b = trees.swap_remove(rng.gen_range(0..trees.len()));
        trees.push(Dangling::cartesian(a, b));
    }

    let mut root = match trees.pop() {
        Some(tree) => tree.expr,
        None => Expr::filter(
            FilterKind::ExpressionTable,
            Expr::function(FunctionOp::Call("single_row".into()), Vec::new()),
        ),
    };

    if !input.statics.is_empty() {
        root = Expr::filter(
            FilterKind::StaticFilter {
                predicate: Box::new(Expr::and(input.statics.clone())),
            },
            root,
        );
    }

    if !input.order.is_empty() && !order_satisfies(&natural_order(&root), &input.order) {
        let index = input
            .sort_index
            .as_ref()
            .filter(|c| leftmost_scan(&root) == Some(&c.alias))
            .cloned();
        root = Expr::filter(
            FilterKind::Sort {
                order: input.order.clone(),
                index,
            },
            root,
        );
    }
    Ok(root)
}

/// The relation scanned first by a plan, if it is read without an index.
fn leftmost_scan(expr: &Expr) -> Option<&TableName> {
    match &expr.kind {
        ExprKind::AliasTableName(a) => Some(&a.alias),
        ExprKind::Join(j) => leftmost_scan(&j.left),
        ExprKind::Filter(f) => match &f.kind {
            FilterKind::SingleFilter { index: Some(_), .. } => None,
            _ => leftmost_scan(&f.child),
        },
        _ => None,
    }
}

fn touched(predicate: &QueryPredicate, trees: &[Dangling]) -> Vec<usize> {
    trees
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.tables.is_disjoint(&predicate.dependent_on))
        .map(|(i, _)| i)
        .collect()
}

fn schedulable(input: &PlanInput, trees: &[Dangling], pending: &[usize], idx: usize) -> bool {
    let Some(predicate) = input.predicates.get(idx) else {
        return false;
    };
    let touched = touched(predicate, trees);
    let covered: BTreeSet<TableName> = touched
        .iter()
        .flat_map(|i| trees[*i].tables.iter().cloned())
        .collect();
    if !predicate.dependent_on.is_subset(&covered) {
        return false;
    }

    let others = move || {
        pending
            .iter()
            .filter(move |q| **q != idx)
            .filter_map(move |q| input.predicates.get(*q))
    };

    let splits_branch = others()
        .filter_map(QueryPredicate::right_tables)
        .any(|rt| !covered.is_subset(rt) && !covered.is_disjoint(rt));
    if splits_branch {
        return false;
    }

    if let Some(rt) = predicate.right_tables() {
        let clean = trees
            .iter()
            .all(|t| t.tables.is_disjoint(rt) || t.tables.is_subset(rt));
        let has_left = touched.iter().any(|i| !trees[*i].tables.is_subset(rt));
        let inner_pending = predicate
            .outer_join
            .map_or(false, |id| others().any(|q| q.inside.contains(&id)));
        return clean && has_left && !inner_pending;
    }

    if let Some(waits_for) = &predicate.right_dependancy {
        return !others()
            .filter_map(QueryPredicate::right_tables)
            .any(|rt| !rt.is_disjoint(waits_for));
    }
    true
}

fn choose(input: &PlanInput, trees: &[Dangling], pending: &[usize], rng: &mut StdRng) -> Result<usize> {
    let mut first = None;
    for (pos, idx) in pending.iter().enumerate() {
        if !schedulable(input, trees, pending, *idx) {
            continue;
        }
        if rng.gen_bool(0.5) {
            return Ok(pos);
        }
        first.get_or_insert(pos);
    }
    first.ok_or_else(|| {
        let blocked = pending
            .first()
            .and_then(|idx| input.predicates.get(*idx))
            .map_or_else(String::new, |p| p.to_string());
        let present: Vec<String> = trees
            .iter()
            .map(|t| {
                let names: Vec<String> = t.tables.iter().map(|n| n.to_string()).collect();
                format!("[{}]", names.join(", "))
            })
            .collect();
        PlanError::Unschedulable {
            predicate: blocked,
            reason: format!(
                "{} predicate(s) pending, none schedulable over trees {}",
                pending.len(),
                present.join(" ")
            ),
        }
    })
}

/// Remove the trees at `indices`, preserving their relative order.
fn take(trees: &mut Vec<Dangling>, indices: &[usize]) -> Vec<Dangling> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    let mut out: Vec<Dangling> = sorted.into_iter().map(|i| trees.remove(i)).collect();
    out.reverse();
    out
}

fn chain(mut parts: Vec<Dangling>, rng: &mut StdRng) -> Option<Dangling> {
    parts.shuffle(rng);
    let mut iter = parts.into_iter();
    let first = iter.next()?;
    Some(iter.fold(first, Dangling::cartesian))
}

/// The join-probe candidate of `predicate` usable on a bare relation tree.
fn join_index(predicate: &QueryPredicate, tree: &Dangling) -> Option<IndexCandidate> {
    let alias = tree.bare_alias()?;
    predicate
        .index_candidates
        .iter()
        .find(|c| &c.alias == alias && c.range.is_none())
        .cloned()
}

fn join(
    predicate: &QueryPredicate,
    join_type: JoinType,
    left: Dangling,
    right: Dangling,
) -> Dangling {
    let strategy = JoinStrategy {
        left_index: join_index(predicate, &left),
        right_index: join_index(predicate, &right),
        fact: predicate.fact.clone(),
    };
    let filter = match predicate.expression.as_literal() {
        Some(v) if v.is_true() => None,
        _ => Some(predicate.expression.clone()),
    };
    let mut tables = left.tables;
    tables.extend(right.tables);
    let mut expr = Expr::join(join_type, left.expr, right.expr, filter);
    if let ExprKind::Join(node) = &mut expr.kind {
        node.strategy = strategy;
    }
    Dangling { tables, expr }
}

fn missing_side(predicate: &QueryPredicate) -> PlanError {
    PlanError::Bookkeeping(format!("join predicate `{}` lost one of its inputs", predicate))
}

fn apply(predicate: &QueryPredicate, trees: &mut Vec<Dangling>, rng: &mut StdRng) -> Result<()> {
    let touched = touched(predicate, trees);

    if let Some(rt) = predicate.right_tables() {
        let (right_parts, left_parts): (Vec<Dangling>, Vec<Dangling>) = take(trees, &touched)
            .into_iter()
            .partition(|t| t.tables.is_subset(rt));
        let left = chain(left_parts, rng).ok_or_else(|| missing_side(predicate))?;
        let right = chain(right_parts, rng).ok_or_else(|| missing_side(predicate))?;
        trees.push(join(predicate, JoinType::OuterLeft, left, right));
        return Ok(());
    }

    match touched.as_slice() {
        [] => Err(PlanError::Unschedulable {
            predicate: predicate.to_string(),
            reason: "no relation of the plan resolves it".into(),
        }),
        [only] => {
            let tree = trees.remove(*only);
            let index = match tree.bare_alias() {
                Some(alias) => predicate
                    .index_candidates
                    .iter()
                    .filter(|c| &c.alias == alias && c.range.is_some())
                    .collect::<Vec<_>>()
                    .choose(rng)
                    .map(|c| (*c).clone()),
                None => None,
            };
            trees.push(Dangling {
                tables: tree.tables,
                expr: Expr::filter(
                    FilterKind::SingleFilter {
                        predicate: Box::new(predicate.expression.clone()),
                        index,
                    },
                    tree.expr,
                ),
            });
            Ok(())
        }
        _ => {
            let mut parts = take(trees, &touched);
            parts.shuffle(rng);
            let mut iter = parts.into_iter();
            let (Some(mut left), Some(right)) = (iter.next(), iter.next()) else {
                return Err(missing_side(predicate));
            };
            for extra in iter {
                left = Dangling::cartesian(left, extra);
            }
            trees.push(join(predicate, predicate.join_type, left, right));
            Ok(())
        }
    }
}
