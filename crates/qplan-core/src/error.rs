//! # Planning Errors
//!
//! Every error in this module is fatal: it either means the caller handed the
//! planner something it cannot express (an unsupported join type, a range over
//! mismatched column lists) or that the planner's own bookkeeping went wrong
//! (a predicate that can never be scheduled). Planning aborts on the first one.
//!
//! Data-quality shortfalls (too few rows to sample, no usable index, no cached
//! fact) are *not* errors. They resolve to conservative estimates inside the
//! statistics estimator and the cost model, so planning always terminates with
//! a valid plan.

use crate::expr::JoinType;

/// Result alias used throughout the planner crates.
pub type Result<T> = std::result::Result<T, PlanError>;

/// Fatal planning error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    /// A join node carries a join type the planner or cost model cannot handle.
    #[error("unsupported join type {join_type:?} in {context}")]
    UnsupportedJoinType {
        join_type: JoinType,
        context: &'static str,
    },

    /// A node kind showed up somewhere it is not allowed (e.g. a FetchVariable
    /// in operator position of the plan graph).
    #[error("unexpected {kind} node in {context}: {node}")]
    UnexpectedNode {
        kind: &'static str,
        context: &'static str,
        node: String,
    },

    /// Two ranges over a different number of columns were combined.
    #[error("range width mismatch: {left} column(s) vs {right} column(s)")]
    RangeWidthMismatch { left: usize, right: usize },

    /// A range was constructed from an empty value tuple.
    #[error("cannot build a range from an empty value tuple")]
    EmptyRangeTuple,

    /// A node's cost was read before the cost model annotated it.
    #[error("cost of {kind} node read before it was computed: {node}")]
    CostNotSet { kind: &'static str, node: String },

    /// A predicate could not be placed in the join tree.
    #[error("predicate `{predicate}` cannot be scheduled: {reason}")]
    Unschedulable { predicate: String, reason: String },

    /// Internal dependency bookkeeping became inconsistent.
    #[error("inconsistent dependency bookkeeping: {0}")]
    Bookkeeping(String),

    /// The metadata accessor does not know the table.
    #[error("unknown table {table}")]
    UnknownTable { table: String },

    /// The metadata accessor does not know the column.
    #[error("unknown column {column} in table {table}")]
    UnknownColumn { table: String, column: String },

    /// The metadata accessor does not know the index.
    #[error("unknown index {index} on table {table}")]
    UnknownIndex { table: String, index: String },
}
