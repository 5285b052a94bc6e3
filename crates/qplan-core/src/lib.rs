//! # qplan-core: Cost-Based Planning Core
//!
//! This crate holds the data structures and estimators shared by the randomized
//! join planner: the expression/operator tree, the range algebra used to turn
//! predicates into index probes, sampled column and fact statistics, and the
//! bottom-up cost model.
//!
//! ## Module Overview
//!
//! - **`value`**: Scalar values with a total order and SQL three-valued comparison.
//! - **`expr`**: The expression and operator tree (`Expr`, `ExprKind`) with cost annotations.
//! - **`visitor`**: Bottom-up tree rewriting with a pre-visit pruning hook.
//! - **`range`**: `SelectableRange`, normalized sets of disjoint bound pairs.
//! - **`catalog`**: Read-only table/index metadata (`Catalog`) and an in-memory backend.
//! - **`stats`**: Division-point column statistics, fact statistics and their shared store.
//! - **`properties`**: Natural row order of a plan and order satisfaction.
//! - **`cost`**: The `CostModel` trait and the default nested-loop/index model.
//! - **`error`**: `PlanError`, the fatal planning errors.

pub mod catalog;
pub mod cost;
pub mod error;
pub mod expr;
pub mod properties;
pub mod range;
pub mod stats;
pub mod value;
pub mod visitor;

pub use error::{PlanError, Result};
