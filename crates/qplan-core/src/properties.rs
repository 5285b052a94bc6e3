//! # Ordering Properties
//!
//! The only physical property the planner tracks is row order. A plan node's
//! *natural order* is the order its rows come out in without an explicit sort:
//!
//! - a base relation scan has none;
//! - a `single_filter` evaluated through an index yields the index collation;
//! - a join streams its left input, so it keeps the left child's order;
//! - a `sort` yields its keys;
//! - every other filter keeps its child's order.
//!
//! A requested order is satisfied when it is a prefix of the natural order.

use crate::expr::{Expr, ExprKind, FilterKind, SortKey, TableName, Variable};
use serde::{Deserialize, Serialize};

/// One key of a physical row order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    pub column: Variable,
    pub ascending: bool,
}

/// The order rows leave `expr` in, without any added sort.
pub fn natural_order(expr: &Expr) -> Vec<OrderKey> {
    match &expr.kind {
        ExprKind::Join(j) => natural_order(&j.left),
        ExprKind::Filter(f) => match &f.kind {
            FilterKind::SingleFilter {
                index: Some(idx), ..
            } => idx
                .columns
                .iter()
                .map(|c| OrderKey {
                    column: Variable::new(idx.alias.clone(), c.clone()),
                    ascending: true,
                })
                .collect(),
            FilterKind::Sort { order, .. } => order
                .iter()
                .map_while(|k| {
                    k.expr.as_variable().map(|v| OrderKey {
                        column: v.clone(),
                        ascending: k.ascending,
                    })
                })
                .collect(),
            _ => natural_order(&f.child),
        },
        _ => Vec::new(),
    }
}

/// Whether `provided` already delivers the `required` order.
pub fn order_satisfies(provided: &[OrderKey], required: &[SortKey]) -> bool {
    required.len() <= provided.len()
        && required.iter().zip(provided).all(|(req, have)| {
            req.ascending == have.ascending
                && req.expr.as_variable().map_or(false, |v| *v == have.column)
        })
}

/// The single alias every key of `order` refers to, when there is one.
pub fn order_alias(order: &[SortKey]) -> Option<&TableName> {
    let first = order.first()?.expr.as_variable()?;
    order
        .iter()
        .all(|k| k.expr.as_variable().map_or(false, |v| v.table == first.table))
        .then_some(&first.table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{IndexCandidate, JoinType};

    fn scan(alias: &str) -> Expr {
        Expr::alias(TableName::new(alias), TableName::new(alias))
    }

    fn indexed_filter(alias: &str, columns: &[&str]) -> Expr {
        let t = TableName::new(alias);
        Expr::filter(
            FilterKind::SingleFilter {
                predicate: Box::new(Expr::boolean(true)),
                index: Some(IndexCandidate {
                    table: t.clone(),
                    alias: t.clone(),
                    index_name: "idx".into(),
                    columns: columns.iter().map(|c| c.to_string()).collect(),
                    range: None,
                }),
            },
            scan(alias),
        )
    }

    #[test]
    fn test_join_keeps_left_order() {
        let plan = Expr::join(JoinType::Cartesian, indexed_filter("a", &["x", "y"]), scan("b"), None);
        let order = natural_order(&plan);
        assert_eq!(order.len(), 2);
        assert!(order_satisfies(&order, &[SortKey::asc(Expr::column("a", "x"))]));
        assert!(!order_satisfies(&order, &[SortKey::asc(Expr::column("a", "y"))]));
        assert!(!order_satisfies(&order, &[SortKey::asc(Expr::column("b", "x"))]));

        let swapped = Expr::join(JoinType::Cartesian, scan("b"), indexed_filter("a", &["x"]), None);
        assert!(natural_order(&swapped).is_empty());
    }

    #[test]
    fn test_direction_and_empty_requirement() {
        let order = natural_order(&indexed_filter("a", &["x"]));
        let desc = SortKey {
            expr: Expr::column("a", "x"),
            ascending: false,
        };
        assert!(!order_satisfies(&order, &[desc]));
        assert!(order_satisfies(&[], &[]));
    }

    #[test]
    fn test_order_alias() {
        let same = [SortKey::asc(Expr::column("a", "x")), SortKey::asc(Expr::column("a", "y"))];
        assert_eq!(order_alias(&same), Some(&TableName::new("a")));
        let mixed = [SortKey::asc(Expr::column("a", "x")), SortKey::asc(Expr::column("b", "y"))];
        assert_eq!(order_alias(&mixed), None);
    }
}
