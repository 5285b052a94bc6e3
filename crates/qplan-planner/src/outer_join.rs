//! # Outer-Join Propagation
//!
//! Each left outer join of the graph becomes one *exclusive* predicate that
//! performs the join: its right branch is assembled into a single atomic right
//! side and joined under the ON clause. Processing runs bottom-up over the
//! outer joins:
//!
//! 1. The ON clause is simplified and split into conjuncts.
//! 2. Conjuncts that reference relations, none of them in the right branch,
//!    are hoisted into the general pool (keeping the outer join's own branch
//!    membership).
//! 3. The remaining conjuncts, constants included, are ANDed into the join
//!    predicate. A join left without any gets a `true` predicate, so it is
//!    never dropped.
//!
//! The join predicate depends on its own relations, on every right-branch
//! relation, and on at least one left-branch relation.
//!
//! Finally every other predicate that reaches into the right branch of an outer
//! join from outside gets a `right_dependancy` on that branch: a WHERE term on
//! the right side of a LEFT JOIN must run after the join, never before it.

use crate::graph::JoinGraph;
use crate::predicate::{PredicatePool, QueryPredicate};
use crate::simplify::simplify;
use qplan_core::error::Result;
use qplan_core::expr::{Expr, JoinType};
use std::collections::BTreeSet;
use tracing::{debug, trace};

pub fn propagate(graph: &JoinGraph, pool: &mut PredicatePool) -> Result<()> {
    for join in &graph.outer_joins {
        let filter = match &join.filter {
            Some(f) => simplify(f.clone())?,
            None => Expr::boolean(true),
        };

        let mut attached = Vec::new();
        for conjunct in filter.into_conjuncts() {
            if conjunct.as_literal().map_or(false, |v| v.is_true()) {
                continue;
            }
            let deps = conjunct.dependencies();
            if !deps.is_empty() && deps.is_disjoint(&join.right_tables) {
                debug!("hoisting `{}` out of outer join {}", conjunct, join.id);
                pool.add_filter(conjunct, &join.inside);
            } else {
                attached.push(conjunct);
            }
        }

        let expression = if attached.is_empty() {
            Expr::boolean(true)
        } else {
            Expr::and(attached)
        };
        let mut predicate = QueryPredicate::new(expression, join.inside.clone());
        predicate.dependent_on.extend(join.right_tables.iter().cloned());
        if predicate.dependent_on.is_disjoint(&join.left_tables) {
            if let Some(anchor) = join.left_tables.iter().next() {
                predicate.dependent_on.insert(anchor.clone());
            }
        }
        predicate.right_dependancy = Some(join.right_tables.clone());
        predicate.right_exclusive = true;
        predicate.join_type = JoinType::OuterLeft;
        predicate.outer_join = Some(join.id);
        trace!(
            "outer join {} predicate `{}` depends on {:?}",
            join.id,
            predicate.expression,
            predicate.dependent_on
        );
        pool.add(predicate);
    }

    for predicate in pool.iter_mut() {
        if predicate.right_exclusive {
            continue;
        }
        let mut waits_for = BTreeSet::new();
        for join in &graph.outer_joins {
            if predicate.inside.contains(&join.id) {
                continue;
            }
            if !predicate.dependent_on.is_disjoint(&join.right_tables) {
                waits_for.extend(join.right_tables.iter().cloned());
            }
        }
        predicate.right_dependancy = if waits_for.is_empty() {
            None
        } else {
            Some(waits_for)
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::flatten;
    use qplan_core::expr::{CompareOp, TableName};

    fn rel(name: &str) -> Expr {
        Expr::alias(TableName::new(name), TableName::new(name))
    }

    fn t(name: &str) -> TableName {
        TableName::new(name)
    }

    #[test]
    fn test_left_only_conjunct_is_hoisted() {
        let on = Expr::and(vec![
            Expr::equals(Expr::column("a", "id"), Expr::column("b", "id")),
            Expr::compare(CompareOp::Gt, Expr::column("a", "v"), Expr::int(3)),
        ]);
        let graph = flatten(Some(&Expr::join(JoinType::OuterLeft, rel("a"), rel("b"), Some(on)))).unwrap();
        let mut pool = PredicatePool::new();
        propagate(&graph, &mut pool).unwrap();

        let preds: Vec<_> = pool.into_vec();
        assert_eq!(preds.len(), 2);
        let hoisted = preds.iter().find(|p| !p.right_exclusive).unwrap();
        assert_eq!(hoisted.dependent_on, BTreeSet::from([t("a")]));
        assert!(hoisted.right_dependancy.is_none());
        let outer = preds.iter().find(|p| p.right_exclusive).unwrap();
        assert_eq!(outer.join_type, JoinType::OuterLeft);
        assert_eq!(outer.expression.conjuncts().len(), 1);
        assert_eq!(outer.right_tables(), Some(&BTreeSet::from([t("b")])));
    }

    #[test]
    fn test_missing_filter_gets_true_predicate() {
        let graph = flatten(Some(&Expr::join(JoinType::OuterLeft, rel("a"), rel("b"), None))).unwrap();
        let mut pool = PredicatePool::new();
        propagate(&graph, &mut pool).unwrap();
        let preds = pool.into_vec();
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].expression, Expr::boolean(true));
        assert_eq!(preds[0].dependent_on, BTreeSet::from([t("a"), t("b")]));
    }

    #[test]
    fn test_where_on_right_side_waits_for_join() {
        let graph = flatten(Some(&Expr::join(
            JoinType::OuterLeft,
            rel("a"),
            rel("b"),
            Some(Expr::equals(Expr::column("a", "id"), Expr::column("b", "id"))),
        )))
        .unwrap();
        let mut pool = PredicatePool::new();
        pool.add_filter(
            Expr::and(vec![
                Expr::equals(Expr::column("b", "y"), Expr::int(5)),
                Expr::equals(Expr::column("a", "y"), Expr::int(5)),
            ]),
            &BTreeSet::new(),
        );
        propagate(&graph, &mut pool).unwrap();
        let on_b = pool
            .iter()
            .find(|p| p.dependent_on == BTreeSet::from([t("b")]))
            .unwrap();
        assert_eq!(on_b.right_dependancy, Some(BTreeSet::from([t("b")])));
        assert!(!on_b.right_exclusive);
        let on_a = pool
            .iter()
            .find(|p| p.dependent_on == BTreeSet::from([t("a")]))
            .unwrap();
        assert!(on_a.right_dependancy.is_none());
    }

    #[test]
    fn test_constant_on_clause_stays_with_the_join() {
        let on = Expr::and(vec![
            Expr::equals(Expr::column("a", "id"), Expr::column("b", "id")),
            Expr::boolean(false),
        ]);
        let graph = flatten(Some(&Expr::join(JoinType::OuterLeft, rel("a"), rel("b"), Some(on)))).unwrap();
        let mut pool = PredicatePool::new();
        propagate(&graph, &mut pool).unwrap();

        let preds = pool.into_vec();
        assert_eq!(preds.len(), 1);
        assert!(preds[0].right_exclusive);
        assert!(!preds[0].is_static());
        assert_eq!(preds[0].dependent_on, BTreeSet::from([t("a"), t("b")]));
        assert_eq!(preds[0].expression, Expr::boolean(false));
    }
}
