//! # Query Predicates
//!
//! A simplified filter is split on its top-level AND into independent
//! `QueryPredicate`s, each with the set of relations it depends on. Two
//! predicates over exactly the same relations are merged when both are simple
//! equalities (`a.x = b.y`, `t.c = 5`, or an AND of those), which is what lets
//! `a.x = b.x AND a.y = b.y` use a composite index on `(x, y)`.
//!
//! Predicates only ever merge with predicates under the same outer-join
//! constraints, so merging never moves a term across an outer join.

use qplan_core::expr::{CompareOp, Expr, IndexCandidate, JoinType, TableName};
use qplan_core::stats::FactId;
use std::collections::BTreeSet;
use std::fmt;

/// One independently schedulable piece of the query's filter.
#[derive(Debug, Clone)]
pub struct QueryPredicate {
    pub expression: Expr,
    /// Relations that must be present before the predicate can be applied.
    pub dependent_on: BTreeSet<TableName>,
    /// For an outer-join predicate, the join's right-branch relations. For any
    /// other predicate, the right-branch relations of every outer join it
    /// touches from outside; it waits until those joins are performed.
    pub right_dependancy: Option<BTreeSet<TableName>>,
    /// Set on outer-join predicates: the right branch joins as one atomic side.
    pub right_exclusive: bool,
    /// `OuterLeft` for outer-join predicates, `Inner` otherwise.
    pub join_type: JoinType,
    /// The outer join this predicate performs.
    pub outer_join: Option<usize>,
    /// Outer joins whose right branch this predicate lives in.
    pub inside: BTreeSet<usize>,
    pub index_candidates: Vec<IndexCandidate>,
    pub fact: Option<FactId>,
}

impl QueryPredicate {
    pub fn new(expression: Expr, inside: BTreeSet<usize>) -> Self {
        let dependent_on = expression.dependencies();
        Self {
            expression,
            dependent_on,
            right_dependancy: None,
            right_exclusive: false,
            join_type: JoinType::Inner,
            outer_join: None,
            inside,
            index_candidates: Vec::new(),
            fact: None,
        }
    }

    /// A constant that may be evaluated above the whole plan: no relation
    /// dependency and not inside the right branch of any outer join.
    pub fn is_static(&self) -> bool {
        self.dependent_on.is_empty() && !self.right_exclusive && self.inside.is_empty()
    }

    /// True for `a = b` between variables, a point `range_set`, or an AND of these.
    pub fn is_simple_equality(&self) -> bool {
        is_simple_equality(&self.expression)
    }

    /// RT of an outer-join predicate.
    pub fn right_tables(&self) -> Option<&BTreeSet<TableName>> {
        if self.right_exclusive {
            self.right_dependancy.as_ref()
        } else {
            None
        }
    }

    fn can_merge(&self, other: &QueryPredicate) -> bool {
        !self.right_exclusive
            && !other.right_exclusive
            && !self.dependent_on.is_empty()
            && self.dependent_on == other.dependent_on
            && self.inside == other.inside
            && self.right_dependancy == other.right_dependancy
            && self.is_simple_equality()
            && other.is_simple_equality()
    }
}

impl fmt::Display for QueryPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

pub fn is_simple_equality(expr: &Expr) -> bool {
    expr.conjuncts().iter().all(|c| {
        if let Some((_, range)) = c.as_range_set() {
            return range.point_value().is_some();
        }
        match c.as_comparison() {
            Some((CompareOp::Eq, a, b)) => a.as_variable().is_some() && b.as_variable().is_some(),
            _ => false,
        }
    })
}

/// The working set of predicates of one planning call.
#[derive(Debug, Clone, Default)]
pub struct PredicatePool {
    predicates: Vec<QueryPredicate>,
}

impl PredicatePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every top-level conjunct of `filter` as a predicate.
    pub fn add_filter(&mut self, filter: Expr, inside: &BTreeSet<usize>) {
        for conjunct in filter.into_conjuncts() {
            if conjunct.as_literal().map_or(false, |v| v.is_true()) {
                continue;
            }
            self.add(QueryPredicate::new(conjunct, inside.clone()));
        }
    }

    /// Add the filter of an inner join covering `scope`. Inside an outer join's
    /// right branch a constant conjunct depends on `scope`, so it is applied
    /// within the branch and not above the outer join.
    pub fn add_scoped_filter(
        &mut self,
        filter: Expr,
        inside: &BTreeSet<usize>,
        scope: &BTreeSet<TableName>,
    ) {
        for conjunct in filter.into_conjuncts() {
            if conjunct.as_literal().map_or(false, |v| v.is_true()) {
                continue;
            }
            let mut predicate = QueryPredicate::new(conjunct, inside.clone());
            if predicate.dependent_on.is_empty() && !inside.is_empty() {
                predicate.dependent_on = scope.clone();
            }
            self.add(predicate);
        }
    }

    /// Add a predicate, merging it into an existing one when both are simple
    /// equalities over the same relations.
    pub fn add(&mut self, predicate: QueryPredicate) {
        if let Some(existing) = self.predicates.iter_mut().find(|p| p.can_merge(&predicate)) {
            let mut terms = std::mem::replace(&mut existing.expression, Expr::boolean(true)).into_conjuncts();
            terms.extend(predicate.expression.into_conjuncts());
            existing.expression = Expr::and(terms);
            return;
        }
        self.predicates.push(predicate);
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryPredicate> {
        self.predicates.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut QueryPredicate> {
        self.predicates.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn into_vec(self) -> Vec<QueryPredicate> {
        self.predicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qplan_core::expr::Variable;
    use qplan_core::range::SelectableRange;
    use qplan_core::value::ScalarValue;

    fn eq(a: (&str, &str), b: (&str, &str)) -> Expr {
        Expr::equals(Expr::column(a.0, a.1), Expr::column(b.0, b.1))
    }

    #[test]
    fn test_equalities_on_same_relations_merge() {
        let mut pool = PredicatePool::new();
        pool.add_filter(
            Expr::and(vec![
                eq(("a", "x"), ("b", "x")),
                eq(("a", "y"), ("b", "y")),
                Expr::compare(CompareOp::Lt, Expr::column("a", "z"), Expr::column("b", "z")),
            ]),
            &BTreeSet::new(),
        );
        assert_eq!(pool.len(), 2);
        let merged = pool.iter().next().unwrap();
        assert_eq!(merged.expression.conjuncts().len(), 2);
        assert_eq!(merged.dependent_on.len(), 2);
    }

    #[test]
    fn test_point_ranges_merge_but_bounds_do_not() {
        let point = |col: &str, v: i64| {
            Expr::range_set(
                Variable::new(TableName::new("t"), col),
                SelectableRange::construct(CompareOp::Eq, vec![ScalarValue::Int64(v)]).unwrap(),
            )
        };
        let mut pool = PredicatePool::new();
        pool.add_filter(Expr::and(vec![point("x", 1), point("y", 2)]), &BTreeSet::new());
        assert_eq!(pool.len(), 1);
        assert!(pool.iter().next().unwrap().is_simple_equality());

        let bound = Expr::range_set(
            Variable::new(TableName::new("t"), "z"),
            SelectableRange::construct(CompareOp::Gt, vec![ScalarValue::Int64(0)]).unwrap(),
        );
        pool.add(QueryPredicate::new(bound, BTreeSet::new()));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_different_branches_do_not_merge() {
        let mut pool = PredicatePool::new();
        pool.add_filter(eq(("a", "x"), ("b", "x")), &BTreeSet::new());
        pool.add_filter(eq(("a", "y"), ("b", "y")), &BTreeSet::from([0]));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_literal_true_is_dropped() {
        let mut pool = PredicatePool::new();
        pool.add_filter(Expr::boolean(true), &BTreeSet::new());
        assert!(pool.is_empty());
        pool.add_filter(Expr::boolean(false), &BTreeSet::new());
        assert!(pool.iter().next().unwrap().is_static());
    }

    #[test]
    fn test_constant_in_outer_branch_binds_to_its_join() {
        let scope = BTreeSet::from([TableName::new("b"), TableName::new("c")]);
        let mut pool = PredicatePool::new();
        pool.add_scoped_filter(Expr::boolean(false), &BTreeSet::from([0]), &scope);
        let bound = pool.iter().next().unwrap();
        assert!(!bound.is_static());
        assert_eq!(bound.dependent_on, scope);

        let mut top = PredicatePool::new();
        top.add_scoped_filter(Expr::boolean(false), &BTreeSet::new(), &scope);
        assert!(top.iter().next().unwrap().is_static());
    }
}
