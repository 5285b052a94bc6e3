//! # Predicate Simplification
//!
//! A post-visit rewrite that puts a filter into the shape the rest of the
//! planner expects:
//!
//! - `variable OP constant` becomes `range_set(variable, range)`; with the
//!   variable on the right the operator is reversed first (`5 < x` → `x > 5`).
//! - Comparing with NULL through anything but `IS` / `IS NOT` folds to NULL.
//! - Inside an AND (OR), `range_set` terms on the same variable built from
//!   values of one type are intersected (united) into a single term.
//! - Fully static subtrees are folded with three-valued logic, and AND / OR
//!   short-circuit against literal booleans.
//!
//! A `range_set` over the empty range folds to `false`; over the full range
//! (NULL included) it folds to `true`.

use qplan_core::error::Result;
use qplan_core::expr::{CompareOp, Expr, ExprKind, FunctionNode, FunctionOp, Variable};
use qplan_core::range::SelectableRange;
use qplan_core::value::ScalarValue;
use qplan_core::visitor::ExprRewriter;

/// The simplification rewrite.
#[derive(Debug, Default)]
pub struct Simplifier;

impl ExprRewriter for Simplifier {
    fn post_visit(&mut self, expr: Expr) -> Result<Expr> {
        match expr.kind {
            ExprKind::Function(FunctionNode { op, args }) => match op {
                FunctionOp::And => simplify_junction(true, args),
                FunctionOp::Or => simplify_junction(false, args),
                FunctionOp::Compare(cmp) => simplify_comparison(cmp, args),
                op => Ok(fold_static(Expr::function(op, args))),
            },
            kind => Ok(Expr::new(kind)),
        }
    }
}

/// Simplify a predicate tree.
pub fn simplify(expr: Expr) -> Result<Expr> {
    expr.rewrite(&mut Simplifier)
}

fn fold_static(expr: Expr) -> Expr {
    if expr.is_static() {
        if let Some(value) = expr.eval_static() {
            return Expr::literal(value);
        }
    }
    expr
}

fn static_value(expr: &Expr) -> Option<ScalarValue> {
    if expr.is_static() {
        expr.eval_static()
    } else {
        None
    }
}

/// `range_set(var, range)`, or a literal when the range decides every row.
fn range_term(var: Variable, range: SelectableRange) -> Expr {
    if range.is_empty() {
        Expr::boolean(false)
    } else if range.is_full() {
        Expr::boolean(true)
    } else {
        Expr::range_set(var, range)
    }
}

fn simplify_comparison(op: CompareOp, args: Vec<Expr>) -> Result<Expr> {
    let [left, right]: [Expr; 2] = match args.try_into() {
        Ok(pair) => pair,
        Err(args) => return Ok(Expr::function(FunctionOp::Compare(op), args)),
    };
    let oriented = match (left.as_variable(), static_value(&right)) {
        (Some(var), Some(value)) => Some((var.clone(), op, value)),
        _ => match (static_value(&left), right.as_variable()) {
            (Some(value), Some(var)) => Some((var.clone(), op.reverse(), value)),
            _ => None,
        },
    };
    match oriented {
        Some((_, op, value)) if value.is_null() && !matches!(op, CompareOp::Is | CompareOp::IsNot) => {
            Ok(Expr::literal(ScalarValue::Null))
        }
        Some((var, op, value)) => Ok(range_term(var, SelectableRange::construct(op, vec![value])?)),
        None => Ok(fold_static(Expr::compare(op, left, right))),
    }
}

fn simplify_junction(is_and: bool, args: Vec<Expr>) -> Result<Expr> {
    let junction = if is_and { FunctionOp::And } else { FunctionOp::Or };

    let mut terms: Vec<Expr> = Vec::with_capacity(args.len());
    for arg in args {
        match arg.kind {
            ExprKind::Function(FunctionNode { op, args: inner }) if op == junction => terms.extend(inner),
            kind => terms.push(Expr::new(kind)),
        }
    }

    let mut merged: Vec<Expr> = Vec::with_capacity(terms.len());
    for term in terms {
        if let Some((var, range)) = term.as_range_set() {
            let target = merged.iter().position(|m| {
                m.as_range_set().map_or(false, |(v, r)| {
                    v == var && r.width() == range.width() && r.same_value_type(range)
                })
            });
            if let Some(pos) = target {
                let existing = match merged[pos].as_range_set() {
                    Some((_, r)) => r.clone(),
                    None => continue,
                };
                let combined = if is_and {
                    existing.intersect(range)?
                } else {
                    existing.union(range)?
                };
                merged[pos] = range_term(var.clone(), combined);
                continue;
            }
        }
        merged.push(term);
    }

    // A merge can produce a literal, so short-circuit after merging.
    let mut out: Vec<Expr> = Vec::with_capacity(merged.len());
    for term in merged {
        match term.as_literal() {
            Some(v) if is_and && v.is_false() => return Ok(Expr::boolean(false)),
            Some(v) if !is_and && v.is_true() => return Ok(Expr::boolean(true)),
            Some(v) if is_and && v.is_true() => {}
            Some(v) if !is_and && v.is_false() => {}
            _ => out.push(term),
        }
    }

    match out.len() {
        0 => Ok(Expr::boolean(is_and)),
        1 => Ok(out.remove(0)),
        _ => Ok(fold_static(Expr::function(junction, out))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qplan_core::expr::{ArithOp, TableName};

    fn x() -> Expr {
        Expr::column("t", "x")
    }

    fn var_x() -> Variable {
        Variable::new(TableName::new("t"), "x")
    }

    fn range(op: CompareOp, v: i64) -> SelectableRange {
        SelectableRange::construct(op, vec![ScalarValue::Int64(v)]).unwrap()
    }

    #[test]
    fn test_conjunctive_bounds_merge_into_one_range() {
        let pred = Expr::and(vec![
            Expr::compare(CompareOp::Gt, x(), Expr::int(5)),
            Expr::compare(CompareOp::Lt, x(), Expr::int(100)),
        ]);
        let out = simplify(pred).unwrap();
        let (var, r) = out.as_range_set().unwrap();
        assert_eq!(var, &var_x());
        assert_eq!(r, &range(CompareOp::Gt, 5).intersect(&range(CompareOp::Lt, 100)).unwrap());
    }

    #[test]
    fn test_variable_on_the_right_reverses_operator() {
        let out = simplify(Expr::compare(CompareOp::Lt, Expr::int(5), x())).unwrap();
        assert_eq!(out, Expr::range_set(var_x(), range(CompareOp::Gt, 5)));
    }

    #[test]
    fn test_constant_side_is_folded_first() {
        let seven = Expr::function(FunctionOp::Arith(ArithOp::Add), vec![Expr::int(3), Expr::int(4)]);
        let out = simplify(Expr::equals(x(), seven)).unwrap();
        assert_eq!(out, Expr::range_set(var_x(), range(CompareOp::Eq, 7)));
    }

    #[test]
    fn test_null_comparisons() {
        let eq_null = simplify(Expr::equals(x(), Expr::literal(ScalarValue::Null))).unwrap();
        assert_eq!(eq_null, Expr::literal(ScalarValue::Null));
        let is_null =
            simplify(Expr::compare(CompareOp::Is, x(), Expr::literal(ScalarValue::Null))).unwrap();
        assert!(is_null.as_range_set().is_some());
    }

    #[test]
    fn test_disjunction_unions_and_short_circuits() {
        let pred = Expr::or(vec![
            Expr::compare(CompareOp::Lt, x(), Expr::int(0)),
            Expr::compare(CompareOp::Gt, x(), Expr::int(10)),
        ]);
        let out = simplify(pred).unwrap();
        assert_eq!(out.as_range_set().unwrap().1.count(), 2);

        let always = Expr::or(vec![Expr::equals(x(), Expr::column("u", "y")), Expr::boolean(true)]);
        assert_eq!(simplify(always).unwrap(), Expr::boolean(true));

        let never = Expr::and(vec![
            Expr::equals(x(), Expr::int(1)),
            Expr::compare(CompareOp::NotEq, x(), Expr::int(1)),
        ]);
        assert_eq!(simplify(never).unwrap(), Expr::boolean(false));
    }

    #[test]
    fn test_mixed_types_are_not_merged() {
        let pred = Expr::and(vec![
            Expr::equals(x(), Expr::int(1)),
            Expr::equals(x(), Expr::literal(ScalarValue::utf8("1"))),
        ]);
        let out = simplify(pred).unwrap();
        assert_eq!(out.conjuncts().len(), 2);
    }

    #[test]
    fn test_join_comparison_is_kept() {
        let pred = Expr::and(vec![
            Expr::boolean(true),
            Expr::equals(x(), Expr::column("u", "y")),
        ]);
        let out = simplify(pred).unwrap();
        assert!(out.as_comparison().is_some());
    }
}
