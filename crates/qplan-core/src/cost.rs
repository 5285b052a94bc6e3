//! # Cost Model
//!
//! This module annotates a candidate operator tree with an estimated output
//! cardinality (`rows`) and an abstract execution time (`time`), bottom-up.
//!
//! ## Units
//!
//! Time is measured in row visits. Scanning one row costs `scan_factor`; one
//! index lookup costs `L = index_lookup_cost`. An index range probe is charged
//! `2L` (descend to the start key, walk to the end key) no matter how many rows
//! it returns.
//!
//! ## Rules
//!
//! | node                          | time                                          | rows |
//! |-------------------------------|-----------------------------------------------|------|
//! | alias                         | `0`                                           | table row count |
//! | `single_filter` via index     | `child + 2L`                                  | `min(probe count, child)` |
//! | `single_filter` otherwise     | `child + child.rows × scan_factor`            | `child × selectivity` |
//! | `sort` already satisfied      | `child + 2L`                                  | child |
//! | `sort` otherwise              | `child + child.rows × L`                      | child |
//! | other filters                 | child                                         | child |
//! | Cartesian join                | `left + right`                                | `left × right` |
//! | join, simple relation         | `left + right + left.rows × (sf + 2L)` plus `right.rows × L` without a right index | fact, equi or inequality estimate |
//! | join, no simple relation      | `left + right + left.rows × right.rows × sf × penalty` | `left × right` |
//!
//! Left outer joins never produce fewer rows than their left input.
//!
//! ## Threshold
//!
//! Costing takes a time threshold. Once a child's time exceeds it, the parent
//! is marked with infinite time and its remaining children are left uncosted:
//! the candidate has already lost.
//!
//! ## Pluggable Design
//!
//! The `CostModel` trait allows replacing the default model; the planner only
//! ever talks to `&dyn CostModel`.

use crate::catalog::Catalog;
use crate::error::{PlanError, Result};
use crate::expr::{
    CompareOp, Expr, ExprKind, FilterKind, IndexCandidate, JoinNode, JoinType, TableName, Variable,
};
use crate::properties::{natural_order, order_satisfies};
use crate::range::SelectableRange;
use crate::stats::{ColumnStatistics, StatisticsStore};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::trace;

/// Estimated output rows and accumulated execution time of a plan node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub rows: f64,
    pub time: f64,
}

impl Cost {
    pub fn new(rows: f64, time: f64) -> Self {
        Self { rows, time }
    }

    pub fn is_infinite(&self) -> bool {
        self.time.is_infinite()
    }
}

/// Tunables of the default cost model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// `L`: cost of one index lookup.
    pub index_lookup_cost: f64,
    /// Cost of scanning one row.
    pub scan_factor: f64,
    /// Multiplier on nested-loop cost when a join has no simple relation.
    pub no_relation_penalty: f64,
    /// Output fraction of a simple non-equality join.
    pub inequality_join_fraction: f64,
    /// Divisor of the row-count spread in the equi-join estimate.
    pub equi_join_spread_divisor: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            index_lookup_cost: 2.0,
            scan_factor: 1.0,
            no_relation_penalty: 1.1,
            inequality_join_fraction: 0.85,
            equi_join_spread_divisor: 3.0,
        }
    }
}

/// Per-call costing context: metadata, statistics and the alias map.
///
/// Index probe counts are cached for the lifetime of the context, so every
/// candidate plan of one planning call probes a given range at most once.
pub struct CostContext<'a> {
    pub catalog: &'a dyn Catalog,
    pub stats: &'a StatisticsStore,
    aliases: HashMap<TableName, TableName>,
    probes: RefCell<HashMap<(TableName, String, SelectableRange), u64>>,
}

impl<'a> CostContext<'a> {
    /// `aliases` maps every alias of the query to its base table.
    pub fn new(
        catalog: &'a dyn Catalog,
        stats: &'a StatisticsStore,
        aliases: HashMap<TableName, TableName>,
    ) -> Self {
        Self {
            catalog,
            stats,
            aliases,
            probes: RefCell::new(HashMap::new()),
        }
    }

    /// Base table behind an alias. Unknown aliases are taken as base tables.
    pub fn base_table<'t>(&'t self, alias: &'t TableName) -> &'t TableName {
        self.aliases.get(alias).unwrap_or(alias)
    }

    /// `alias.column` rewritten to `base_table.column`.
    pub fn base_variable(&self, var: &Variable) -> Variable {
        Variable::new(self.base_table(&var.table).clone(), var.column.clone())
    }

    pub fn column_stats(&self, var: &Variable) -> Result<Arc<ColumnStatistics>> {
        self.stats.column(self.catalog, &self.base_variable(var))
    }

    /// Rows matched by probing `index` with `range`, cached per context.
    pub fn probe(&self, index: &IndexCandidate, range: &SelectableRange) -> Result<u64> {
        let key = (index.table.clone(), index.index_name.clone(), range.clone());
        if let Some(count) = self.probes.borrow().get(&key) {
            return Ok(*count);
        }
        let count = self.catalog.probe_index(&index.table, &index.index_name, range)?;
        trace!("probe {} {} -> {}", index, range, count);
        self.probes.borrow_mut().insert(key, count);
        Ok(count)
    }

    pub fn probe_cache_len(&self) -> usize {
        self.probes.borrow().len()
    }
}

/// A join filter that splits into left-only and right-only operands.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleRelation {
    pub op: CompareOp,
    /// `(left operand, right operand)` per comparison, oriented to the join.
    pub operands: Vec<(Expr, Expr)>,
}

/// Detect a simple relation: one comparison, or an AND of equalities, each
/// comparing an expression over `left` only with one over `right` only.
pub fn detect_simple_relation(
    filter: &Expr,
    left: &BTreeSet<TableName>,
    right: &BTreeSet<TableName>,
) -> Option<SimpleRelation> {
    let conjuncts = filter.conjuncts();
    let mut op = None;
    let mut operands = Vec::with_capacity(conjuncts.len());
    for conjunct in &conjuncts {
        let (cmp, a, b) = conjunct.as_comparison()?;
        if conjuncts.len() > 1 && cmp != CompareOp::Eq {
            return None;
        }
        let (da, db) = (a.dependencies(), b.dependencies());
        if da.is_empty() || db.is_empty() {
            return None;
        }
        let oriented = if da.is_subset(left) && db.is_subset(right) {
            (cmp, a.clone(), b.clone())
        } else if da.is_subset(right) && db.is_subset(left) {
            (cmp.reverse(), b.clone(), a.clone())
        } else {
            return None;
        };
        match op {
            Some(prev) if prev != oriented.0 => return None,
            _ => op = Some(oriented.0),
        }
        operands.push((oriented.1, oriented.2));
    }
    Some(SimpleRelation { op: op?, operands })
}

/// Pluggable cost model.
pub trait CostModel: Send + Sync {
    /// Annotate `expr` and every operator below it, returning its cost.
    /// Nodes that already carry a cost are left untouched.
    fn compute_cost(&self, expr: &mut Expr, ctx: &CostContext<'_>, threshold: f64) -> Result<Cost>;
}

/// The default nested-loop/index cost model.
#[derive(Debug, Clone, Default)]
pub struct DefaultCostModel {
    pub config: CostConfig,
}

impl DefaultCostModel {
    pub fn new(config: CostConfig) -> Self {
        Self { config }
    }

    fn lookup(&self) -> f64 {
        self.config.index_lookup_cost
    }

    /// Fraction of rows surviving a predicate evaluated by scanning.
    fn selectivity(&self, predicate: &Expr, ctx: &CostContext<'_>) -> Result<f64> {
        if let Some((var, range)) = predicate.as_range_set() {
            return Ok(ctx.column_stats(var)?.estimate_range(range));
        }
        if let Some((op, a, b)) = predicate.as_comparison() {
            return match a.as_variable().or_else(|| b.as_variable()) {
                Some(var) => Ok(ctx.column_stats(var)?.estimate_operator(op)),
                None => Ok(1.0),
            };
        }
        let conjuncts = predicate.conjuncts();
        if conjuncts.len() > 1 {
            let mut best: f64 = 1.0;
            for conjunct in conjuncts {
                best = best.min(self.selectivity(conjunct, ctx)?);
            }
            return Ok(best);
        }
        Ok(1.0)
    }

    fn cost_filter(
        &self,
        kind: &FilterKind,
        child: &Expr,
        child_cost: Cost,
        ctx: &CostContext<'_>,
    ) -> Result<Cost> {
        let l = self.lookup();
        Ok(match kind {
            FilterKind::SingleFilter { predicate, index } => {
                let probed = match index {
                    Some(idx) => match (&idx.range, child.as_alias()) {
                        (Some(range), Some(alias)) if alias.alias == idx.alias => {
                            Some(ctx.probe(idx, range)?)
                        }
                        _ => None,
                    },
                    None => None,
                };
                match probed {
                    Some(count) => Cost::new((count as f64).min(child_cost.rows), child_cost.time + 2.0 * l),
                    None => Cost::new(
                        child_cost.rows * self.selectivity(predicate, ctx)?,
                        child_cost.time + child_cost.rows * self.config.scan_factor,
                    ),
                }
            }
            FilterKind::Sort { order, index } => {
                if index.is_some() || order_satisfies(&natural_order(child), order) {
                    Cost::new(child_cost.rows, child_cost.time + 2.0 * l)
                } else {
                    Cost::new(child_cost.rows, child_cost.time + child_cost.rows * l)
                }
            }
            FilterKind::StaticFilter { .. } | FilterKind::ExpressionTable | FilterKind::Aggregate { .. } => {
                child_cost
            }
        })
    }

    fn cost_join(
        &self,
        node: &JoinNode,
        left: Cost,
        right: Cost,
        ctx: &CostContext<'_>,
    ) -> Result<Cost> {
        let cfg = &self.config;
        let l = self.lookup();
        let join_type = node.join_type;
        let cost = match join_type {
            JoinType::Cartesian => Cost::new(left.rows * right.rows, left.time + right.time),
            JoinType::Inner | JoinType::OuterLeft => {
                let relation = node.filter.as_deref().and_then(|f| {
                    detect_simple_relation(f, &node.left.relations(), &node.right.relations())
                });
                match relation {
                    Some(rel) => {
                        let mut time = left.time + right.time + left.rows * (cfg.scan_factor + 2.0 * l);
                        if !node.strategy.use_right_index() {
                            time += right.rows * l;
                        }
                        let fact = node.strategy.fact.as_ref().and_then(|f| ctx.stats.fact(f));
                        let rows = match fact {
                            Some(p) => p * left.rows * right.rows,
                            None if rel.op == CompareOp::Eq => {
                                left.rows.min(right.rows)
                                    + (right.rows - left.rows).abs() / cfg.equi_join_spread_divisor
                            }
                            None => cfg.inequality_join_fraction * left.rows * right.rows,
                        };
                        Cost::new(rows, time)
                    }
                    None => Cost::new(
                        left.rows * right.rows,
                        left.time
                            + right.time
                            + left.rows * right.rows * cfg.scan_factor * cfg.no_relation_penalty,
                    ),
                }
            }
            other => {
                return Err(PlanError::UnsupportedJoinType {
                    join_type: other,
                    context: "cost model",
                })
            }
        };
        if join_type == JoinType::OuterLeft && cost.rows < left.rows {
            return Ok(Cost::new(left.rows, cost.time));
        }
        Ok(cost)
    }
}

fn aborted(rows: f64) -> Cost {
    Cost::new(rows, f64::INFINITY)
}

impl CostModel for DefaultCostModel {
    fn compute_cost(&self, expr: &mut Expr, ctx: &CostContext<'_>, threshold: f64) -> Result<Cost> {
        if expr.is_cost_set() {
            return expr.cost();
        }
        let cost = match &mut expr.kind {
            ExprKind::AliasTableName(alias) => match &alias.source.kind {
                ExprKind::FetchTable(table) => Cost::new(ctx.catalog.row_count(table)? as f64, 0.0),
                _ => {
                    return Err(PlanError::UnexpectedNode {
                        kind: alias.source.kind_name(),
                        context: "alias source",
                        node: alias.source.to_string(),
                    })
                }
            },
            ExprKind::Function(_) => Cost::new(1.0, 0.0),
            ExprKind::Filter(filter) => {
                let child_cost = self.compute_cost(&mut filter.child, ctx, threshold)?;
                if child_cost.time > threshold {
                    trace!("threshold {} exceeded below {}", threshold, filter.kind.name());
                    aborted(child_cost.rows)
                } else {
                    self.cost_filter(&filter.kind, &filter.child, child_cost, ctx)?
                }
            }
            ExprKind::Join(join) => {
                let left = self.compute_cost(&mut join.left, ctx, threshold)?;
                if left.time > threshold {
                    trace!("threshold {} exceeded on left join input", threshold);
                    aborted(left.rows)
                } else {
                    let right = self.compute_cost(&mut join.right, ctx, threshold)?;
                    if right.time > threshold {
                        trace!("threshold {} exceeded on right join input", threshold);
                        aborted(left.rows * right.rows)
                    } else {
                        self.cost_join(join, left, right, ctx)?
                    }
                }
            }
            ExprKind::FetchVariable(_) | ExprKind::FetchStatic(_) | ExprKind::FetchTable(_) => {
                return Err(PlanError::UnexpectedNode {
                    kind: expr.kind_name(),
                    context: "operator graph",
                    node: expr.to_string(),
                })
            }
        };
        expr.set_cost(cost);
        Ok(cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{IndexDef, InMemoryCatalog};
    use crate::expr::{JoinStrategy, SortKey};
    use crate::value::ScalarValue;

    fn catalog() -> InMemoryCatalog {
        let mut cat = InMemoryCatalog::new();
        for (name, rows) in [("a", 100), ("b", 20)] {
            cat.add_table(
                TableName::new(name),
                vec!["x".into()],
                (0..rows).map(|i| vec![ScalarValue::Int64(i)]).collect(),
            );
        }
        cat.add_index(&TableName::new("b"), IndexDef::ascending("b_x", &["x"])).unwrap();
        cat
    }

    fn scan(name: &str) -> Expr {
        Expr::alias(TableName::new(name), TableName::new(name))
    }

    fn with_ctx<T>(f: impl FnOnce(&CostContext<'_>) -> T) -> T {
        let cat = catalog();
        let stats = StatisticsStore::new();
        let ctx = CostContext::new(&cat, &stats, HashMap::new());
        f(&ctx)
    }

    #[test]
    fn test_cartesian_rows_are_exact_product() {
        with_ctx(|ctx| {
            let model = DefaultCostModel::default();
            let mut plan = Expr::join(JoinType::Cartesian, scan("a"), scan("b"), None);
            let cost = model.compute_cost(&mut plan, ctx, f64::INFINITY).unwrap();
            assert_eq!(cost, Cost::new(2000.0, 0.0));
        });
    }

    #[test]
    fn test_recost_after_clear_is_identical() {
        with_ctx(|ctx| {
            let model = DefaultCostModel::default();
            let filter = Expr::equals(Expr::column("a", "x"), Expr::column("b", "x"));
            let mut plan = Expr::join(JoinType::Inner, scan("a"), scan("b"), Some(filter));
            let first = model.compute_cost(&mut plan, ctx, f64::INFINITY).unwrap();
            plan.clear_costs();
            assert!(plan.cost().is_err());
            let second = model.compute_cost(&mut plan, ctx, f64::INFINITY).unwrap();
            assert_eq!(first, second);
            // 100 × (1 + 4) + 20 × 2
            assert_eq!(first.time, 540.0);
            assert_eq!(first.rows, 20.0 + 80.0 / 3.0);
        });
    }

    #[test]
    fn test_right_index_skips_inner_scan() {
        with_ctx(|ctx| {
            let model = DefaultCostModel::default();
            let filter = Expr::equals(Expr::column("a", "x"), Expr::column("b", "x"));
            let mut plan = Expr::join(JoinType::Inner, scan("a"), scan("b"), Some(filter));
            if let ExprKind::Join(j) = &mut plan.kind {
                j.strategy = JoinStrategy {
                    left_index: None,
                    right_index: Some(IndexCandidate {
                        table: TableName::new("b"),
                        alias: TableName::new("b"),
                        index_name: "b_x".into(),
                        columns: vec!["x".into()],
                        range: None,
                    }),
                    fact: None,
                };
            }
            let cost = model.compute_cost(&mut plan, ctx, f64::INFINITY).unwrap();
            assert_eq!(cost.time, 500.0);
        });
    }

    #[test]
    fn test_index_filter_probes_once() {
        with_ctx(|ctx| {
            let model = DefaultCostModel::default();
            let range = SelectableRange::construct(CompareOp::Lt, vec![ScalarValue::Int64(5)]).unwrap();
            let var = Variable::new(TableName::new("b"), "x");
            let candidate = IndexCandidate {
                table: TableName::new("b"),
                alias: TableName::new("b"),
                index_name: "b_x".into(),
                columns: vec!["x".into()],
                range: Some(range.clone()),
            };
            let make = || {
                Expr::filter(
                    FilterKind::SingleFilter {
                        predicate: Box::new(Expr::range_set(var.clone(), range.clone())),
                        index: Some(candidate.clone()),
                    },
                    scan("b"),
                )
            };
            let mut first = make();
            let cost = model.compute_cost(&mut first, ctx, f64::INFINITY).unwrap();
            assert_eq!(cost, Cost::new(5.0, 4.0));
            let mut second = make();
            model.compute_cost(&mut second, ctx, f64::INFINITY).unwrap();
            assert_eq!(ctx.probe_cache_len(), 1);
        });
    }

    #[test]
    fn test_scan_filter_below_sampling_threshold_keeps_rows() {
        with_ctx(|ctx| {
            let model = DefaultCostModel::default();
            let pred = Expr::compare(CompareOp::Gt, Expr::column("b", "x"), Expr::int(3));
            let mut plan = Expr::filter(
                FilterKind::SingleFilter {
                    predicate: Box::new(pred),
                    index: None,
                },
                scan("b"),
            );
            let cost = model.compute_cost(&mut plan, ctx, f64::INFINITY).unwrap();
            assert_eq!(cost, Cost::new(20.0, 20.0));
        });
    }

    #[test]
    fn test_sort_cost_depends_on_order() {
        with_ctx(|ctx| {
            let model = DefaultCostModel::default();
            let mut plan = Expr::filter(
                FilterKind::Sort {
                    order: vec![SortKey::asc(Expr::column("a", "x"))],
                    index: None,
                },
                scan("a"),
            );
            let cost = model.compute_cost(&mut plan, ctx, f64::INFINITY).unwrap();
            assert_eq!(cost.time, 200.0);
        });
    }

    #[test]
    fn test_threshold_marks_parent_infinite() {
        with_ctx(|ctx| {
            let model = DefaultCostModel::default();
            let inner = Expr::join(JoinType::Inner, scan("a"), scan("b"), None);
            let mut plan = Expr::join(JoinType::Cartesian, inner, scan("b"), None);
            let cost = model.compute_cost(&mut plan, ctx, 100.0).unwrap();
            assert!(cost.is_infinite());
        });
    }

    #[test]
    fn test_outer_left_rows_floor_and_unsupported_types() {
        with_ctx(|ctx| {
            let model = DefaultCostModel::default();
            let filter = Expr::compare(CompareOp::Lt, Expr::column("a", "x"), Expr::column("b", "x"));
            let mut outer = Expr::join(JoinType::OuterLeft, scan("a"), scan("b"), Some(filter));
            let cost = model.compute_cost(&mut outer, ctx, f64::INFINITY).unwrap();
            assert_eq!(cost.rows, 0.85 * 2000.0);

            let mut full = Expr::join(JoinType::FullOuter, scan("a"), scan("b"), None);
            assert!(matches!(
                model.compute_cost(&mut full, ctx, f64::INFINITY),
                Err(PlanError::UnsupportedJoinType { .. })
            ));
        });
    }

    #[test]
    fn test_detect_simple_relation() {
        let left: BTreeSet<_> = [TableName::new("a")].into();
        let right: BTreeSet<_> = [TableName::new("b")].into();
        let flipped = Expr::compare(CompareOp::Lt, Expr::column("b", "x"), Expr::column("a", "x"));
        let rel = detect_simple_relation(&flipped, &left, &right).unwrap();
        assert_eq!(rel.op, CompareOp::Gt);
        assert_eq!(rel.operands[0].0, Expr::column("a", "x"));

        let mixed = Expr::and(vec![
            Expr::equals(Expr::column("a", "x"), Expr::column("b", "x")),
            Expr::compare(CompareOp::Lt, Expr::column("a", "y"), Expr::column("b", "y")),
        ]);
        assert!(detect_simple_relation(&mixed, &left, &right).is_none());

        let one_sided = Expr::equals(Expr::column("a", "x"), Expr::column("a", "y"));
        assert!(detect_simple_relation(&one_sided, &left, &right).is_none());
    }
}
