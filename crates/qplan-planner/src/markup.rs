//! # Index and Fact Markup
//!
//! Before the search, every predicate is annotated with the indexes that could
//! evaluate it and, for join equalities, the canonical fact it corresponds to.
//!
//! ## Index Matching
//!
//! Only indexes with an all-ascending collation are considered.
//!
//! - **Filters** (one relation): an AND of point equalities whose columns are
//!   exactly an index's collation becomes a composite point probe, built in
//!   collation order. Any `range_set` on an index's leading column becomes a
//!   prefix probe on that index.
//! - **Joins** (several relations): for each side, an index whose collation
//!   starts with a column compared by equality to the other side can be probed
//!   once per outer row.
//! - **Order**: an index whose collation starts with the requested sort keys,
//!   all ascending and all on one relation, can deliver that order.
//!
//! ## Facts
//!
//! A predicate made only of `a.x = b.y` terms gets a `FactId` over the base
//! tables' columns. With `sample_facts` set, the fact statistic is populated
//! here, once, so the cost model can read it.

use crate::predicate::QueryPredicate;
use qplan_core::catalog::{Catalog, IndexDef};
use qplan_core::error::{PlanError, Result};
use qplan_core::expr::{CompareOp, Expr, IndexCandidate, SortKey, TableName, Variable};
use qplan_core::properties::order_alias;
use qplan_core::range::SelectableRange;
use qplan_core::stats::{FactId, StatisticsStore};
use qplan_core::value::ScalarValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::trace;

pub struct Markup<'a> {
    pub catalog: &'a dyn Catalog,
    pub stats: &'a StatisticsStore,
    /// Alias → base table.
    pub aliases: &'a HashMap<TableName, TableName>,
    pub sample_facts: bool,
}

impl<'a> Markup<'a> {
    fn base_table(&self, alias: &TableName) -> Result<&TableName> {
        self.aliases.get(alias).ok_or_else(|| {
            PlanError::Bookkeeping(format!("alias {} is not a relation of the query", alias))
        })
    }

    fn ascending_indexes(&self, alias: &TableName) -> Result<(TableName, Vec<IndexDef>)> {
        let table = self.base_table(alias)?.clone();
        let indexes = self
            .catalog
            .indexes(&table)?
            .into_iter()
            .filter(|i| !i.collation.is_empty() && i.all_ascending())
            .collect();
        Ok((table, indexes))
    }

    fn candidate(
        table: &TableName,
        alias: &TableName,
        index: &IndexDef,
        range: Option<SelectableRange>,
    ) -> IndexCandidate {
        IndexCandidate {
            table: table.clone(),
            alias: alias.clone(),
            index_name: index.name.clone(),
            columns: index.columns(),
            range,
        }
    }

    /// Annotate one predicate with index candidates and its fact id.
    pub fn mark_predicate(&self, predicate: &mut QueryPredicate) -> Result<()> {
        predicate.index_candidates.clear();
        predicate.fact = None;
        let deps = predicate.expression.dependencies();
        match deps.len() {
            0 => {}
            1 => {
                if let Some(alias) = deps.iter().next() {
                    predicate.index_candidates = self.filter_candidates(alias, &predicate.expression)?;
                }
            }
            _ => {
                let pairs = equality_pairs(&predicate.expression);
                for alias in &deps {
                    let columns: BTreeSet<&str> = pairs
                        .iter()
                        .flat_map(|(l, r)| [l, r])
                        .filter(|v| &v.table == alias)
                        .map(|v| v.column.as_str())
                        .collect();
                    predicate
                        .index_candidates
                        .extend(self.join_candidates(alias, &columns)?);
                }
                let only_equalities = !pairs.is_empty()
                    && pairs.len() == predicate.expression.conjuncts().len()
                    && deps.len() == 2;
                if only_equalities {
                    let base_pairs = pairs
                        .iter()
                        .map(|(l, r)| Ok((self.base_variable(l)?, self.base_variable(r)?)))
                        .collect::<Result<Vec<_>>>()?;
                    let id = FactId::from_equalities(&base_pairs);
                    if self.sample_facts {
                        self.stats.populate_fact(self.catalog, &id, &base_pairs)?;
                    }
                    predicate.fact = Some(id);
                }
            }
        }
        trace!(
            "predicate `{}`: {} index candidate(s), fact {:?}",
            predicate.expression,
            predicate.index_candidates.len(),
            predicate.fact
        );
        Ok(())
    }

    fn base_variable(&self, var: &Variable) -> Result<Variable> {
        Ok(Variable::new(self.base_table(&var.table)?.clone(), var.column.clone()))
    }

    fn filter_candidates(&self, alias: &TableName, expr: &Expr) -> Result<Vec<IndexCandidate>> {
        let (table, indexes) = self.ascending_indexes(alias)?;
        let conjuncts = expr.conjuncts();
        let mut out: Vec<IndexCandidate> = Vec::new();

        let mut points: BTreeMap<&str, ScalarValue> = BTreeMap::new();
        let mut all_points = true;
        for c in &conjuncts {
            match c.as_range_set() {
                Some((var, range)) if range.width() == 1 => match range.point_value() {
                    Some([value]) => {
                        points.insert(var.column.as_str(), value.clone());
                    }
                    _ => all_points = false,
                },
                _ => all_points = false,
            }
        }
        if all_points && points.len() > 1 {
            for index in &indexes {
                let columns = index.columns();
                let same_columns = columns.len() == points.len()
                    && columns.iter().all(|c| points.contains_key(c.as_str()));
                if !same_columns {
                    continue;
                }
                let key: Vec<ScalarValue> = columns
                    .iter()
                    .filter_map(|c| points.get(c.as_str()).cloned())
                    .collect();
                let range = SelectableRange::construct(CompareOp::Eq, key)?;
                out.push(Self::candidate(&table, alias, index, Some(range)));
            }
        }

        for c in &conjuncts {
            let Some((var, range)) = c.as_range_set() else {
                continue;
            };
            for index in &indexes {
                if index.leading_column() != Some(var.column.as_str())
                    || out.iter().any(|o| o.index_name == index.name)
                {
                    continue;
                }
                out.push(Self::candidate(&table, alias, index, Some(range.clone())));
            }
        }
        Ok(out)
    }

    fn join_candidates(&self, alias: &TableName, columns: &BTreeSet<&str>) -> Result<Vec<IndexCandidate>> {
        if columns.is_empty() {
            return Ok(Vec::new());
        }
        let (table, indexes) = self.ascending_indexes(alias)?;
        Ok(indexes
            .iter()
            .filter(|i| i.leading_column().map_or(false, |c| columns.contains(c)))
            .map(|i| Self::candidate(&table, alias, i, None))
            .collect())
    }

    /// An index able to deliver `order` by itself.
    pub fn sort_candidate(&self, order: &[SortKey]) -> Result<Option<IndexCandidate>> {
        let Some(alias) = order_alias(order) else {
            return Ok(None);
        };
        if order.iter().any(|k| !k.ascending) {
            return Ok(None);
        }
        let wanted: Vec<&str> = order
            .iter()
            .filter_map(|k| k.expr.as_variable().map(|v| v.column.as_str()))
            .collect();
        let (table, indexes) = self.ascending_indexes(alias)?;
        Ok(indexes
            .iter()
            .find(|i| {
                i.collation.len() >= wanted.len()
                    && i.collation.iter().zip(&wanted).all(|(c, w)| c.column == *w)
            })
            .map(|i| Self::candidate(&table, alias, i, None)))
    }
}

/// `(a.x, b.y)` for every `a.x = b.y` conjunct between two relations.
pub fn equality_pairs(expr: &Expr) -> Vec<(Variable, Variable)> {
    expr.conjuncts()
        .iter()
        .filter_map(|c| match c.as_comparison() {
            Some((CompareOp::Eq, a, b)) => match (a.as_variable(), b.as_variable()) {
                (Some(l), Some(r)) if l.table != r.table => Some((l.clone(), r.clone())),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use qplan_core::catalog::InMemoryCatalog;

    struct Fixture {
        catalog: InMemoryCatalog,
        stats: StatisticsStore,
        aliases: HashMap<TableName, TableName>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut catalog = InMemoryCatalog::new();
            let t = TableName::new("t");
            catalog.add_table(
                t.clone(),
                vec!["x".into(), "y".into(), "z".into()],
                (0..10)
                    .map(|i| vec![ScalarValue::Int64(i), ScalarValue::Int64(i % 2), ScalarValue::Int64(0)])
                    .collect(),
            );
            catalog.add_index(&t, IndexDef::ascending("t_x", &["x"])).unwrap();
            catalog.add_index(&t, IndexDef::ascending("t_yx", &["y", "x"])).unwrap();
            let aliases = HashMap::from([
                (TableName::new("a"), t.clone()),
                (TableName::new("b"), t.clone()),
            ]);
            Self {
                catalog,
                stats: StatisticsStore::new(),
                aliases,
            }
        }

        fn markup(&self) -> Markup<'_> {
            Markup {
                catalog: &self.catalog,
                stats: &self.stats,
                aliases: &self.aliases,
                sample_facts: true,
            }
        }
    }

    fn point(alias: &str, col: &str, v: i64) -> Expr {
        Expr::range_set(
            Variable::new(TableName::new(alias), col),
            SelectableRange::construct(CompareOp::Eq, vec![ScalarValue::Int64(v)]).unwrap(),
        )
    }

    #[test]
    fn test_composite_point_probe_in_collation_order() {
        let fx = Fixture::new();
        let mut pred = QueryPredicate::new(
            Expr::and(vec![point("a", "x", 3), point("a", "y", 1)]),
            BTreeSet::new(),
        );
        fx.markup().mark_predicate(&mut pred).unwrap();
        let composite = pred
            .index_candidates
            .iter()
            .find(|c| c.index_name == "t_yx")
            .unwrap();
        let range = composite.range.as_ref().unwrap();
        assert_eq!(
            range.point_value(),
            Some([ScalarValue::Int64(1), ScalarValue::Int64(3)].as_slice())
        );
        assert_eq!(composite.alias, TableName::new("a"));
        assert_eq!(composite.table, TableName::new("t"));
        assert!(pred.index_candidates.iter().any(|c| c.index_name == "t_x"));
    }

    #[test]
    fn test_join_equality_gets_candidates_and_fact() {
        let fx = Fixture::new();
        let mut pred = QueryPredicate::new(
            Expr::equals(Expr::column("a", "x"), Expr::column("b", "z")),
            BTreeSet::new(),
        );
        fx.markup().mark_predicate(&mut pred).unwrap();
        assert_eq!(pred.index_candidates.len(), 1);
        assert_eq!(pred.index_candidates[0].alias, TableName::new("a"));
        assert_eq!(pred.fact.as_ref().map(|f| f.as_str()), Some("t.x=t.z"));
        assert!(fx.stats.has_fact(pred.fact.as_ref().unwrap()));
    }

    #[test]
    fn test_sort_candidate_needs_matching_prefix() {
        let fx = Fixture::new();
        let m = fx.markup();
        let by_y = [SortKey::asc(Expr::column("a", "y"))];
        assert_eq!(m.sort_candidate(&by_y).unwrap().unwrap().index_name, "t_yx");
        let by_z = [SortKey::asc(Expr::column("a", "z"))];
        assert!(m.sort_candidate(&by_z).unwrap().is_none());
    }
}
