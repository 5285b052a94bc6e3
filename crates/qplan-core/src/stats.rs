//! # Sampled Statistics
//!
//! Selectivity estimates come from a small, evenly spaced sample of each column,
//! drawn lazily the first time a plan needs the column and then cached for the
//! lifetime of the `StatisticsStore`. There is no incremental maintenance: a
//! stale sample is accepted until the store is cleared.
//!
//! ## Division Points
//!
//! A column with at least `MIN_SAMPLE_ROWS` rows is sampled at
//! `min(rows / 2, MAX_SAMPLE_ROWS)` evenly spaced positions (fetched in batches of
//! `FETCH_BATCH`). The sampled `(value, row)` pairs are sorted and
//! `DIVISION_POINTS` evenly spaced entries are kept. The points approximate the
//! column's quantile function:
//!
//! - **Equality**: the longest run of equal adjacent points, over 32, is the
//!   worst-case fraction of rows matching a single value.
//! - **Other comparisons**: non-null points over 32.
//! - **Concrete ranges**: points inside the range over 32.
//!
//! Below the sampling threshold every estimate is `1.0`. Estimates never fall
//! outside `[0, 1]`.
//!
//! ## Facts
//!
//! A fact is a join equality such as `a.x = b.y`, identified by a canonical
//! `FactId`. Its statistic is the fraction of equal pairs among the two columns'
//! division points, i.e. the probability that a random row pair satisfies the
//! join. An unknown fact is stored as `None` and the cost model falls back to
//! its generic join formulas.

use crate::catalog::Catalog;
use crate::error::Result;
use crate::expr::{CompareOp, Variable};
use crate::range::SelectableRange;
use crate::value::ScalarValue;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Tables with fewer rows are never sampled.
pub const MIN_SAMPLE_ROWS: u64 = 64;
/// Upper bound on sampled rows per column.
pub const MAX_SAMPLE_ROWS: u64 = 1024;
/// Number of division points kept per column.
pub const DIVISION_POINTS: usize = 32;
/// Row positions fetched per catalog call while sampling.
pub const FETCH_BATCH: usize = 24;

/// Canonical identity of a join-equality predicate.
///
/// Each equality is written with its lesser side first and the equalities are
/// sorted, so `b.y = a.x` and `a.x = b.y` share one id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactId(String);

impl FactId {
    pub fn from_equalities(pairs: &[(Variable, Variable)]) -> Self {
        let mut terms: Vec<String> = pairs
            .iter()
            .map(|(l, r)| {
                if l <= r {
                    format!("{}={}", l, r)
                } else {
                    format!("{}={}", r, l)
                }
            })
            .collect();
        terms.sort();
        terms.dedup();
        FactId(terms.join(" AND "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Division points of one base-table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    pub row_count: u64,
    pub sample_count: u64,
    /// Sorted division points; empty when the table was too small to sample.
    pub points: Vec<ScalarValue>,
}

impl ColumnStatistics {
    /// Sample a base-table column through the catalog.
    pub fn sample(catalog: &dyn Catalog, column: &Variable) -> Result<Self> {
        let row_count = catalog.row_count(&column.table)?;
        if row_count < MIN_SAMPLE_ROWS {
            trace!("{}: {} rows, below sampling threshold", column, row_count);
            return Ok(Self {
                row_count,
                sample_count: 0,
                points: Vec::new(),
            });
        }

        let sample_count = (row_count / 2).min(MAX_SAMPLE_ROWS);
        let positions: Vec<u64> = (0..sample_count)
            .map(|i| i * row_count / sample_count)
            .collect();

        let mut sorted: BTreeSet<(ScalarValue, u64)> = BTreeSet::new();
        for batch in positions.chunks(FETCH_BATCH) {
            let values = catalog.fetch_column(&column.table, &column.column, batch)?;
            sorted.extend(values.into_iter().zip(batch.iter().copied()));
        }

        let sorted: Vec<ScalarValue> = sorted.into_iter().map(|(v, _)| v).collect();
        let points = if sorted.is_empty() {
            Vec::new()
        } else {
            (0..DIVISION_POINTS)
                .map(|k| sorted[k * sorted.len() / DIVISION_POINTS].clone())
                .collect()
        };
        debug!(
            "sampled {}: rows={}, sample={}, points={}",
            column,
            row_count,
            sample_count,
            points.len()
        );
        Ok(Self {
            row_count,
            sample_count,
            points,
        })
    }

    pub fn is_sampled(&self) -> bool {
        self.points.len() == DIVISION_POINTS
    }

    /// Worst-case fraction of rows satisfying `column OP <some value>`.
    pub fn estimate_operator(&self, op: CompareOp) -> f64 {
        if !self.is_sampled() {
            return 1.0;
        }
        match op {
            CompareOp::Eq | CompareOp::Is => {
                let count_nulls = op == CompareOp::Is;
                let mut longest = 0usize;
                let mut run = 0usize;
                let mut prev: Option<&ScalarValue> = None;
                for point in &self.points {
                    if point.is_null() && !count_nulls {
                        run = 0;
                        prev = None;
                        continue;
                    }
                    run = match prev {
                        Some(p) if p == point => run + 1,
                        _ => 1,
                    };
                    longest = longest.max(run);
                    prev = Some(point);
                }
                longest.max(1) as f64 / DIVISION_POINTS as f64
            }
            CompareOp::IsNot => 1.0,
            _ => {
                let non_null = self.points.iter().filter(|p| !p.is_null()).count();
                non_null as f64 / DIVISION_POINTS as f64
            }
        }
    }

    /// Fraction of rows inside a concrete range.
    ///
    /// A non-empty range is floored at one division point: it may still match
    /// values that fall between two points.
    pub fn estimate_range(&self, range: &SelectableRange) -> f64 {
        if !self.is_sampled() {
            return 1.0;
        }
        if range.is_empty() {
            return 0.0;
        }
        let hits = self
            .points
            .iter()
            .filter(|p| range.intersects(std::slice::from_ref(*p)))
            .count()
            .max(1);
        (hits as f64 / DIVISION_POINTS as f64).min(1.0)
    }
}

/// Probability that a random row pair satisfies every equality of a fact.
///
/// `None` when either column is unsampled or no division points match.
pub fn fact_probability(pairs: &[(Arc<ColumnStatistics>, Arc<ColumnStatistics>)]) -> Option<f64> {
    if pairs.is_empty() {
        return None;
    }
    let mut probability = 1.0;
    for (left, right) in pairs {
        if !left.is_sampled() || !right.is_sampled() {
            return None;
        }
        let matches = left
            .points
            .iter()
            .flat_map(|l| right.points.iter().map(move |r| (l, r)))
            .filter(|(l, r)| !l.is_null() && l == r)
            .count();
        if matches == 0 {
            return None;
        }
        probability *= matches as f64 / (DIVISION_POINTS * DIVISION_POINTS) as f64;
    }
    Some(probability)
}

/// Shared cache of column and fact statistics.
///
/// Entries are populated once and then only read. Two planners racing on the
/// same cold entry may both sample it; the first insert wins.
#[derive(Debug, Default)]
pub struct StatisticsStore {
    columns: RwLock<HashMap<Variable, Arc<ColumnStatistics>>>,
    facts: RwLock<HashMap<FactId, Option<f64>>>,
}

impl StatisticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics of a base-table column, sampling it on first use.
    pub fn column(&self, catalog: &dyn Catalog, column: &Variable) -> Result<Arc<ColumnStatistics>> {
        if let Some(stats) = self.columns.read().get(column) {
            return Ok(Arc::clone(stats));
        }
        let stats = Arc::new(ColumnStatistics::sample(catalog, column)?);
        let mut columns = self.columns.write();
        Ok(Arc::clone(columns.entry(column.clone()).or_insert(stats)))
    }

    /// Cached probability of a fact. `None` if unknown or never populated.
    pub fn fact(&self, id: &FactId) -> Option<f64> {
        self.facts.read().get(id).copied().flatten()
    }

    pub fn has_fact(&self, id: &FactId) -> bool {
        self.facts.read().contains_key(id)
    }

    /// Compute and cache a fact over base-table column pairs, unless already cached.
    pub fn populate_fact(
        &self,
        catalog: &dyn Catalog,
        id: &FactId,
        pairs: &[(Variable, Variable)],
    ) -> Result<Option<f64>> {
        if let Some(known) = self.facts.read().get(id) {
            return Ok(*known);
        }
        let stats = pairs
            .iter()
            .map(|(l, r)| Ok((self.column(catalog, l)?, self.column(catalog, r)?)))
            .collect::<Result<Vec<_>>>()?;
        let probability = fact_probability(&stats);
        debug!("fact {}: {:?}", id, probability);
        Ok(*self.facts.write().entry(id.clone()).or_insert(probability))
    }

    /// Record a fact probability directly.
    pub fn insert_fact(&self, id: FactId, probability: Option<f64>) {
        self.facts.write().insert(id, probability);
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.columns.write().clear();
        self.facts.write().clear();
    }

    pub fn column_count(&self) -> usize {
        self.columns.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::expr::TableName;

    fn table(rows: i64, value: impl Fn(i64) -> ScalarValue) -> (InMemoryCatalog, Variable) {
        let name = TableName::new("t");
        let mut cat = InMemoryCatalog::new();
        cat.add_table(
            name.clone(),
            vec!["x".into()],
            (0..rows).map(|i| vec![value(i)]).collect(),
        );
        (cat, Variable::new(name, "x"))
    }

    #[test]
    fn test_small_table_is_worst_case() {
        let (cat, x) = table(63, ScalarValue::Int64);
        let stats = ColumnStatistics::sample(&cat, &x).unwrap();
        assert!(!stats.is_sampled());
        for op in [CompareOp::Eq, CompareOp::Lt, CompareOp::IsNot] {
            assert_eq!(stats.estimate_operator(op), 1.0);
        }
        assert_eq!(stats.estimate_range(&SelectableRange::empty(1)), 1.0);
    }

    #[test]
    fn test_distinct_values_give_one_point_equality() {
        let (cat, x) = table(2000, ScalarValue::Int64);
        let stats = ColumnStatistics::sample(&cat, &x).unwrap();
        assert_eq!(stats.sample_count, 1000);
        assert_eq!(stats.estimate_operator(CompareOp::Eq), 1.0 / 32.0);
        assert_eq!(stats.estimate_operator(CompareOp::Gt), 1.0);
    }

    #[test]
    fn test_null_run_only_counts_for_is() {
        let (cat, x) = table(200, |i| {
            if i < 100 {
                ScalarValue::Null
            } else {
                ScalarValue::Int64(i)
            }
        });
        let stats = ColumnStatistics::sample(&cat, &x).unwrap();
        assert_eq!(stats.estimate_operator(CompareOp::Eq), 1.0 / 32.0);
        assert_eq!(stats.estimate_operator(CompareOp::Is), 0.5);
        assert_eq!(stats.estimate_operator(CompareOp::Lt), 0.5);
        assert_eq!(stats.estimate_operator(CompareOp::IsNot), 1.0);
    }

    #[test]
    fn test_range_estimates_are_bounded() {
        let (cat, x) = table(640, ScalarValue::Int64);
        let stats = ColumnStatistics::sample(&cat, &x).unwrap();
        let half = SelectableRange::construct(CompareOp::Lt, vec![ScalarValue::Int64(320)]).unwrap();
        assert_eq!(stats.estimate_range(&half), 0.5);
        let narrow = SelectableRange::construct(CompareOp::Eq, vec![ScalarValue::Int64(7)]).unwrap();
        assert_eq!(stats.estimate_range(&narrow), 1.0 / 32.0);
        assert_eq!(stats.estimate_range(&SelectableRange::empty(1)), 0.0);
        assert_eq!(stats.estimate_range(&SelectableRange::full(1)), 1.0);
        assert_eq!(stats.estimate_range(&half), stats.estimate_range(&half));
    }

    #[test]
    fn test_store_caches_columns_and_facts() {
        let (cat, x) = table(128, |i| ScalarValue::Int64(i / 32));
        let store = StatisticsStore::new();
        let first = store.column(&cat, &x).unwrap();
        let second = store.column(&cat, &x).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.column_count(), 1);

        let id = FactId::from_equalities(&[(x.clone(), x.clone())]);
        assert!(!store.has_fact(&id));
        let p = store.populate_fact(&cat, &id, &[(x.clone(), x.clone())]).unwrap();
        assert_eq!(p, Some(0.25));
        assert_eq!(store.fact(&id), Some(0.25));

        store.clear();
        assert_eq!(store.column_count(), 0);
        assert!(!store.has_fact(&id));
    }

    #[test]
    fn test_fact_id_is_canonical() {
        let a = Variable::new(TableName::new("a"), "x");
        let b = Variable::new(TableName::new("b"), "y");
        let one = FactId::from_equalities(&[(a.clone(), b.clone())]);
        let two = FactId::from_equalities(&[(b, a)]);
        assert_eq!(one, two);
        assert_eq!(one.as_str(), "a.x=b.y");
    }
}
