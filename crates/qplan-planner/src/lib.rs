//! # qplan-planner: Randomized Join-Order and Access-Path Planner
//!
//! Turns a qualified join graph, a WHERE clause and an optional output order
//! into the cheapest operator tree the search discovers. Planning never
//! enumerates join orders; it runs a bounded randomized search over
//! `(seed, predicate order)` pairs.
//!
//! ## Pipeline
//!
//! 1. **`graph`**: flatten the join graph into relations, outer joins and
//!    inner-join filters.
//! 2. **`simplify`**: fold constant comparisons into ranges and merge them.
//! 3. **`predicate`**: split filters into `QueryPredicate`s and merge simple
//!    equalities over the same relations.
//! 4. **`outer_join`**: turn every outer join into one exclusive predicate and
//!    make other predicates wait for the joins they reach into.
//! 5. **`markup`**: attach index candidates and fact ids.
//! 6. **`search`**: seed trials plus local refinement, each candidate built by
//!    **`builder`** and priced by the cost model.

pub mod builder;
pub mod graph;
pub mod markup;
pub mod outer_join;
pub mod predicate;
pub mod search;
pub mod simplify;

use builder::PlanInput;
use markup::Markup;
use predicate::PredicatePool;
use qplan_core::catalog::Catalog;
use qplan_core::cost::{Cost, CostConfig, CostContext, CostModel, DefaultCostModel};
use qplan_core::error::{PlanError, Result};
use qplan_core::expr::{Expr, SortKey, TableName};
use qplan_core::stats::StatisticsStore;
use rand::rngs::StdRng;
use rand::SeedableRng;
use search::{RandomizedSearch, SearchStats};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Search tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Random candidates costed before local search.
    pub seed_trials: usize,
    pub min_beam: usize,
    pub max_beam: usize,
    /// Fraction of predicate-order positions swapped per perturbation.
    pub mess_fraction: f64,
    /// Perturbations given to the best-ranked beam entry.
    pub refine_tries_best: usize,
    pub refine_tries_min: usize,
    /// Chance of also drawing a new seed, divided by `rank + 1`.
    pub seed_change_chance: f64,
    /// Upper bound on rescorings during local search.
    pub max_refinement_steps: usize,
    /// Fixed seed for reproducible planning. Entropy when unset.
    pub rng_seed: Option<u64>,
    /// Populate join fact statistics during markup.
    pub sample_facts: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            seed_trials: 64,
            min_beam: 8,
            max_beam: 48,
            mess_fraction: 0.012,
            refine_tries_best: 24,
            refine_tries_min: 2,
            seed_change_chance: 0.10,
            max_refinement_steps: 4096,
            rng_seed: None,
            sample_facts: true,
        }
    }
}

/// A query as handed over by the expression producer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    /// Tree of `Join` and `AliasTableName` nodes. `None` for a query without FROM.
    #[serde(default)]
    pub join_graph: Option<Expr>,
    #[serde(default)]
    pub filter: Option<Expr>,
    #[serde(default)]
    pub order: Vec<SortKey>,
}

/// The chosen plan with its cost annotation and search counters.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedQuery {
    pub plan: Expr,
    pub cost: Cost,
    pub search: SearchStats,
}

impl PlannedQuery {
    pub fn explain(&self) -> String {
        self.plan.explain()
    }
}

/// The planner entry point.
///
/// Holds the metadata accessor, the statistics store shared across planning
/// calls, and the cost model. Each `plan` call has its own probe cache.
pub struct Planner {
    catalog: Arc<dyn Catalog>,
    stats: Arc<StatisticsStore>,
    cost_model: Arc<dyn CostModel>,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        stats: Arc<StatisticsStore>,
        cost_model: Arc<dyn CostModel>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            catalog,
            stats,
            cost_model,
            config,
        }
    }

    /// A planner with a fresh statistics store and the default cost model.
    pub fn with_catalog(catalog: Arc<dyn Catalog>, config: PlannerConfig) -> Self {
        Self::new(
            catalog,
            Arc::new(StatisticsStore::new()),
            Arc::new(DefaultCostModel::new(CostConfig::default())),
            config,
        )
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn statistics(&self) -> &Arc<StatisticsStore> {
        &self.stats
    }

    /// Plan one query.
    pub fn plan(&self, query: &Query) -> Result<PlannedQuery> {
        let started = Instant::now();
        let graph = graph::flatten(query.join_graph.as_ref())?;
        let aliases: HashMap<TableName, TableName> = graph
            .relations
            .iter()
            .map(|r| (r.alias.clone(), r.table.clone()))
            .collect();

        let mut pool = PredicatePool::new();
        if let Some(filter) = &query.filter {
            pool.add_filter(simplify::simplify(filter.clone())?, &BTreeSet::new());
        }
        for inner in &graph.inner_filters {
            pool.add_scoped_filter(
                simplify::simplify(inner.expr.clone())?,
                &inner.inside,
                &inner.tables,
            );
        }
        outer_join::propagate(&graph, &mut pool)?;

        let markup = Markup {
            catalog: self.catalog.as_ref(),
            stats: self.stats.as_ref(),
            aliases: &aliases,
            sample_facts: self.config.sample_facts,
        };
        let known = graph.aliases();
        let mut statics = Vec::new();
        let mut predicates = Vec::new();
        for mut predicate in pool.into_vec() {
            if predicate.is_static() {
                statics.push(predicate.expression);
                continue;
            }
            if predicate.dependent_on.is_empty() {
                return Err(PlanError::Bookkeeping(format!(
                    "constant `{}` under outer join(s) {:?} has no relation to bind to",
                    predicate, predicate.inside
                )));
            }
            if let Some(unknown) = predicate.dependent_on.iter().find(|t| !known.contains(*t)) {
                return Err(PlanError::Unschedulable {
                    predicate: predicate.to_string(),
                    reason: format!("references {}, which is not a relation of the query", unknown),
                });
            }
            markup.mark_predicate(&mut predicate)?;
            predicates.push(predicate);
        }
        let sort_index = if query.order.is_empty() {
            None
        } else {
            markup.sort_candidate(&query.order)?
        };
        debug!(
            "planning {} relation(s), {} predicate(s), {} static, {} outer join(s)",
            graph.relations.len(),
            predicates.len(),
            statics.len(),
            graph.outer_joins.len()
        );

        let input = PlanInput {
            relations: graph.relations,
            predicates,
            statics,
            order: query.order.clone(),
            sort_index,
        };
        let ctx = CostContext::new(self.catalog.as_ref(), self.stats.as_ref(), aliases);
        let mut rng = match self.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (plan, cost, search) =
            RandomizedSearch::new(&input, self.cost_model.as_ref(), &ctx, &self.config).run(&mut rng)?;

        info!(
            "planned in {:?}: cost {:.1}, rows {:.1}, {} trials, {} refinements, {} probes",
            started.elapsed(),
            cost.time,
            cost.rows,
            search.trials,
            search.refinements,
            ctx.probe_cache_len()
        );
        Ok(PlannedQuery { plan, cost, search })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_partial_json() {
        let cfg = PlannerConfig::default();
        assert_eq!(cfg.seed_trials, 64);
        assert_eq!((cfg.min_beam, cfg.max_beam), (8, 48));
        assert!(cfg.rng_seed.is_none());

        let partial: PlannerConfig =
            serde_json::from_str(r#"{"rng_seed": 9, "seed_trials": 4}"#).unwrap();
        assert_eq!(partial.rng_seed, Some(9));
        assert_eq!(partial.seed_trials, 4);
        assert_eq!(partial.max_refinement_steps, 4096);
    }
}
