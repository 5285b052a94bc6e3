//! # Randomized Beam Search
//!
//! Join ordering is NP-hard, so the planner never enumerates join orders. It
//! runs a bounded Monte-Carlo seed phase followed by local search, and keeps
//! only `(seed, predicate order)` pairs: every plan is regenerated from its
//! pair by the builder when needed.
//!
//! ## Seed Phase
//!
//! `seed_trials` random seeds and shuffled predicate orders are costed. The
//! cheapest distinct results are kept in a beam sorted by `(cost, seed)` whose
//! capacity grows with the query (`2 * relations + predicates`, clamped to
//! `min_beam..=max_beam`). Once the beam is full, costing aborts against the
//! worst kept cost.
//!
//! ## Refinement
//!
//! Walking from the worst-ranked entry to the best, each entry receives a
//! rank-dependent budget of perturbations: a light reshuffle of its predicate
//! order and, rarely, a new seed. Results strictly cheaper than the entry are
//! inserted into the beam (and, ranking above it, get refined in turn). After
//! each rank the beam is trimmed back to `max(rank, min_beam)`.
//! `max_refinement_steps` bounds the total number of rescorings.

use crate::builder::{build, PlanInput};
use crate::PlannerConfig;
use ordered_float::OrderedFloat;
use qplan_core::cost::{Cost, CostContext, CostModel};
use qplan_core::error::{PlanError, Result};
use qplan_core::expr::Expr;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, trace};

/// One beam entry.
#[derive(Debug, Clone)]
pub struct PlanState {
    pub seed: u64,
    pub predicate_order: Vec<usize>,
    pub cost: f64,
}

impl PlanState {
    fn key(&self) -> (OrderedFloat<f64>, u64) {
        (OrderedFloat(self.cost), self.seed)
    }
}

impl PartialEq for PlanState {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for PlanState {}

impl PartialOrd for PlanState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PlanState {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Counters of one search run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchStats {
    pub trials: usize,
    pub refinements: usize,
    pub improvements: usize,
    pub beam_capacity: usize,
}

/// Insert `state` into the sorted beam unless it is infinite or a duplicate.
/// Returns the insert position.
fn insert(beam: &mut Vec<PlanState>, state: PlanState) -> Option<usize> {
    if !state.cost.is_finite() {
        return None;
    }
    let duplicate = beam.iter().any(|s| {
        s.seed == state.seed && (s.cost == state.cost || s.predicate_order == state.predicate_order)
    });
    if duplicate {
        return None;
    }
    let pos = beam.partition_point(|s| s < &state);
    beam.insert(pos, state);
    Some(pos)
}

pub struct RandomizedSearch<'a> {
    input: &'a PlanInput,
    cost_model: &'a dyn CostModel,
    ctx: &'a CostContext<'a>,
    config: &'a PlannerConfig,
}

impl<'a> RandomizedSearch<'a> {
    pub fn new(
        input: &'a PlanInput,
        cost_model: &'a dyn CostModel,
        ctx: &'a CostContext<'a>,
        config: &'a PlannerConfig,
    ) -> Self {
        Self {
            input,
            cost_model,
            ctx,
            config,
        }
    }

    pub fn beam_capacity(&self) -> usize {
        let wanted = 2 * self.input.relations.len() + self.input.predicates.len();
        let min = self.config.min_beam.max(1);
        wanted.clamp(min, self.config.max_beam.max(min))
    }

    fn evaluate(&self, seed: u64, order: &[usize], threshold: f64) -> Result<f64> {
        let mut plan = build(self.input, order, seed)?;
        Ok(self.cost_model.compute_cost(&mut plan, self.ctx, threshold)?.time)
    }

    /// Swap a small fraction of positions in `order`.
    fn mess(&self, order: &mut [usize], rng: &mut StdRng) {
        if order.len() < 2 {
            return;
        }
        let swaps = ((order.len() as f64 * self.config.mess_fraction).round() as usize).max(1);
        for _ in 0..swaps {
            let i = rng.gen_range(0..order.len());
            let j = rng.gen_range(0..order.len());
            order.swap(i, j);
        }
    }

    fn seed_phase(&self, rng: &mut StdRng, stats: &mut SearchStats) -> Result<Vec<PlanState>> {
        let capacity = stats.beam_capacity;
        let mut beam: Vec<PlanState> = Vec::with_capacity(capacity + 1);
        for _ in 0..self.config.seed_trials.max(1) {
            let seed: u64 = rng.gen();
            let mut order: Vec<usize> = (0..self.input.predicates.len()).collect();
            order.shuffle(rng);
            let threshold = match beam.last() {
                Some(worst) if beam.len() >= capacity => worst.cost,
                _ => f64::INFINITY,
            };
            let cost = self.evaluate(seed, &order, threshold)?;
            stats.trials += 1;
            if beam.len() >= capacity && cost >= threshold {
                continue;
            }
            let state = PlanState {
                seed,
                predicate_order: order,
                cost,
            };
            if insert(&mut beam, state).is_some() {
                beam.truncate(capacity);
            }
        }
        debug!(
            "seed phase: {} trials, beam {} of {}, best {:?}",
            stats.trials,
            beam.len(),
            capacity,
            beam.first().map(|s| s.cost)
        );
        Ok(beam)
    }

    fn refine(&self, beam: &mut Vec<PlanState>, rng: &mut StdRng, stats: &mut SearchStats) -> Result<()> {
        let cfg = self.config;
        let mut rank = beam.len();
        while rank > 0 && stats.refinements < cfg.max_refinement_steps {
            rank -= 1;
            let tries = cfg.refine_tries_min.max(cfg.refine_tries_best / (1 + rank / 4));
            for _ in 0..tries {
                if stats.refinements >= cfg.max_refinement_steps {
                    break;
                }
                stats.refinements += 1;
                let base = beam[rank].clone();
                let mut order = base.predicate_order.clone();
                self.mess(&mut order, rng);
                let chance = (cfg.seed_change_chance / (rank + 1) as f64).clamp(0.0, 1.0);
                let seed = if rng.gen_bool(chance) { rng.gen() } else { base.seed };

                let cost = self.evaluate(seed, &order, base.cost)?;
                if cost >= base.cost {
                    continue;
                }
                let state = PlanState {
                    seed,
                    predicate_order: order,
                    cost,
                };
                if let Some(pos) = insert(beam, state) {
                    trace!("rank {}: {} -> {} (inserted at {})", rank, base.cost, cost, pos);
                    stats.improvements += 1;
                    if pos <= rank {
                        rank += 1;
                    }
                }
            }
            beam.truncate(rank.max(cfg.min_beam));
        }
        Ok(())
    }

    /// Search for the cheapest plan. Returns it fully cost-annotated.
    pub fn run(&self, rng: &mut StdRng) -> Result<(Expr, Cost, SearchStats)> {
        let mut stats = SearchStats {
            beam_capacity: self.beam_capacity(),
            ..SearchStats::default()
        };
        let mut beam = self.seed_phase(rng, &mut stats)?;
        self.refine(&mut beam, rng, &mut stats)?;

        let best = beam.first().ok_or_else(|| {
            PlanError::Bookkeeping("search finished without any finite-cost plan".into())
        })?;
        let mut plan = build(self.input, &best.predicate_order, best.seed)?;
        plan.clear_costs();
        let cost = self.cost_model.compute_cost(&mut plan, self.ctx, f64::INFINITY)?;
        debug!(
            "search done: {} trials, {} refinements ({} improving), cost {:.1}",
            stats.trials, stats.refinements, stats.improvements, cost.time
        );
        Ok((plan, cost, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(seed: u64, cost: f64, order: Vec<usize>) -> PlanState {
        PlanState {
            seed,
            predicate_order: order,
            cost,
        }
    }

    #[test]
    fn test_beam_orders_by_cost_then_seed() {
        let mut beam = Vec::new();
        assert_eq!(insert(&mut beam, state(5, 10.0, vec![0])), Some(0));
        assert_eq!(insert(&mut beam, state(3, 10.0, vec![1])), Some(0));
        assert_eq!(insert(&mut beam, state(1, 2.0, vec![0])), Some(0));
        let keys: Vec<(f64, u64)> = beam.iter().map(|s| (s.cost, s.seed)).collect();
        assert_eq!(keys, vec![(2.0, 1), (10.0, 3), (10.0, 5)]);
    }

    #[test]
    fn test_beam_rejects_duplicates_and_infinite_costs() {
        let mut beam = vec![state(7, 4.0, vec![0, 1])];
        assert_eq!(insert(&mut beam, state(7, 4.0, vec![1, 0])), None);
        assert_eq!(insert(&mut beam, state(7, 3.0, vec![0, 1])), None);
        assert_eq!(insert(&mut beam, state(8, f64::INFINITY, vec![0, 1])), None);
        assert_eq!(insert(&mut beam, state(8, 4.0, vec![0, 1])), Some(1));
    }
}
