//! # Application State
//!
//! Shared by all request handlers through `Arc`. Requests bring their own
//! tables, so the state holds no catalog and no statistics: each request gets
//! a fresh in-memory catalog and statistics store. What is shared is the cost
//! model and the server's default planner configuration.

use qplan_core::cost::{CostConfig, CostModel, DefaultCostModel};
use qplan_planner::PlannerConfig;
use std::sync::Arc;

pub struct AppState {
    /// Stateless, so shared across concurrent requests.
    pub cost_model: Arc<dyn CostModel>,
    pub cost_config: CostConfig,
    /// Used for requests that carry no `config` of their own.
    pub planner_config: PlannerConfig,
}

impl AppState {
    pub fn new(planner_config: PlannerConfig, cost_config: CostConfig) -> Self {
        Self {
            cost_model: Arc::new(DefaultCostModel::new(cost_config.clone())),
            cost_config,
            planner_config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(PlannerConfig::default(), CostConfig::default())
    }
}
