//! # HTTP Route Handlers
//!
//! ## Error Handling
//!
//! - 400 Bad Request: the request's tables do not describe a valid catalog
//!   (an index over a missing column, a table listed twice).
//! - 422 Unprocessable Entity: planning failed with a `PlanError`.
//! - 500 Internal Server Error: the planning task did not complete.
//!
//! Malformed JSON is rejected by the `Json` extractor before reaching a handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use qplan_core::catalog::{InMemoryCatalog, InMemoryTable};
use qplan_core::cost::{Cost, CostConfig};
use qplan_core::expr::{Expr, TableName};
use qplan_core::stats::StatisticsStore;
use qplan_core::PlanError;
use qplan_planner::search::SearchStats;
use qplan_planner::{Planner, PlannerConfig, Query};

use crate::state::AppState;

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /config: the defaults applied to requests without a `config`.
pub async fn config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ConfigResponse {
        planner: state.planner_config.clone(),
        cost: state.cost_config.clone(),
    })
}

#[derive(Serialize)]
pub struct ConfigResponse {
    pub planner: PlannerConfig,
    pub cost: CostConfig,
}

/// One table of a planning request: its qualified name plus rows and indexes.
#[derive(Debug, Deserialize)]
pub struct TableSpec {
    pub table: TableName,
    #[serde(flatten)]
    pub data: InMemoryTable,
}

/// Request body for `POST /plan`.
#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    #[serde(default)]
    pub tables: Vec<TableSpec>,
    #[serde(flatten)]
    pub query: Query,
    /// Overrides the server's planner configuration for this request.
    #[serde(default)]
    pub config: Option<PlannerConfig>,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    /// The chosen operator tree, every node annotated with its cost.
    pub plan: Expr,
    pub cost: Cost,
    pub search: SearchStats,
    pub explain: String,
}

fn build_catalog(tables: Vec<TableSpec>) -> Result<InMemoryCatalog, (StatusCode, String)> {
    let mut catalog = InMemoryCatalog::new();
    let mut seen = HashSet::new();
    for entry in tables {
        if !seen.insert(entry.table.clone()) {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("table {} is listed more than once", entry.table),
            ));
        }
        catalog
            .insert_table(entry.table, entry.data)
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid table: {}", e)))?;
    }
    Ok(catalog)
}

fn plan_error(e: PlanError) -> (StatusCode, String) {
    warn!("planning failed: {}", e);
    (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
}

/// POST /plan: plan a query over the tables sent with it.
pub async fn plan(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PlanRequest>,
) -> Result<Json<PlanResponse>, (StatusCode, String)> {
    debug!("plan request over {} table(s)", req.tables.len());
    let catalog = build_catalog(req.tables)?;
    let config = req.config.unwrap_or_else(|| state.planner_config.clone());
    let planner = Planner::new(
        Arc::new(catalog),
        Arc::new(StatisticsStore::new()),
        state.cost_model.clone(),
        config,
    );
    let query = req.query;

    // Planning is CPU-bound; keep it off the async workers.
    let planned = tokio::task::spawn_blocking(move || planner.plan(&query))
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Planning task failed: {}", e),
            )
        })?
        .map_err(plan_error)?;

    Ok(Json(PlanResponse {
        explain: planned.explain(),
        plan: planned.plan,
        cost: planned.cost,
        search: planned.search,
    }))
}
