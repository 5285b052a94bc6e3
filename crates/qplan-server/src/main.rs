//! # qplan-server: HTTP Service for the Randomized Join Planner
//!
//! Exposes planning as a JSON service. A request is self-describing: it
//! carries the tables (columns, rows and declared indexes) next to the join
//! graph, WHERE clause and requested order, so the service keeps no catalog of
//! its own.
//!
//! ## Endpoints
//!
//! - `GET  /health` - Health check
//! - `GET  /config` - Default planner and cost configuration
//! - `POST /plan`   - Plan a query, returning the cost-annotated operator tree
//!
//! ## Configuration
//!
//! - `QPLAN_BIND_ADDR`: listen address, `0.0.0.0:3000` by default.
//! - `QPLAN_CONFIG`: optional JSON file with `{"planner": {...}, "cost": {...}}`
//!   overriding the default configuration. Requests may still override the
//!   planner configuration individually.
//! - `RUST_LOG`: log filter, `qplan=debug` by default.

mod routes;
mod state;

use axum::routing::{get, post};
use axum::Router;
use qplan_core::cost::CostConfig;
use qplan_planner::PlannerConfig;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerConfig {
    planner: PlannerConfig,
    cost: CostConfig,
}

fn load_config() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    match std::env::var("QPLAN_CONFIG") {
        Ok(path) => {
            let text = std::fs::read_to_string(&path)?;
            let config = serde_json::from_str(&text)?;
            tracing::info!("loaded configuration from {}", path);
            Ok(config)
        }
        Err(_) => Ok(ServerConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("qplan=debug".parse()?))
        .init();

    let config = load_config()?;
    let state = Arc::new(state::AppState::new(config.planner, config.cost));

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/config", get(routes::config))
        .route("/plan", post(routes::plan))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = std::env::var("QPLAN_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("qplan-server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
