pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;
pub mod models;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::analytics::{health, query_history, run_query};

pub mod ax_state {
    use crate::core::pipeline::NlqService;

    pub struct AppState {
        pub nlq: NlqService,
    }
}

pub fn app(state: Arc<ax_state::AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/analytics/query", post(run_query))
        .route("/api/analytics/query-history", get(query_history))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
