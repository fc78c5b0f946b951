use std::sync::Arc;

use axum::{routing::get, Router};
use ifwatch_core::Registry;
use tower_http::cors::{Any, CorsLayer};

pub mod error;
pub mod series;
pub mod targets;

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

/// Build the main application router with all API routes.
pub fn router(registry: Arc<Registry>) -> Router {
    let state = AppState { registry };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health))
        // Target and interface listings
        .route("/targets", get(targets::list))
        .route("/targets/{id}/interfaces", get(targets::interfaces))
        // Rate-point series for one (interface, metric)
        .route(
            "/targets/{id}/interfaces/{ifindex}/series",
            get(series::series),
        );

    Router::new().nest("/api/v1", api_v1).layer(cors).with_state(state)
}

/// Simple health check endpoint.
async fn health() -> &'static str {
    "ok"
}
