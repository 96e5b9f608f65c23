use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::{
    middleware::request_id::{make_span_with_request_id, request_id_middleware},
    services::AvailabilityService,
};

pub mod titles;
pub mod watchlist;

/// Shared application state
pub struct AppState {
    pub availability: AvailabilityService,
}

impl AppState {
    pub fn new(availability: AvailabilityService) -> Self {
        Self { availability }
    }
}

/// Creates the application router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
}

/// API routes under /api/v1
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/titles/:category/:id/providers",
            get(titles::providers).delete(titles::forget),
        )
        .route("/titles/:category/:id/providers/refresh", post(titles::refresh))
        .route("/watchlist/availability", post(watchlist::availability))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
