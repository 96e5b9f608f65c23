use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::request_id::RequestId,
    models::{Category, WatchlistAvailability, WatchlistEntry, WatchlistFilter},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct WatchlistAvailabilityRequest {
    /// The user's tracked titles, in display order
    pub entries: Vec<WatchlistEntry>,
    /// Canonical provider name to narrow the sections by
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
}

/// Handler for the watchlist availability endpoint
pub async fn availability(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<WatchlistAvailabilityRequest>,
) -> AppResult<Json<WatchlistAvailability>> {
    tracing::info!(
        request_id = %request_id,
        entries = request.entries.len(),
        provider = ?request.provider,
        category = ?request.category,
        "Processing watchlist availability request"
    );

    let filter = WatchlistFilter {
        provider: request.provider,
        category: request.category,
    };

    let response = state
        .availability
        .aggregate(&request.entries, &filter)
        .await?;

    tracing::info!(
        request_id = %request_id,
        shown = response.sections.len(),
        "Watchlist availability completed"
    );

    Ok(Json(response))
}
