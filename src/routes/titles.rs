use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::request_id::RequestId,
    models::{Category, ProviderSlate, TitleIdentity},
    routes::AppState,
};

#[derive(Debug, Serialize)]
pub struct TitleProvidersResponse {
    pub title: TitleIdentity,
    pub region: String,
    pub providers: ProviderSlate,
}

fn parse_title(category: &str, id: i64) -> AppResult<TitleIdentity> {
    let category: Category = category.parse().map_err(AppError::InvalidInput)?;
    Ok(TitleIdentity::new(id, category))
}

/// Handler for a single title's providers, refreshing stale data first
pub async fn providers(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path((category, id)): Path<(String, i64)>,
) -> AppResult<Json<TitleProvidersResponse>> {
    let title = parse_title(&category, id)?;

    tracing::info!(request_id = %request_id, title = %title, "Providers requested");

    let records = state.availability.get_or_refresh(&title).await?;

    Ok(Json(TitleProvidersResponse {
        title,
        region: state.availability.region().to_string(),
        providers: ProviderSlate::from_records(records),
    }))
}

/// Handler that re-fetches upstream regardless of freshness
///
/// Called when a title is first added to a watchlist.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path((category, id)): Path<(String, i64)>,
) -> AppResult<Json<TitleProvidersResponse>> {
    let title = parse_title(&category, id)?;

    tracing::info!(request_id = %request_id, title = %title, "Provider refresh requested");

    let records = state.availability.refresh(&title).await?;

    Ok(Json(TitleProvidersResponse {
        title,
        region: state.availability.region().to_string(),
        providers: ProviderSlate::from_records(records),
    }))
}

/// Handler for cache cleanup when a watchlist entry is removed
pub async fn forget(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path((category, id)): Path<(String, i64)>,
) -> AppResult<StatusCode> {
    let title = parse_title(&category, id)?;

    tracing::info!(request_id = %request_id, title = %title, "Dropping cached providers");

    state.availability.forget(&title).await?;

    Ok(StatusCode::NO_CONTENT)
}
