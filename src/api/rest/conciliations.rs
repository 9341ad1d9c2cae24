use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use serde::Deserialize;

use crate::engine::reports::{self, DashboardCounts};
use crate::error::AppError;
use crate::models::UserId;
use crate::models::conciliation::{
    ConciliationFilter, ConciliationSummary, DeliveryConciliation, PlatformSummary,
};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(stats))
        .route("/conciliations", get(list_conciliations))
        .route("/conciliations/summary", get(platform_summary))
        .route("/conciliations/people/:id/summary", get(person_summary))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsParams {
    pub viewer_id: Option<UserId>,
}

async fn stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatsParams>,
) -> Result<Json<DashboardCounts>, AppError> {
    let viewer = match params.viewer_id {
        Some(id) => Some(state.gateway().user(id).await?),
        None => None,
    };
    let deliveries = state.gateway().all().await?;

    Ok(Json(reports::dashboard_counts(&deliveries, viewer.as_ref())))
}

async fn list_conciliations(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ConciliationFilter>,
) -> Result<Json<Vec<DeliveryConciliation>>, AppError> {
    Ok(Json(state.gateway().conciliations(&filter).await?))
}

async fn platform_summary(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ConciliationFilter>,
) -> Result<Json<PlatformSummary>, AppError> {
    Ok(Json(state.gateway().platform_summary(&filter).await?))
}

async fn person_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<UserId>,
) -> Result<Json<ConciliationSummary>, AppError> {
    Ok(Json(state.gateway().person_summary(id).await?))
}
