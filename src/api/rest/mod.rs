pub mod actions;
pub mod conciliations;
pub mod deliveries;
pub mod users;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::store::DeliveryQuery;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(users::router())
        .merge(deliveries::router())
        .merge(actions::router())
        .merge(conciliations::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    source: &'static str,
    users: usize,
    deliveries: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    let users = state.gateway().users().await?;
    let deliveries = state.gateway().all().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        source: state.gateway().kind().as_str(),
        users: users.len(),
        deliveries: deliveries.len(),
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.gateway().find(&DeliveryQuery::all()).await {
        Ok(deliveries) => state.metrics.record_statuses(&deliveries),
        Err(err) => tracing::warn!(error = %err, "failed to refresh status gauge"),
    }

    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
