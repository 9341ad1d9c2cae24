use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use tracing::info;

use super::actions::actor;
use crate::engine::Operation;
use crate::error::AppError;
use crate::models::DeliveryId;
use crate::models::delivery::{Delivery, DeliveryPatch, NewDelivery};
use crate::state::AppState;
use crate::store::query::{DeliveryQuery, DeliveryQueryParams};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", get(list_deliveries).post(create_delivery))
        .route(
            "/deliveries/:id",
            get(get_delivery)
                .patch(patch_delivery)
                .delete(delete_delivery),
        )
}

async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DeliveryQueryParams>,
) -> Result<Json<Vec<Delivery>>, AppError> {
    let query = DeliveryQuery::try_from(params)?;
    Ok(Json(state.gateway().find(&query).await?))
}

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewDelivery>,
) -> Result<(StatusCode, Json<Delivery>), AppError> {
    let started = Instant::now();
    let result = async {
        let moderator = actor(&state, payload.created_by).await?;
        state.engine.create(&moderator, payload).await
    }
    .await;

    state.metrics.observe(Operation::Create, started, &result);
    result.map(|delivery| (StatusCode::CREATED, Json(delivery)))
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DeliveryId>,
) -> Result<Json<Delivery>, AppError> {
    Ok(Json(state.gateway().get(id).await?))
}

async fn patch_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DeliveryId>,
    Json(patch): Json<DeliveryPatch>,
) -> Result<Json<Delivery>, AppError> {
    if patch.is_empty() {
        return Err(AppError::BadRequest("patch has no fields".to_string()));
    }

    Ok(Json(state.gateway().patch(id, &patch).await?))
}

async fn delete_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DeliveryId>,
) -> Result<StatusCode, AppError> {
    state.gateway().delete(id).await?;
    info!(delivery_id = id, "delivery deleted");
    Ok(StatusCode::NO_CONTENT)
}
