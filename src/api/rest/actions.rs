use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::post;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::Operation;
use crate::error::AppError;
use crate::models::delivery::Delivery;
use crate::models::user::User;
use crate::models::{DeliveryId, UserId};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries/:id/assign", post(assign))
        .route("/deliveries/:id/start", post(start))
        .route("/deliveries/:id/complete", post(complete))
        .route("/deliveries/:id/cancel", post(cancel))
        .route("/deliveries/:id/reconcile", post(reconcile))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub person_id: UserId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRequest {
    pub actor_id: UserId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub actor_id: UserId,
    #[serde(default)]
    pub evidence_images: Vec<String>,
    #[serde(default)]
    pub actual_delivery_time: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    pub moderator_id: UserId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    #[serde(flatten)]
    pub delivery: Delivery,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_update_error: Option<String>,
}

/// Actions carry the acting user's id; an id with no user behind it is not an
/// identity.
pub(super) async fn actor(state: &AppState, id: UserId) -> Result<User, AppError> {
    match state.gateway().user(id).await {
        Err(AppError::NotFound(_)) => Err(AppError::Unauthorized(format!("unknown user {id}"))),
        other => other,
    }
}

async fn assign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DeliveryId>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<Delivery>, AppError> {
    let started = Instant::now();
    let result = async {
        let person = actor(&state, payload.person_id).await?;
        state.engine.assign(id, &person).await
    }
    .await;

    state.metrics.observe(Operation::Assign, started, &result);
    result.map(Json)
}

async fn start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DeliveryId>,
    Json(payload): Json<ActorRequest>,
) -> Result<Json<Delivery>, AppError> {
    let started = Instant::now();
    let result = async {
        let user = actor(&state, payload.actor_id).await?;
        state.engine.start(id, &user).await
    }
    .await;

    state.metrics.observe(Operation::Start, started, &result);
    result.map(Json)
}

async fn complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DeliveryId>,
    Json(payload): Json<CompleteRequest>,
) -> Result<Json<CompletionResponse>, AppError> {
    let started = Instant::now();
    let result = async {
        let user = actor(&state, payload.actor_id).await?;
        state
            .engine
            .complete(
                id,
                &user,
                payload.evidence_images,
                payload.actual_delivery_time,
            )
            .await
    }
    .await;

    state.metrics.observe(Operation::Complete, started, &result);
    let completion = result?;
    Ok(Json(CompletionResponse {
        delivery: completion.delivery,
        time_update_error: completion.time_update_error.map(|err| err.to_string()),
    }))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DeliveryId>,
    Json(payload): Json<ActorRequest>,
) -> Result<Json<Delivery>, AppError> {
    let started = Instant::now();
    let result = async {
        let user = actor(&state, payload.actor_id).await?;
        state.engine.cancel(id, &user).await
    }
    .await;

    state.metrics.observe(Operation::Cancel, started, &result);
    result.map(Json)
}

async fn reconcile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DeliveryId>,
    Json(payload): Json<ReconcileRequest>,
) -> Result<Json<Delivery>, AppError> {
    let started = Instant::now();
    let result = async {
        let moderator = actor(&state, payload.moderator_id).await?;
        state.engine.reconcile(id, &moderator).await
    }
    .await;

    state.metrics.observe(Operation::Reconcile, started, &result);
    result.map(Json)
}
