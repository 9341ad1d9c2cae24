use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryPatch, DeliveryStatus, NewDelivery};
use crate::models::user::{Role, User};
use crate::models::{DeliveryId, UserId};
use crate::store::gateway::DeliveryGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Assign,
    Start,
    Complete,
    Cancel,
    Reconcile,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Assign => "assign",
            Operation::Start => "start",
            Operation::Complete => "complete",
            Operation::Cancel => "cancel",
            Operation::Reconcile => "reconcile",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("delivery {id} is no longer available")]
    NotAvailable { id: DeliveryId },

    #[error("cannot {operation} delivery {id} while it is {status}")]
    InvalidState {
        id: DeliveryId,
        operation: &'static str,
        status: DeliveryStatus,
    },

    #[error("delivery {id} can no longer be cancelled: estimated delivery time has passed")]
    CancellationWindowClosed { id: DeliveryId },
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::Conflict(err.to_string())
    }
}

fn require_status(
    delivery: &Delivery,
    operation: Operation,
    allowed: &[DeliveryStatus],
) -> Result<(), TransitionError> {
    if allowed.contains(&delivery.status) {
        Ok(())
    } else {
        Err(TransitionError::InvalidState {
            id: delivery.id,
            operation: operation.as_str(),
            status: delivery.status,
        })
    }
}

pub fn plan_assign(
    delivery: &Delivery,
    person: UserId,
    now: DateTime<Utc>,
) -> Result<DeliveryPatch, TransitionError> {
    if delivery.status != DeliveryStatus::Available || delivery.assigned_to.is_some() {
        return Err(TransitionError::NotAvailable { id: delivery.id });
    }

    Ok(DeliveryPatch {
        status: Some(DeliveryStatus::Assigned),
        assigned_to: Some(Some(person)),
        started_at: Some(Some(now)),
        ..DeliveryPatch::default()
    }
    .guarded(DeliveryStatus::Available))
}

pub fn plan_start(delivery: &Delivery) -> Result<DeliveryPatch, TransitionError> {
    require_status(delivery, Operation::Start, &[DeliveryStatus::Assigned])?;

    Ok(DeliveryPatch {
        status: Some(DeliveryStatus::InTransit),
        ..DeliveryPatch::default()
    }
    .guarded(DeliveryStatus::Assigned))
}

pub fn plan_complete(
    delivery: &Delivery,
    evidence_images: Vec<String>,
    now: DateTime<Utc>,
) -> Result<DeliveryPatch, TransitionError> {
    require_status(
        delivery,
        Operation::Complete,
        &[DeliveryStatus::Assigned, DeliveryStatus::InTransit],
    )?;

    Ok(DeliveryPatch {
        status: Some(DeliveryStatus::Completed),
        completed_at: Some(Some(now)),
        actual_delivery_time: Some(Some(now)),
        evidence_images: Some(evidence_images),
        is_reconciled: Some(false),
        reconciled_at: Some(None),
        reconciled_by: Some(None),
        ..DeliveryPatch::default()
    }
    .guarded(delivery.status))
}

/// Cancelling releases the delivery for other personnel. Only allowed
/// strictly before the estimated delivery time.
pub fn plan_cancel(
    delivery: &Delivery,
    now: DateTime<Utc>,
) -> Result<DeliveryPatch, TransitionError> {
    require_status(
        delivery,
        Operation::Cancel,
        &[DeliveryStatus::Assigned, DeliveryStatus::InTransit],
    )?;

    if now >= delivery.estimated_delivery_time {
        return Err(TransitionError::CancellationWindowClosed { id: delivery.id });
    }

    Ok(DeliveryPatch {
        status: Some(DeliveryStatus::Available),
        assigned_to: Some(None),
        started_at: Some(None),
        actual_delivery_time: Some(None),
        ..DeliveryPatch::default()
    }
    .guarded(delivery.status))
}

/// Re-reconciling only moves the timestamp; the flag stays set.
pub fn plan_reconcile(
    delivery: &Delivery,
    moderator: UserId,
    now: DateTime<Utc>,
) -> Result<DeliveryPatch, TransitionError> {
    require_status(delivery, Operation::Reconcile, &[DeliveryStatus::Completed])?;

    Ok(DeliveryPatch {
        is_reconciled: Some(true),
        reconciled_at: Some(Some(now)),
        reconciled_by: Some(Some(moderator)),
        ..DeliveryPatch::default()
    }
    .guarded(DeliveryStatus::Completed))
}

fn require_role(actor: &User, role: Role, operation: Operation) -> Result<(), AppError> {
    if actor.role == role {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "user {} may not {} deliveries",
        actor.id,
        operation.as_str()
    )))
}

fn require_assignee(actor: &User, delivery: &Delivery, operation: Operation) -> Result<(), AppError> {
    if delivery.is_assigned_to(actor.id) {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "user {} is not assigned to delivery {}, cannot {}",
        actor.id,
        delivery.id,
        operation.as_str()
    )))
}

#[derive(Debug)]
pub struct Completion {
    pub delivery: Delivery,
    /// Set when the caller's actual delivery time could not be written. The
    /// completion itself stands.
    pub time_update_error: Option<AppError>,
}

/// Drives the delivery state machine through a [`DeliveryGateway`]. Each
/// operation is one guarded partial write.
#[derive(Clone)]
pub struct LifecycleEngine {
    gateway: DeliveryGateway,
}

impl LifecycleEngine {
    pub fn new(gateway: DeliveryGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &DeliveryGateway {
        &self.gateway
    }

    pub async fn create(&self, moderator: &User, mut draft: NewDelivery) -> Result<Delivery, AppError> {
        require_role(moderator, Role::Moderator, Operation::Create)?;
        draft.created_by = moderator.id;
        draft.validate()?;

        let delivery = self.gateway.create(draft).await?;
        info!(delivery_id = delivery.id, moderator_id = moderator.id, "delivery created");
        Ok(delivery)
    }

    pub async fn assign(&self, id: DeliveryId, person: &User) -> Result<Delivery, AppError> {
        require_role(person, Role::Delivery, Operation::Assign)?;

        let current = self.gateway.get(id).await?;
        let patch = plan_assign(&current, person.id, Utc::now())?;

        let updated = match self.gateway.patch(id, &patch).await {
            Err(AppError::Conflict(reason)) => {
                warn!(delivery_id = id, person_id = person.id, %reason, "claim lost");
                return Err(TransitionError::NotAvailable { id }.into());
            }
            other => other?,
        };

        if !updated.is_assigned_to(person.id) {
            return Err(TransitionError::NotAvailable { id }.into());
        }

        info!(delivery_id = id, person_id = person.id, "delivery assigned");
        Ok(updated)
    }

    pub async fn start(&self, id: DeliveryId, actor: &User) -> Result<Delivery, AppError> {
        let current = self.gateway.get(id).await?;
        require_assignee(actor, &current, Operation::Start)?;
        let patch = plan_start(&current)?;

        let updated = self.gateway.patch(id, &patch).await?;
        info!(delivery_id = id, "delivery in transit");
        Ok(updated)
    }

    /// Assignee completes with evidence; a moderator may complete on someone's
    /// behalf without evidence.
    pub async fn complete(
        &self,
        id: DeliveryId,
        actor: &User,
        evidence_images: Vec<String>,
        actual_delivery_time: Option<DateTime<Utc>>,
    ) -> Result<Completion, AppError> {
        let current = self.gateway.get(id).await?;
        if !actor.is_moderator() {
            require_assignee(actor, &current, Operation::Complete)?;
        }

        let patch = plan_complete(&current, evidence_images, Utc::now())?;
        let completed = self.gateway.patch(id, &patch).await?;
        info!(
            delivery_id = id,
            actor_id = actor.id,
            evidence = completed.evidence_images.len(),
            "delivery completed"
        );

        let Some(actual) = actual_delivery_time else {
            return Ok(Completion {
                delivery: completed,
                time_update_error: None,
            });
        };

        let time_patch = DeliveryPatch {
            actual_delivery_time: Some(Some(actual)),
            ..DeliveryPatch::default()
        };
        match self.gateway.patch(id, &time_patch).await {
            Ok(delivery) => Ok(Completion {
                delivery,
                time_update_error: None,
            }),
            Err(err) => {
                warn!(delivery_id = id, error = %err, "completed but actual delivery time was not saved");
                Ok(Completion {
                    delivery: completed,
                    time_update_error: Some(err),
                })
            }
        }
    }

    pub async fn cancel(&self, id: DeliveryId, actor: &User) -> Result<Delivery, AppError> {
        let current = self.gateway.get(id).await?;
        require_assignee(actor, &current, Operation::Cancel)?;
        let patch = plan_cancel(&current, Utc::now())?;

        let updated = self.gateway.patch(id, &patch).await?;
        info!(delivery_id = id, person_id = actor.id, "delivery released");
        Ok(updated)
    }

    pub async fn reconcile(&self, id: DeliveryId, moderator: &User) -> Result<Delivery, AppError> {
        require_role(moderator, Role::Moderator, Operation::Reconcile)?;

        let current = self.gateway.get(id).await?;
        let patch = plan_reconcile(&current, moderator.id, Utc::now())?;

        let updated = self.gateway.patch(id, &patch).await?;
        info!(delivery_id = id, moderator_id = moderator.id, "delivery reconciled");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::delivery::PackageDetails;
    use crate::models::delivery::fixtures::{at, delivery};
    use crate::store::FixtureSource;
    use crate::store::fixture::demo_users;

    fn engine() -> LifecycleEngine {
        LifecycleEngine::new(DeliveryGateway::new(Arc::new(FixtureSource::seeded())))
    }

    fn users() -> (User, User, User) {
        let mut users = demo_users().into_iter();
        let moderator = users.next().unwrap();
        let john = users.next().unwrap();
        let jane = users.next().unwrap();
        (moderator, john, jane)
    }

    #[test]
    fn assign_requires_available_and_unassigned() {
        let open = delivery(1, DeliveryStatus::Available, None, dec!(10));
        let patch = plan_assign(&open, 2, at(9)).unwrap();
        assert_eq!(patch.status, Some(DeliveryStatus::Assigned));
        assert_eq!(patch.assigned_to, Some(Some(2)));
        assert_eq!(patch.started_at, Some(Some(at(9))));
        assert_eq!(patch.expected_status, Some(DeliveryStatus::Available));

        let taken = delivery(1, DeliveryStatus::Assigned, Some(3), dec!(10));
        assert_eq!(
            plan_assign(&taken, 2, at(9)),
            Err(TransitionError::NotAvailable { id: 1 })
        );
    }

    #[test]
    fn cancel_boundary_is_strict() {
        let record = delivery(1, DeliveryStatus::InTransit, Some(2), dec!(10));
        let due = record.estimated_delivery_time;

        assert!(plan_cancel(&record, due - Duration::seconds(1)).is_ok());
        assert_eq!(
            plan_cancel(&record, due),
            Err(TransitionError::CancellationWindowClosed { id: 1 })
        );
        assert!(plan_cancel(&record, due + Duration::hours(1)).is_err());
    }

    #[test]
    fn cancel_releases_assignment() {
        let record = delivery(1, DeliveryStatus::Assigned, Some(2), dec!(10));
        let patch = plan_cancel(&record, at(9)).unwrap();
        assert_eq!(patch.status, Some(DeliveryStatus::Available));
        assert_eq!(patch.assigned_to, Some(None));
        assert_eq!(patch.started_at, Some(None));
        assert_eq!(patch.actual_delivery_time, Some(None));
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let done = delivery(1, DeliveryStatus::Completed, Some(2), dec!(10));
        assert!(plan_start(&done).is_err());
        assert!(plan_complete(&done, Vec::new(), at(9)).is_err());
        assert!(plan_cancel(&done, at(9)).is_err());

        let cancelled = delivery(2, DeliveryStatus::Cancelled, None, dec!(10));
        assert!(plan_assign(&cancelled, 2, at(9)).is_err());
        assert!(plan_reconcile(&cancelled, 1, at(9)).is_err());
    }

    #[test]
    fn start_only_from_assigned() {
        let available = delivery(1, DeliveryStatus::Available, None, dec!(10));
        assert!(matches!(
            plan_start(&available),
            Err(TransitionError::InvalidState { operation: "start", .. })
        ));
    }

    #[tokio::test]
    async fn full_lifecycle_then_double_reconcile() {
        let engine = engine();
        let (moderator, john, _) = users();

        let assigned = engine.assign(4, &john).await.unwrap();
        assert_eq!(assigned.status, DeliveryStatus::Assigned);
        assert_eq!(assigned.assigned_to, Some(john.id));
        assert!(assigned.started_at.is_some());

        let moving = engine.start(4, &john).await.unwrap();
        assert_eq!(moving.status, DeliveryStatus::InTransit);

        let completion = engine
            .complete(4, &john, vec!["evidence/front-door.jpg".to_string()], None)
            .await
            .unwrap();
        assert_eq!(completion.delivery.status, DeliveryStatus::Completed);
        assert_eq!(completion.delivery.evidence_images.len(), 1);
        assert!(!completion.delivery.is_reconciled);

        let first = engine.reconcile(4, &moderator).await.unwrap();
        assert!(first.is_reconciled);
        assert_eq!(first.reconciled_by, Some(moderator.id));

        let second = engine.reconcile(4, &moderator).await.unwrap();
        assert!(second.is_reconciled);
        assert!(second.reconciled_at >= first.reconciled_at);
    }

    #[tokio::test]
    async fn second_claim_is_rejected_without_overwrite() {
        let engine = engine();
        let (_, john, jane) = users();

        engine.assign(5, &john).await.unwrap();
        let err = engine.assign(5, &jane).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let record = engine.gateway().get(5).await.unwrap();
        assert_eq!(record.assigned_to, Some(john.id));
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let engine = engine();
        let (_, john, jane) = users();

        let (a, b) = tokio::join!(engine.assign(6, &john), engine.assign(6, &jane));
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);

        let record = engine.gateway().get(6).await.unwrap();
        assert_eq!(record.status, DeliveryStatus::Assigned);
    }

    #[tokio::test]
    async fn moderators_cannot_claim_and_couriers_cannot_reconcile() {
        let engine = engine();
        let (moderator, john, _) = users();

        assert!(matches!(
            engine.assign(7, &moderator).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            engine.reconcile(1, &john).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn only_the_assignee_may_cancel() {
        let engine = engine();
        let (_, john, jane) = users();

        assert!(matches!(
            engine.cancel(3, &jane).await,
            Err(AppError::Forbidden(_))
        ));

        let released = engine.cancel(3, &john).await.unwrap();
        assert_eq!(released.status, DeliveryStatus::Available);
        assert_eq!(released.assigned_to, None);
        assert_eq!(released.started_at, None);

        let reclaimed = engine.assign(3, &jane).await.unwrap();
        assert_eq!(reclaimed.assigned_to, Some(jane.id));
    }

    #[tokio::test]
    async fn moderator_completes_on_behalf_without_evidence() {
        let engine = engine();
        let (moderator, _, _) = users();
        let actual = Utc::now() - Duration::minutes(5);

        let completion = engine
            .complete(3, &moderator, Vec::new(), Some(actual))
            .await
            .unwrap();
        assert!(completion.time_update_error.is_none());
        assert_eq!(completion.delivery.status, DeliveryStatus::Completed);
        assert!(completion.delivery.evidence_images.is_empty());
        assert_eq!(completion.delivery.actual_delivery_time, Some(actual));
    }

    #[tokio::test]
    async fn reconcile_requires_completion() {
        let engine = engine();
        let (moderator, _, _) = users();
        let err = engine.reconcile(8, &moderator).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn create_stamps_creator_and_fee() {
        let engine = engine();
        let (moderator, john, _) = users();
        let draft = NewDelivery {
            title: "Flowers".to_string(),
            description: "Dozen roses".to_string(),
            zone: "Centro".to_string(),
            pickup_location: "Florist".to_string(),
            delivery_location: "4.609710, -74.081750".to_string(),
            estimated_delivery_time: Utc::now() + Duration::hours(2),
            package_details: PackageDetails {
                weight: "2kg".to_string(),
                dimensions: "30x20x10cm".to_string(),
                fragile: true,
                value: "$50".to_string(),
            },
            created_by: 0,
            delivery_fee: None,
        };

        assert!(matches!(
            engine.create(&john, draft.clone()).await,
            Err(AppError::Forbidden(_))
        ));

        let created = engine.create(&moderator, draft).await.unwrap();
        assert_eq!(created.id, 11);
        assert_eq!(created.created_by, moderator.id);
        assert_eq!(created.delivery_fee, dec!(50));
        assert_eq!(created.status, DeliveryStatus::Available);
    }
}
