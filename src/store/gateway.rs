use std::sync::Arc;

use crate::engine::reports;
use crate::error::AppError;
use crate::models::conciliation::{
    ConciliationFilter, ConciliationSummary, DeliveryConciliation, PlatformSummary,
};
use crate::models::delivery::{Delivery, DeliveryPatch, DeliveryStatus, NewDelivery};
use crate::models::user::User;
use crate::models::{DeliveryId, UserId};
use crate::store::query::DeliveryQuery;
use crate::store::{DataSource, SourceKind};

const PERSONAL_STATUSES: [DeliveryStatus; 3] = [
    DeliveryStatus::Assigned,
    DeliveryStatus::InTransit,
    DeliveryStatus::Completed,
];

/// The queries the dashboard needs, expressed over any [`DataSource`].
#[derive(Clone)]
pub struct DeliveryGateway {
    source: Arc<dyn DataSource>,
}

impl DeliveryGateway {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }

    pub async fn users(&self) -> Result<Vec<User>, AppError> {
        self.source.list_users().await
    }

    pub async fn user(&self, id: UserId) -> Result<User, AppError> {
        self.source.get_user(id).await
    }

    pub async fn get(&self, id: DeliveryId) -> Result<Delivery, AppError> {
        self.source.get_delivery(id).await
    }

    pub async fn all(&self) -> Result<Vec<Delivery>, AppError> {
        self.source.list_deliveries(&DeliveryQuery::all()).await
    }

    pub async fn find(&self, query: &DeliveryQuery) -> Result<Vec<Delivery>, AppError> {
        self.source.list_deliveries(query).await
    }

    pub async fn create(&self, draft: NewDelivery) -> Result<Delivery, AppError> {
        self.source.create_delivery(draft).await
    }

    pub async fn patch(&self, id: DeliveryId, patch: &DeliveryPatch) -> Result<Delivery, AppError> {
        self.source.patch_delivery(id, patch).await
    }

    pub async fn delete(&self, id: DeliveryId) -> Result<(), AppError> {
        self.source.delete_delivery(id).await
    }

    pub async fn available(&self) -> Result<Vec<Delivery>, AppError> {
        self.find(&DeliveryQuery::with_status(DeliveryStatus::Available))
            .await
    }

    /// A delivery person's own work: assigned, on the road, or done.
    pub async fn assigned_to(&self, person: UserId) -> Result<Vec<Delivery>, AppError> {
        self.find(
            &DeliveryQuery::all()
                .statuses(&PERSONAL_STATUSES)
                .assigned_to(person),
        )
        .await
    }

    pub async fn created_by(&self, moderator: UserId) -> Result<Vec<Delivery>, AppError> {
        self.find(&DeliveryQuery::all().created_by(moderator)).await
    }

    pub async fn completed_by_person(&self, person: UserId) -> Result<Vec<Delivery>, AppError> {
        self.find(&DeliveryQuery::with_status(DeliveryStatus::Completed).assigned_to(person))
            .await
    }

    pub async fn unreconciled(&self, person: Option<UserId>) -> Result<Vec<Delivery>, AppError> {
        let mut query = DeliveryQuery::with_status(DeliveryStatus::Completed).reconciled(false);
        query.assigned_to = person;
        self.find(&query).await
    }

    pub async fn conciliations(
        &self,
        filter: &ConciliationFilter,
    ) -> Result<Vec<DeliveryConciliation>, AppError> {
        let mut query = DeliveryQuery::with_status(DeliveryStatus::Completed);
        query.assigned_to = filter.delivery_person_id;
        query.is_reconciled = filter.is_reconciled;

        let deliveries = self.find(&query).await?;
        let users = self.users().await?;
        Ok(reports::conciliation_rows(&deliveries, &users, filter))
    }

    pub async fn person_summary(&self, person: UserId) -> Result<ConciliationSummary, AppError> {
        let completed = self.completed_by_person(person).await?;
        Ok(reports::person_summary(&completed))
    }

    pub async fn platform_summary(
        &self,
        filter: &ConciliationFilter,
    ) -> Result<PlatformSummary, AppError> {
        let rows = self.conciliations(filter).await?;
        Ok(reports::platform_summary(&rows))
    }
}
