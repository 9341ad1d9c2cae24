pub mod fixture;
pub mod gateway;
pub mod query;
pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryPatch, NewDelivery};
use crate::models::user::User;
use crate::models::{DeliveryId, UserId};

pub use fixture::FixtureSource;
pub use gateway::DeliveryGateway;
pub use query::DeliveryQuery;
pub use remote::RemoteSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Remote,
    Fixture,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Remote => "remote",
            SourceKind::Fixture => "fixture",
        }
    }
}

/// Where users and deliveries live. Writes are partial patches; the source
/// merges them into the stored record.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn list_users(&self) -> Result<Vec<User>, AppError>;

    async fn get_user(&self, id: UserId) -> Result<User, AppError> {
        self.list_users()
            .await?
            .into_iter()
            .find(|user| user.id == id)
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
    }

    async fn get_delivery(&self, id: DeliveryId) -> Result<Delivery, AppError>;

    async fn list_deliveries(&self, query: &DeliveryQuery) -> Result<Vec<Delivery>, AppError>;

    async fn create_delivery(&self, draft: NewDelivery) -> Result<Delivery, AppError>;

    async fn patch_delivery(
        &self,
        id: DeliveryId,
        patch: &DeliveryPatch,
    ) -> Result<Delivery, AppError>;

    async fn delete_delivery(&self, id: DeliveryId) -> Result<(), AppError>;
}

/// Probes the configured store once and picks the source for the session:
/// the remote store when it answers, the seeded in-memory dataset otherwise.
pub async fn connect(config: &Config) -> Result<Arc<dyn DataSource>, AppError> {
    let remote = RemoteSource::new(&config.api_url, config.probe_timeout())?;

    match remote.probe().await {
        Ok(()) => {
            info!(api_url = %config.api_url, "backing store is available");
            Ok(Arc::new(remote))
        }
        Err(err) => {
            warn!(
                api_url = %config.api_url,
                error = %err,
                "backing store not available, using fixture data"
            );
            Ok(Arc::new(FixtureSource::seeded()))
        }
    }
}
