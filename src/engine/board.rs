use std::collections::BTreeMap;
use std::future::Future;

use chrono::Utc;
use tracing::debug;

use crate::engine::lifecycle::{self, LifecycleEngine};
use crate::error::AppError;
use crate::models::DeliveryId;
use crate::models::delivery::{Delivery, DeliveryPatch};
use crate::models::user::User;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    Confirmed,
    /// Local prediction not yet acknowledged by the store; `previous` is what
    /// a rejection restores.
    Pending { previous: Box<Delivery> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tracked {
    pub delivery: Delivery,
    pub sync: SyncState,
}

impl Tracked {
    pub fn is_pending(&self) -> bool {
        matches!(self.sync, SyncState::Pending { .. })
    }
}

/// Client-side cache of the deliveries on screen, with optimistic writes.
#[derive(Debug, Default)]
pub struct DeliveryBoard {
    entries: BTreeMap<DeliveryId, Tracked>,
}

impl DeliveryBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the cache with a fresh listing. Everything becomes confirmed.
    pub fn refresh(&mut self, deliveries: Vec<Delivery>) {
        self.entries = deliveries
            .into_iter()
            .map(|delivery| {
                (
                    delivery.id,
                    Tracked {
                        delivery,
                        sync: SyncState::Confirmed,
                    },
                )
            })
            .collect();
    }

    pub fn get(&self, id: DeliveryId) -> Option<&Tracked> {
        self.entries.get(&id)
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.entries.values().map(|t| t.delivery.clone()).collect()
    }

    pub fn pending(&self) -> Vec<DeliveryId> {
        self.entries
            .iter()
            .filter(|(_, tracked)| tracked.is_pending())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Applies `patch` locally. The status guard is ignored here; the store
    /// checks it when the write lands.
    pub fn predict(&mut self, id: DeliveryId, patch: &DeliveryPatch) -> Result<(), AppError> {
        let tracked = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {id} is not on the board")))?;

        let previous = match &tracked.sync {
            SyncState::Pending { previous } => previous.clone(),
            SyncState::Confirmed => Box::new(tracked.delivery.clone()),
        };

        let local = DeliveryPatch {
            expected_status: None,
            ..patch.clone()
        };
        local.apply(&mut tracked.delivery)?;
        tracked.sync = SyncState::Pending { previous };
        Ok(())
    }

    pub fn confirm(&mut self, delivery: Delivery) {
        self.entries.insert(
            delivery.id,
            Tracked {
                delivery,
                sync: SyncState::Confirmed,
            },
        );
    }

    /// Restores the record as it was before the first unconfirmed prediction.
    pub fn revert(&mut self, id: DeliveryId) -> Option<&Delivery> {
        let tracked = self.entries.get_mut(&id)?;
        if let SyncState::Pending { previous } =
            std::mem::replace(&mut tracked.sync, SyncState::Confirmed)
        {
            tracked.delivery = *previous;
            debug!(delivery_id = id, "optimistic update reverted");
        }
        Some(&tracked.delivery)
    }

    /// Predicts `patch`, awaits the real write, then confirms or reverts.
    pub async fn run<F>(
        &mut self,
        id: DeliveryId,
        patch: &DeliveryPatch,
        write: F,
    ) -> Result<Delivery, AppError>
    where
        F: Future<Output = Result<Delivery, AppError>>,
    {
        self.predict(id, patch)?;
        match write.await {
            Ok(delivery) => {
                self.confirm(delivery.clone());
                Ok(delivery)
            }
            Err(err) => {
                self.revert(id);
                Err(err)
            }
        }
    }

    /// Claims a delivery for `person`, showing it as assigned right away.
    pub async fn claim(
        &mut self,
        engine: &LifecycleEngine,
        id: DeliveryId,
        person: &User,
    ) -> Result<Delivery, AppError> {
        let cached = self
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {id} is not on the board")))?;
        let patch = lifecycle::plan_assign(&cached.delivery, person.id, Utc::now())?;

        self.run(id, &patch, engine.assign(id, person)).await
    }
}
