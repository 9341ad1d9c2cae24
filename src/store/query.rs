use serde::Deserialize;

use crate::error::AppError;
use crate::models::UserId;
use crate::models::delivery::{Delivery, DeliveryStatus};

/// Filter understood by the `/deliveries` collection. An empty status set
/// means any status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryQuery {
    pub statuses: Vec<DeliveryStatus>,
    pub assigned_to: Option<UserId>,
    pub created_by: Option<UserId>,
    pub is_reconciled: Option<bool>,
}

impl DeliveryQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: DeliveryStatus) -> Self {
        Self {
            statuses: vec![status],
            ..Self::default()
        }
    }

    pub fn statuses(mut self, statuses: &[DeliveryStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn assigned_to(mut self, user: UserId) -> Self {
        self.assigned_to = Some(user);
        self
    }

    pub fn created_by(mut self, user: UserId) -> Self {
        self.created_by = Some(user);
        self
    }

    pub fn reconciled(mut self, reconciled: bool) -> Self {
        self.is_reconciled = Some(reconciled);
        self
    }

    pub fn matches(&self, delivery: &Delivery) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&delivery.status))
            && self
                .assigned_to
                .is_none_or(|user| delivery.assigned_to == Some(user))
            && self.created_by.is_none_or(|user| delivery.created_by == user)
            && self
                .is_reconciled
                .is_none_or(|flag| delivery.is_reconciled == flag)
    }

    /// Query-string pairs in the order the store documents them.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if !self.statuses.is_empty() {
            let joined = self
                .statuses
                .iter()
                .map(DeliveryStatus::as_str)
                .collect::<Vec<_>>()
                .join(",");
            params.push(("status", joined));
        }
        if let Some(user) = self.assigned_to {
            params.push(("assignedTo", user.to_string()));
        }
        if let Some(user) = self.created_by {
            params.push(("createdBy", user.to_string()));
        }
        if let Some(flag) = self.is_reconciled {
            params.push(("isReconciled", flag.to_string()));
        }
        params
    }
}

/// Raw query parameters as they arrive on `GET /deliveries`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryQueryParams {
    pub status: Option<String>,
    pub assigned_to: Option<UserId>,
    pub created_by: Option<UserId>,
    pub is_reconciled: Option<bool>,
}

impl TryFrom<DeliveryQueryParams> for DeliveryQuery {
    type Error = AppError;

    fn try_from(params: DeliveryQueryParams) -> Result<Self, Self::Error> {
        let statuses = match params.status.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw
                .split(',')
                .map(str::parse::<DeliveryStatus>)
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };

        Ok(Self {
            statuses,
            assigned_to: params.assigned_to,
            created_by: params.created_by,
            is_reconciled: params.is_reconciled,
        })
    }
}
