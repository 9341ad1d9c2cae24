use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppError;
use crate::models::{DeliveryId, UserId};

/// Largest fee a delivery may carry. Keeps report sums far from the decimal
/// range.
pub const MAX_DELIVERY_FEE: Decimal = dec!(1000000000000);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Available,
    Assigned,
    InTransit,
    Completed,
    Cancelled,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 5] = [
        DeliveryStatus::Available,
        DeliveryStatus::Assigned,
        DeliveryStatus::InTransit,
        DeliveryStatus::Completed,
        DeliveryStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Available => "available",
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Completed => "completed",
            DeliveryStatus::Cancelled => "cancelled",
        }
    }

    /// Assigned or on the road.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, DeliveryStatus::Assigned | DeliveryStatus::InTransit)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "available" => Ok(DeliveryStatus::Available),
            "assigned" => Ok(DeliveryStatus::Assigned),
            "in_transit" => Ok(DeliveryStatus::InTransit),
            "completed" => Ok(DeliveryStatus::Completed),
            "cancelled" => Ok(DeliveryStatus::Cancelled),
            other => Err(AppError::BadRequest(format!(
                "unknown status: {other}, expected available/assigned/in_transit/completed/cancelled"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageDetails {
    pub weight: String,
    pub dimensions: String,
    pub fragile: bool,
    pub value: String,
}

impl PackageDetails {
    /// Reads the free-text declared value (`"$1,250.00"`) as an amount.
    pub fn declared_value(&self) -> Option<Decimal> {
        parse_currency(&self.value)
    }
}

pub fn parse_currency(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    Decimal::from_str(&cleaned)
        .ok()
        .filter(|amount| !amount.is_sign_negative())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: DeliveryId,
    pub title: String,
    pub description: String,
    #[serde(rename = "deliveryZone")]
    pub zone: String,
    pub pickup_location: String,
    pub delivery_location: String,
    pub estimated_delivery_time: DateTime<Utc>,
    #[serde(default)]
    pub actual_delivery_time: Option<DateTime<Utc>>,
    pub package_details: PackageDetails,
    pub status: DeliveryStatus,
    pub created_by: UserId,
    #[serde(default)]
    pub assigned_to: Option<UserId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub evidence_images: Vec<String>,
    #[serde(default)]
    pub is_reconciled: bool,
    #[serde(default)]
    pub reconciled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reconciled_by: Option<UserId>,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub delivery_fee: Decimal,
}

impl Delivery {
    pub fn is_assigned_to(&self, user: UserId) -> bool {
        self.assigned_to == Some(user)
    }

    /// Cross-field rules every stored record must satisfy.
    pub fn check_invariants(&self) -> Result<(), AppError> {
        let holds_assignee = matches!(
            self.status,
            DeliveryStatus::Assigned | DeliveryStatus::InTransit | DeliveryStatus::Completed
        );
        if holds_assignee != self.assigned_to.is_some() {
            return Err(AppError::BadRequest(format!(
                "delivery {} is {} but assignedTo is {:?}",
                self.id, self.status, self.assigned_to
            )));
        }

        if self.reconciled_at.is_some() != self.reconciled_by.is_some() {
            return Err(AppError::BadRequest(format!(
                "delivery {}: reconciledAt and reconciledBy must be set together",
                self.id
            )));
        }

        if self.is_reconciled
            && (self.status != DeliveryStatus::Completed || self.reconciled_by.is_none())
        {
            return Err(AppError::BadRequest(format!(
                "delivery {} is reconciled while {} with reconciledBy {:?}",
                self.id, self.status, self.reconciled_by
            )));
        }

        Ok(())
    }
}

/// What a moderator submits when creating a delivery. The store stamps the
/// lifecycle fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewDelivery {
    pub title: String,
    pub description: String,
    #[serde(rename = "deliveryZone")]
    pub zone: String,
    pub pickup_location: String,
    pub delivery_location: String,
    pub estimated_delivery_time: DateTime<Utc>,
    pub package_details: PackageDetails,
    pub created_by: UserId,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub delivery_fee: Option<Decimal>,
}

impl NewDelivery {
    /// Checks required fields and settles the fee against the declared value.
    pub fn validate(&self) -> Result<Decimal, AppError> {
        let required = [
            ("title", &self.title),
            ("description", &self.description),
            ("deliveryZone", &self.zone),
            ("pickupLocation", &self.pickup_location),
            ("deliveryLocation", &self.delivery_location),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(AppError::BadRequest(format!("{field} cannot be empty")));
        }

        let fee = self.settle_fee()?;
        if fee > MAX_DELIVERY_FEE {
            return Err(AppError::BadRequest(format!(
                "deliveryFee {fee} exceeds the maximum of {MAX_DELIVERY_FEE}"
            )));
        }
        Ok(fee)
    }

    fn settle_fee(&self) -> Result<Decimal, AppError> {
        match (self.package_details.declared_value(), self.delivery_fee) {
            (Some(declared), Some(fee)) if declared != fee => Err(AppError::BadRequest(format!(
                "deliveryFee {fee} does not match package value {}",
                self.package_details.value
            ))),
            (Some(declared), _) => Ok(declared),
            (None, Some(fee)) if fee.is_sign_negative() => {
                Err(AppError::BadRequest("deliveryFee cannot be negative".to_string()))
            }
            (None, Some(fee)) => Ok(fee),
            (None, None) => Err(AppError::BadRequest(format!(
                "package value {:?} is not an amount and no deliveryFee was given",
                self.package_details.value
            ))),
        }
    }

    pub fn into_delivery(self, id: DeliveryId, fee: Decimal, now: DateTime<Utc>) -> Delivery {
        Delivery {
            id,
            title: self.title,
            description: self.description,
            zone: self.zone,
            pickup_location: self.pickup_location,
            delivery_location: self.delivery_location,
            estimated_delivery_time: self.estimated_delivery_time,
            actual_delivery_time: None,
            package_details: self.package_details,
            status: DeliveryStatus::Available,
            created_by: self.created_by,
            assigned_to: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            evidence_images: Vec::new(),
            is_reconciled: false,
            reconciled_at: None,
            reconciled_by: None,
            delivery_fee: fee,
        }
    }
}

/// Partial update. Outer `None` leaves a field alone; `Some(None)` clears a
/// nullable field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeliveryStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub assigned_to: Option<Option<UserId>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub started_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub completed_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub actual_delivery_time: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_reconciled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub reconciled_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub reconciled_by: Option<Option<UserId>>,
    /// Store-side guard: the patch only applies while the record still has
    /// this status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<DeliveryStatus>,
}

impl DeliveryPatch {
    pub fn is_empty(&self) -> bool {
        let guard_only = DeliveryPatch {
            expected_status: self.expected_status,
            ..DeliveryPatch::default()
        };
        *self == guard_only
    }

    pub fn guarded(mut self, expected: DeliveryStatus) -> Self {
        self.expected_status = Some(expected);
        self
    }

    /// Checks the guard, then merges the named fields into `delivery`.
    pub fn apply(&self, delivery: &mut Delivery) -> Result<(), AppError> {
        if let Some(expected) = self.expected_status {
            if delivery.status != expected {
                return Err(AppError::Conflict(format!(
                    "delivery {} is {}, expected {}",
                    delivery.id, delivery.status, expected
                )));
            }
        }

        if let Some(status) = self.status {
            delivery.status = status;
        }
        if let Some(assigned_to) = self.assigned_to {
            delivery.assigned_to = assigned_to;
        }
        if let Some(started_at) = self.started_at {
            delivery.started_at = started_at;
        }
        if let Some(completed_at) = self.completed_at {
            delivery.completed_at = completed_at;
        }
        if let Some(actual) = self.actual_delivery_time {
            delivery.actual_delivery_time = actual;
        }
        if let Some(images) = &self.evidence_images {
            delivery.evidence_images = images.clone();
        }
        if let Some(is_reconciled) = self.is_reconciled {
            delivery.is_reconciled = is_reconciled;
        }
        if let Some(reconciled_at) = self.reconciled_at {
            delivery.reconciled_at = reconciled_at;
        }
        if let Some(reconciled_by) = self.reconciled_by {
            delivery.reconciled_by = reconciled_by;
        }

        Ok(())
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
