use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::delivery::Delivery;
use crate::models::{DeliveryId, UserId};

/// What one delivery person owes the platform over their completed deliveries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConciliationSummary {
    pub total_deliveries: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_earnings: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub platform_commission: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount_to_pay: Decimal,
    pub pending_deliveries: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub pending_value: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSummary {
    pub total_deliveries: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_commissions: Decimal,
    pub reconciled_deliveries: usize,
    pub pending_deliveries: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub pending_commissions: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryConciliation {
    pub delivery_id: DeliveryId,
    pub delivery_person_id: Option<UserId>,
    pub delivery_person_name: String,
    pub delivery_title: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub delivery_fee: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub platform_commission: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub delivery_person_earnings: Decimal,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_reconciled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciled_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciled_by_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConciliationFilter {
    #[serde(default)]
    pub delivery_person_id: Option<UserId>,
    #[serde(default)]
    pub is_reconciled: Option<bool>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl ConciliationFilter {
    /// Date bounds are inclusive and apply to `completedAt`; a record with no
    /// completion time never passes a date bound.
    pub fn matches(&self, delivery: &Delivery) -> bool {
        if let Some(person) = self.delivery_person_id {
            if delivery.assigned_to != Some(person) {
                return false;
            }
        }
        if let Some(reconciled) = self.is_reconciled {
            if delivery.is_reconciled != reconciled {
                return false;
            }
        }
        if self.start_date.is_none() && self.end_date.is_none() {
            return true;
        }

        match delivery.completed_at {
            Some(completed) => {
                self.start_date.is_none_or(|start| completed >= start)
                    && self.end_date.is_none_or(|end| completed <= end)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::ConciliationFilter;
    use crate::models::delivery::DeliveryStatus;
    use crate::models::delivery::fixtures::{at, delivery};

    #[test]
    fn empty_filter_matches_everything() {
        let record = delivery(1, DeliveryStatus::Completed, Some(2), dec!(10));
        assert!(ConciliationFilter::default().matches(&record));
    }

    #[test]
    fn date_range_is_inclusive_on_completion_time() {
        let mut record = delivery(1, DeliveryStatus::Completed, Some(2), dec!(10));
        record.completed_at = Some(at(12));

        let filter = ConciliationFilter {
            start_date: Some(at(12)),
            end_date: Some(at(12)),
            ..ConciliationFilter::default()
        };
        assert!(filter.matches(&record));

        let later = ConciliationFilter {
            start_date: Some(at(13)),
            ..ConciliationFilter::default()
        };
        assert!(!later.matches(&record));

        record.completed_at = None;
        assert!(!filter.matches(&record));
    }

    #[test]
    fn person_and_reconciled_flags_filter() {
        let mut record = delivery(1, DeliveryStatus::Completed, Some(2), dec!(10));
        record.is_reconciled = true;

        let other_person = ConciliationFilter {
            delivery_person_id: Some(3),
            ..ConciliationFilter::default()
        };
        assert!(!other_person.matches(&record));

        let pending_only = ConciliationFilter {
            is_reconciled: Some(false),
            ..ConciliationFilter::default()
        };
        assert!(!pending_only.matches(&record));
    }
}
