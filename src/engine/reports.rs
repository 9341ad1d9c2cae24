//! Counts and money figures derived from already-fetched deliveries. Every
//! function here is total: empty input gives zero counts and zero sums, and
//! money sums saturate at the decimal range instead of overflowing.

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::models::conciliation::{
    ConciliationFilter, ConciliationSummary, DeliveryConciliation, PlatformSummary,
};
use crate::models::delivery::{Delivery, DeliveryStatus};
use crate::models::user::{Role, User};
use crate::models::UserId;

pub const PLATFORM_RATE: Decimal = dec!(0.10);
pub const PERSON_RATE: Decimal = dec!(0.90);

const UNKNOWN_PERSON: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionSplit {
    pub delivery_fee: Decimal,
    pub delivery_person_earnings: Decimal,
    pub platform_commission: Decimal,
}

pub fn commission_split(fee: Decimal) -> CommissionSplit {
    CommissionSplit {
        delivery_fee: fee,
        delivery_person_earnings: fee.saturating_mul(PERSON_RATE),
        platform_commission: fee.saturating_mul(PLATFORM_RATE),
    }
}

fn total(amounts: impl Iterator<Item = Decimal>) -> Decimal {
    amounts.fold(Decimal::ZERO, Decimal::saturating_add)
}

/// Two-decimal rendering for currency display. Stored figures keep full
/// precision.
pub fn display_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("${rounded:.2}")
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCounts {
    pub available: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub reconciled: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to_me: Option<usize>,
}

pub fn dashboard_counts(deliveries: &[Delivery], viewer: Option<&User>) -> DashboardCounts {
    let assigned_to_me = viewer
        .filter(|user| user.role == Role::Delivery)
        .map(|user| {
            count(deliveries, |d| {
                d.status.is_in_progress() && d.is_assigned_to(user.id)
            })
        });

    DashboardCounts {
        available: count(deliveries, |d| {
            d.status == DeliveryStatus::Available && d.assigned_to.is_none()
        }),
        in_progress: count(deliveries, |d| d.status.is_in_progress()),
        completed: count(deliveries, |d| d.status == DeliveryStatus::Completed),
        reconciled: count(deliveries, |d| {
            d.status == DeliveryStatus::Completed && d.is_reconciled
        }),
        total: deliveries.len(),
        assigned_to_me,
    }
}

fn count(deliveries: &[Delivery], predicate: impl Fn(&Delivery) -> bool) -> usize {
    deliveries.iter().filter(|d| predicate(d)).count()
}

/// Summary over one person's deliveries. Records that are not completed are
/// ignored, so callers may pass a mixed list.
pub fn person_summary(deliveries: &[Delivery]) -> ConciliationSummary {
    let completed: Vec<&Delivery> = deliveries
        .iter()
        .filter(|d| d.status == DeliveryStatus::Completed)
        .collect();

    let total_earnings = total(completed.iter().map(|d| d.delivery_fee));
    let platform_commission = total_earnings.saturating_mul(PLATFORM_RATE);

    let pending: Vec<&&Delivery> = completed.iter().filter(|d| !d.is_reconciled).collect();

    ConciliationSummary {
        total_deliveries: completed.len(),
        total_earnings,
        platform_commission,
        amount_to_pay: platform_commission,
        pending_deliveries: pending.len(),
        pending_value: total(pending.iter().map(|d| d.delivery_fee)),
    }
}

pub fn platform_summary(rows: &[DeliveryConciliation]) -> PlatformSummary {
    let (reconciled, pending): (Vec<&DeliveryConciliation>, Vec<&DeliveryConciliation>) =
        rows.iter().partition(|row| row.is_reconciled);

    PlatformSummary {
        total_deliveries: rows.len(),
        total_commissions: total(rows.iter().map(|row| row.platform_commission)),
        reconciled_deliveries: reconciled.len(),
        pending_deliveries: pending.len(),
        pending_commissions: total(pending.iter().map(|row| row.platform_commission)),
    }
}

pub fn conciliation_row(delivery: &Delivery, names: &HashMap<UserId, &str>) -> DeliveryConciliation {
    let split = commission_split(delivery.delivery_fee);
    let name_of = |id: UserId| names.get(&id).map(|name| name.to_string());

    DeliveryConciliation {
        delivery_id: delivery.id,
        delivery_person_id: delivery.assigned_to,
        delivery_person_name: delivery
            .assigned_to
            .and_then(name_of)
            .unwrap_or_else(|| UNKNOWN_PERSON.to_string()),
        delivery_title: delivery.title.clone(),
        delivery_fee: split.delivery_fee,
        platform_commission: split.platform_commission,
        delivery_person_earnings: split.delivery_person_earnings,
        completed_at: delivery.completed_at,
        is_reconciled: delivery.is_reconciled,
        reconciled_at: delivery.reconciled_at,
        reconciled_by: delivery.reconciled_by,
        reconciled_by_name: delivery.reconciled_by.and_then(name_of),
    }
}

/// Completed deliveries matching `filter`, joined with user names.
pub fn conciliation_rows(
    deliveries: &[Delivery],
    users: &[User],
    filter: &ConciliationFilter,
) -> Vec<DeliveryConciliation> {
    let names: HashMap<UserId, &str> = users
        .iter()
        .map(|user| (user.id, user.name.as_str()))
        .collect();

    deliveries
        .iter()
        .filter(|d| d.status == DeliveryStatus::Completed && filter.matches(d))
        .map(|d| conciliation_row(d, &names))
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::delivery::fixtures::delivery;
    use crate::store::fixture::demo_users;

    fn completed(id: u64, person: u64, fee: Decimal, reconciled: bool) -> Delivery {
        let mut record = delivery(id, DeliveryStatus::Completed, Some(person), fee);
        record.is_reconciled = reconciled;
        if reconciled {
            record.reconciled_by = Some(1);
        }
        record
    }

    #[test]
    fn person_summary_matches_worked_example() {
        let deliveries = vec![
            completed(1, 2, dec!(25.99), true),
            completed(2, 2, dec!(899.00), false),
            completed(3, 2, dec!(45.50), false),
        ];

        let summary = person_summary(&deliveries);
        assert_eq!(summary.total_deliveries, 3);
        assert_eq!(summary.total_earnings, dec!(970.49));
        assert_eq!(summary.platform_commission, dec!(97.049));
        assert_eq!(summary.amount_to_pay, dec!(97.049));
        assert_eq!(summary.pending_deliveries, 2);
        assert_eq!(summary.pending_value, dec!(944.50));
    }

    #[test]
    fn empty_inputs_give_zeroes() {
        let summary = person_summary(&[]);
        assert_eq!(summary.total_deliveries, 0);
        assert_eq!(summary.total_earnings, Decimal::ZERO);

        let platform = platform_summary(&[]);
        assert_eq!(platform.total_commissions, Decimal::ZERO);
        assert_eq!(platform.pending_deliveries, 0);

        assert_eq!(dashboard_counts(&[], None), DashboardCounts::default());
    }

    #[test]
    fn summaries_saturate_instead_of_overflowing() {
        let deliveries = vec![
            completed(1, 2, Decimal::MAX, false),
            completed(2, 2, Decimal::MAX, true),
        ];

        let summary = person_summary(&deliveries);
        assert_eq!(summary.total_deliveries, 2);
        assert_eq!(summary.total_earnings, Decimal::MAX);
        assert_eq!(summary.pending_value, Decimal::MAX);
        assert!(summary.platform_commission < Decimal::MAX);

        let rows = conciliation_rows(&deliveries, &demo_users(), &ConciliationFilter::default());
        let platform = platform_summary(&rows);
        assert_eq!(platform.total_deliveries, 2);
        assert!(platform.total_commissions > platform.pending_commissions);
    }

    #[test]
    fn unfinished_records_do_not_count_towards_earnings() {
        let deliveries = vec![
            completed(1, 2, dec!(10), false),
            delivery(2, DeliveryStatus::InTransit, Some(2), dec!(500)),
        ];
        assert_eq!(person_summary(&deliveries).total_earnings, dec!(10));
    }

    #[test]
    fn split_sums_are_exact_over_many_rows() {
        let fees: Vec<Decimal> = (1..=500).map(|i| Decimal::new(i * 7 + 3, 2)).collect();
        let deliveries: Vec<Delivery> = fees
            .iter()
            .zip(1..)
            .map(|(fee, id)| completed(id, 2, *fee, id % 2 == 0))
            .collect();

        let rows = conciliation_rows(&deliveries, &demo_users(), &ConciliationFilter::default());
        let total: Decimal = fees.iter().sum();

        let commissions: Decimal = rows.iter().map(|r| r.platform_commission).sum();
        let earnings: Decimal = rows.iter().map(|r| r.delivery_person_earnings).sum();
        assert_eq!(commissions, total * dec!(0.10));
        assert_eq!(earnings, total * dec!(0.90));
        assert_eq!(commissions + earnings, total);
    }

    #[test]
    fn platform_summary_partitions_by_reconciliation() {
        let deliveries = vec![
            completed(1, 2, dec!(100), true),
            completed(2, 3, dec!(50), false),
            completed(3, 3, dec!(20), false),
        ];
        let rows = conciliation_rows(&deliveries, &demo_users(), &ConciliationFilter::default());

        let summary = platform_summary(&rows);
        assert_eq!(summary.total_deliveries, 3);
        assert_eq!(summary.total_commissions, dec!(17));
        assert_eq!(summary.reconciled_deliveries, 1);
        assert_eq!(summary.pending_deliveries, 2);
        assert_eq!(summary.pending_commissions, dec!(7));
    }

    #[test]
    fn rows_fall_back_to_unknown_names() {
        let deliveries = vec![completed(1, 77, dec!(10), false)];
        let rows = conciliation_rows(&deliveries, &demo_users(), &ConciliationFilter::default());
        assert_eq!(rows[0].delivery_person_name, "Unknown");
        assert_eq!(rows[0].reconciled_by_name, None);
    }

    #[test]
    fn dashboard_counts_by_status_and_viewer() {
        let users = demo_users();
        let deliveries = vec![
            delivery(1, DeliveryStatus::Available, None, dec!(10)),
            delivery(2, DeliveryStatus::Assigned, Some(2), dec!(10)),
            delivery(3, DeliveryStatus::InTransit, Some(3), dec!(10)),
            completed(4, 2, dec!(10), true),
            completed(5, 2, dec!(10), false),
        ];

        let courier_view = dashboard_counts(&deliveries, Some(&users[1]));
        assert_eq!(courier_view.available, 1);
        assert_eq!(courier_view.in_progress, 2);
        assert_eq!(courier_view.completed, 2);
        assert_eq!(courier_view.reconciled, 1);
        assert_eq!(courier_view.total, 5);
        assert_eq!(courier_view.assigned_to_me, Some(1));

        let moderator_view = dashboard_counts(&deliveries, Some(&users[0]));
        assert_eq!(moderator_view.assigned_to_me, None);
    }

    #[test]
    fn display_rounds_to_cents() {
        assert_eq!(display_amount(dec!(97.049)), "$97.05");
        assert_eq!(display_amount(dec!(0)), "$0.00");
        assert_eq!(display_amount(dec!(1250)), "$1250.00");
    }
}
