use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::error::AppError;
use crate::models::DeliveryId;
use crate::models::delivery::{
    Delivery, DeliveryPatch, DeliveryStatus, NewDelivery, PackageDetails,
};
use crate::models::user::{Role, User};
use crate::store::query::DeliveryQuery;
use crate::store::{DataSource, SourceKind};

/// In-memory users and deliveries. Nothing survives a restart.
pub struct FixtureSource {
    users: Vec<User>,
    deliveries: DashMap<DeliveryId, Delivery>,
    next_id: AtomicU64,
}

impl FixtureSource {
    pub fn new(users: Vec<User>, deliveries: Vec<Delivery>) -> Self {
        let next_id = deliveries.iter().map(|d| d.id).max().unwrap_or(0) + 1;
        Self {
            users,
            deliveries: deliveries.into_iter().map(|d| (d.id, d)).collect(),
            next_id: AtomicU64::new(next_id),
        }
    }

    pub fn empty() -> Self {
        Self::new(demo_users(), Vec::new())
    }

    pub fn seeded() -> Self {
        Self::new(demo_users(), demo_deliveries(Utc::now()))
    }

    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }
}

#[async_trait]
impl DataSource for FixtureSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Fixture
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self.users.clone())
    }

    async fn get_delivery(&self, id: DeliveryId) -> Result<Delivery, AppError> {
        self.deliveries
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))
    }

    async fn list_deliveries(&self, query: &DeliveryQuery) -> Result<Vec<Delivery>, AppError> {
        let mut deliveries: Vec<Delivery> = self
            .deliveries
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        deliveries.sort_by_key(|d| d.id);
        Ok(deliveries)
    }

    async fn create_delivery(&self, draft: NewDelivery) -> Result<Delivery, AppError> {
        let fee = draft.validate()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let delivery = draft.into_delivery(id, fee, Utc::now());

        self.deliveries.insert(id, delivery.clone());
        debug!(delivery_id = id, "delivery stored");
        Ok(delivery)
    }

    async fn patch_delivery(
        &self,
        id: DeliveryId,
        patch: &DeliveryPatch,
    ) -> Result<Delivery, AppError> {
        let mut entry = self
            .deliveries
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))?;

        // Guard check, merge and invariant check all happen under the entry
        // lock. A rejected patch leaves the stored record untouched.
        let mut updated = entry.value().clone();
        patch.apply(&mut updated)?;
        updated.check_invariants()?;

        *entry.value_mut() = updated.clone();
        Ok(updated)
    }

    async fn delete_delivery(&self, id: DeliveryId) -> Result<(), AppError> {
        self.deliveries
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))
    }
}

pub fn demo_users() -> Vec<User> {
    let user = |id, username: &str, password: &str, role, name: &str| User {
        id,
        username: username.to_string(),
        password: password.to_string(),
        role,
        name: name.to_string(),
    };

    vec![
        user(1, "moderator1", "mod123", Role::Moderator, "Admin User"),
        user(2, "delivery1", "del123", Role::Delivery, "John Delivery"),
        user(3, "delivery2", "del456", Role::Delivery, "Jane Courier"),
    ]
}

struct Seed<'a> {
    title: &'a str,
    description: &'a str,
    zone: &'a str,
    pickup: &'a str,
    destination: &'a str,
    package: (&'a str, &'a str, bool),
    fee: Decimal,
    created_hours_ago: i64,
    due_in_hours: i64,
}

impl Seed<'_> {
    fn open(&self, id: DeliveryId, now: DateTime<Utc>) -> Delivery {
        let (weight, dimensions, fragile) = self.package;
        Delivery {
            id,
            title: self.title.to_string(),
            description: self.description.to_string(),
            zone: self.zone.to_string(),
            pickup_location: self.pickup.to_string(),
            delivery_location: self.destination.to_string(),
            estimated_delivery_time: now + Duration::hours(self.due_in_hours),
            actual_delivery_time: None,
            package_details: PackageDetails {
                weight: weight.to_string(),
                dimensions: dimensions.to_string(),
                fragile,
                value: format!("${:.2}", self.fee),
            },
            status: DeliveryStatus::Available,
            created_by: 1,
            assigned_to: None,
            created_at: now - Duration::hours(self.created_hours_ago),
            started_at: None,
            completed_at: None,
            evidence_images: Vec::new(),
            is_reconciled: false,
            reconciled_at: None,
            reconciled_by: None,
            delivery_fee: self.fee,
        }
    }
}

/// Demo dataset with timestamps relative to `now`, so open deliveries stay
/// cancellable for a while after startup.
pub fn demo_deliveries(now: DateTime<Utc>) -> Vec<Delivery> {
    let seeds = [
        Seed {
            title: "Family pizza and drinks",
            description: "Large pepperoni pizza with four sodas",
            zone: "Centro",
            pickup: "Pizza Palace, Central Ave 456",
            destination: "Plaza Residential Tower, Apt 15B",
            package: ("2.1kg", "35x35x8cm", false),
            fee: dec!(25.99),
            created_hours_ago: 30,
            due_in_hours: -28,
        },
        Seed {
            title: "Smartphone with earphones",
            description: "New phone, boxed, earphones included",
            zone: "Norte",
            pickup: "TechStore, North Mall",
            destination: "Los Pinos Residences, House 23",
            package: ("0.8kg", "18x10x6cm", true),
            fee: dec!(899.00),
            created_hours_ago: 26,
            due_in_hours: -24,
        },
        Seed {
            title: "Urgent medication",
            description: "Antibiotics for an ongoing treatment",
            zone: "Sur",
            pickup: "24h Pharmacy, South Ave 789",
            destination: "Central Clinic, Office 5",
            package: ("0.3kg", "15x10x5cm", true),
            fee: dec!(45.50),
            created_hours_ago: 3,
            due_in_hours: 2,
        },
        Seed {
            title: "Engineering textbooks",
            description: "Advanced calculus and quantum physics",
            zone: "Oeste",
            pickup: "Campus Technical Bookshop",
            destination: "Student Residences Tower 3, Room 412",
            package: ("4.2kg", "30x25x15cm", false),
            fee: dec!(180.00),
            created_hours_ago: 5,
            due_in_hours: 20,
        },
        Seed {
            title: "Running shoes",
            description: "Trainers, size 42",
            zone: "Este",
            pickup: "Sports Center, East Mall",
            destination: "Jardines del Sol, House 18",
            package: ("1.5kg", "32x20x12cm", false),
            fee: dec!(120.00),
            created_hours_ago: 2,
            due_in_hours: 6,
        },
        Seed {
            title: "Weekly groceries",
            description: "Fruit, vegetables, dairy and cleaning products",
            zone: "Centro",
            pickup: "Central Supermarket, Main Square",
            destination: "Corporate Tower A, Office 1205",
            package: ("8.5kg", "45x35x25cm", false),
            fee: dec!(95.75),
            created_hours_ago: 4,
            due_in_hours: 3,
        },
        Seed {
            title: "Notarised documents",
            description: "Contracts awaiting signature",
            zone: "Norte",
            pickup: "Central Notary, North Building",
            destination: "Associated Law Office, Floor 8",
            package: ("0.4kg", "25x18x3cm", false),
            fee: dec!(15.00),
            created_hours_ago: 1,
            due_in_hours: 4,
        },
        Seed {
            title: "Birthday cake",
            description: "Chocolate cake with themed decoration",
            zone: "Sur",
            pickup: "Sweet Dreams Bakery, South Ave 321",
            destination: "Los Alamos, Main Street 45",
            package: ("2.8kg", "28x28x12cm", true),
            fee: dec!(65.00),
            created_hours_ago: 2,
            due_in_hours: 5,
        },
        Seed {
            title: "Gaming laptop",
            description: "Laptop with mouse and backpack",
            zone: "Oeste",
            pickup: "GameTech Store, West Mall",
            destination: "University Residences, Block C-205",
            package: ("3.2kg", "40x30x8cm", true),
            fee: dec!(1250.00),
            created_hours_ago: 6,
            due_in_hours: 24,
        },
        Seed {
            title: "Personal care products",
            description: "Creams and hygiene products",
            zone: "Este",
            pickup: "Beauty & Care Pharmacy, East Plaza",
            destination: "Vista Hermosa, Tower 2, Apt 8A",
            package: ("1.8kg", "25x15x10cm", false),
            fee: dec!(78.90),
            created_hours_ago: 2,
            due_in_hours: 4,
        },
    ];

    let mut deliveries: Vec<Delivery> = seeds
        .iter()
        .zip(1..)
        .map(|(seed, id)| seed.open(id, now))
        .collect();

    for (index, completed_hours_ago) in [(0, 27), (1, 23)] {
        let delivery = &mut deliveries[index];
        let completed_at = now - Duration::hours(completed_hours_ago);
        delivery.status = DeliveryStatus::Completed;
        delivery.assigned_to = Some(2);
        delivery.started_at = Some(completed_at - Duration::minutes(40));
        delivery.completed_at = Some(completed_at);
        delivery.actual_delivery_time = Some(completed_at);
        delivery.evidence_images = vec![format!("evidence/delivery-{}.jpg", delivery.id)];
        delivery.is_reconciled = true;
        delivery.reconciled_at = Some(completed_at + Duration::hours(2));
        delivery.reconciled_by = Some(1);
    }

    let medication = &mut deliveries[2];
    medication.status = DeliveryStatus::Assigned;
    medication.assigned_to = Some(2);
    medication.started_at = Some(now - Duration::hours(1));

    deliveries
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::FixtureSource;
    use crate::error::AppError;
    use crate::models::delivery::{DeliveryPatch, DeliveryStatus};
    use crate::store::DataSource;
    use crate::store::query::DeliveryQuery;

    #[tokio::test]
    async fn seeded_dataset_has_demo_shape() {
        let source = FixtureSource::seeded();
        assert_eq!(source.len(), 10);

        let available = source
            .list_deliveries(&DeliveryQuery::with_status(DeliveryStatus::Available))
            .await
            .unwrap();
        assert_eq!(available.len(), 7);
        assert!(available.iter().all(|d| d.assigned_to.is_none()));

        let laptop = source.get_delivery(9).await.unwrap();
        assert_eq!(laptop.delivery_fee, dec!(1250));
        assert_eq!(laptop.package_details.value, "$1250.00");
    }

    #[tokio::test]
    async fn available_on_empty_store_is_empty_not_error() {
        let source = FixtureSource::empty();
        let available = source
            .list_deliveries(&DeliveryQuery::with_status(DeliveryStatus::Available))
            .await
            .unwrap();
        assert!(available.is_empty());
    }

    #[tokio::test]
    async fn patch_on_missing_record_is_not_found() {
        let source = FixtureSource::empty();
        let err = source
            .patch_delivery(42, &DeliveryPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn inconsistent_patch_is_rejected_and_not_stored() {
        let source = FixtureSource::seeded();
        let before = source.get_delivery(4).await.unwrap();

        let patch = DeliveryPatch {
            is_reconciled: Some(true),
            assigned_to: Some(Some(2)),
            ..DeliveryPatch::default()
        };
        let err = source.patch_delivery(4, &patch).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(source.get_delivery(4).await.unwrap(), before);

        let same_reconciler = DeliveryPatch {
            reconciled_by: Some(Some(1)),
            ..DeliveryPatch::default()
        };
        assert!(source.patch_delivery(1, &same_reconciler).await.is_ok());
        let orphan_timestamp = DeliveryPatch {
            reconciled_at: Some(None),
            ..DeliveryPatch::default()
        };
        assert!(source.patch_delivery(1, &orphan_timestamp).await.is_err());
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let source = FixtureSource::seeded();
        source.delete_delivery(4).await.unwrap();
        assert!(source.get_delivery(4).await.is_err());
        assert!(source.delete_delivery(4).await.is_err());
    }
}
