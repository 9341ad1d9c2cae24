pub mod conciliation;
pub mod delivery;
pub mod location;
pub mod user;

pub type DeliveryId = u64;
pub type UserId = u64;
