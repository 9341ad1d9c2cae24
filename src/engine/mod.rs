pub mod board;
pub mod lifecycle;
pub mod reports;

pub use board::{DeliveryBoard, SyncState, Tracked};
pub use lifecycle::{Completion, LifecycleEngine, Operation, TransitionError};
