//! Inventory domain module: item accounts, moving-average costing, and the
//! immutable movement log.
//!
//! Business rules only: deterministic domain logic with no IO, no HTTP,
//! no storage. The single writer of account state lives in the infra crate
//! and drives everything through the pure functions here.

pub mod costing;
pub mod item;
pub mod movement;

pub use costing::{CostingOutcome, StockSnapshot};
pub use item::{ItemAccount, ItemKind, LifecycleStatus, NewItemAccount};
pub use movement::{MovementRecord, MovementType, ReplayedState, replay, verify_chain};
