//! Assignment domain module: temporary custody of consumable stock.
//!
//! Pure state-machine logic for check-outs and their bounded-edit status
//! changes. Stock side effects are decided here and executed by the
//! movement ledger in the infra crate.

pub mod assignment;

pub use assignment::{
    Assignment, AssignmentStatus, CheckOut, EDIT_WINDOW, NoteLine, StockEffect,
};
