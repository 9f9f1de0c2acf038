//! Infrastructure: the durable store boundary and the ledger services
//! composed over it.
//!
//! Domain crates stay pure; everything that loads, commits or queries
//! state lives here. The store port keeps multi-row writes atomic so
//! the account, its audit rows and any assignment row can never drift
//! apart.

pub mod assignment_ledger;
pub mod ledger;
pub mod query;
pub mod store;

pub use assignment_ledger::AssignmentLedger;
pub use ledger::{LedgerError, LedgerResult, MovementLedger};
pub use query::{AssignmentFilter, MovementFilter, MovementPage, Pagination, ReportingReader};
pub use store::{AccountWrite, InMemoryLedgerStore, LedgerStore, StoreConfig, StoreError};

#[cfg(test)]
mod integration_tests;
