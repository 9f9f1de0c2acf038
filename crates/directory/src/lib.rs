//! Directory module: the people and suppliers the ledger transacts with.
//!
//! The ledger core only consumes the lookup traits; the in-memory
//! implementations cover tests, dev, and the original system's code
//! generation and status bookkeeping.

pub mod person;
pub mod supplier;

pub use person::{
    ContactInfo, InMemoryPersonDirectory, Person, PersonDirectory, PersonPresence, PersonStatus,
};
pub use supplier::{Delivery, InMemorySupplierDirectory, Supplier, SupplierDirectory};
