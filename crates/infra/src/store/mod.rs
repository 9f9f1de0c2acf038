mod in_memory;
mod r#trait;

pub use in_memory::{InMemoryLedgerStore, StoreConfig};
pub use r#trait::{AccountWrite, LedgerStore, StoreError};
