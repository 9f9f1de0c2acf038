use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use stockbook_assignments::Assignment;
use stockbook_core::{AssignmentId, ExpectedVersion, ItemId};
use stockbook_inventory::{ItemAccount, MovementRecord};

/// Store operation error.
///
/// These are infrastructure failures (concurrency, lock pressure,
/// availability) as opposed to domain errors. A failed commit leaves no
/// partial effects behind.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic concurrency check failed; reload and retry.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// Bounded lock wait exceeded; the operation was never applied.
    #[error("store lock wait exceeded after {waited:?}")]
    Timeout { waited: Duration },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether a fresh attempt against current state can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Timeout { .. })
    }
}

/// An account replacement paired with the movement row that justifies it.
///
/// The two are committed together or not at all; `expected` is checked
/// against the stored account version under the store's write guard.
#[derive(Debug, Clone)]
pub struct AccountWrite {
    pub account: ItemAccount,
    pub movement: MovementRecord,
    pub expected: ExpectedVersion,
}

/// The single durable boundary of the ledger.
///
/// Implementations must apply each commit atomically and validate every
/// `ExpectedVersion` against current state inside the same critical
/// section as the write, so two concurrent exits can never both observe
/// sufficient stock.
pub trait LedgerStore: Send + Sync {
    /// Insert a fresh account. Conflict if the id or code is taken.
    fn register_account(&self, account: ItemAccount) -> Result<(), StoreError>;

    fn account(&self, item_id: ItemId) -> Result<Option<ItemAccount>, StoreError>;

    /// Replace the account state and append its movement row atomically.
    fn commit_movement(&self, write: AccountWrite) -> Result<(), StoreError>;

    /// Commit a check-out: account replacement, Exit row and the new
    /// assignment in one atomic write.
    fn commit_checkout(&self, write: AccountWrite, assignment: Assignment)
    -> Result<(), StoreError>;

    /// Commit an assignment transition, together with its stock side
    /// effect when the transition carries one.
    fn commit_transition(
        &self,
        assignment: Assignment,
        expected: ExpectedVersion,
        stock_write: Option<AccountWrite>,
    ) -> Result<(), StoreError>;

    /// Remove an account. Conflict while the item has movement history.
    fn remove_account(&self, item_id: ItemId) -> Result<(), StoreError>;

    /// The item's movement log in creation order.
    fn movements(&self, item_id: ItemId) -> Result<Vec<MovementRecord>, StoreError>;

    fn assignment(&self, assignment_id: AssignmentId) -> Result<Option<Assignment>, StoreError>;

    /// Full assignment scan, for filtering in the reporting layer.
    fn assignments(&self) -> Result<Vec<Assignment>, StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn register_account(&self, account: ItemAccount) -> Result<(), StoreError> {
        (**self).register_account(account)
    }

    fn account(&self, item_id: ItemId) -> Result<Option<ItemAccount>, StoreError> {
        (**self).account(item_id)
    }

    fn commit_movement(&self, write: AccountWrite) -> Result<(), StoreError> {
        (**self).commit_movement(write)
    }

    fn commit_checkout(
        &self,
        write: AccountWrite,
        assignment: Assignment,
    ) -> Result<(), StoreError> {
        (**self).commit_checkout(write, assignment)
    }

    fn commit_transition(
        &self,
        assignment: Assignment,
        expected: ExpectedVersion,
        stock_write: Option<AccountWrite>,
    ) -> Result<(), StoreError> {
        (**self).commit_transition(assignment, expected, stock_write)
    }

    fn remove_account(&self, item_id: ItemId) -> Result<(), StoreError> {
        (**self).remove_account(item_id)
    }

    fn movements(&self, item_id: ItemId) -> Result<Vec<MovementRecord>, StoreError> {
        (**self).movements(item_id)
    }

    fn assignment(&self, assignment_id: AssignmentId) -> Result<Option<Assignment>, StoreError> {
        (**self).assignment(assignment_id)
    }

    fn assignments(&self) -> Result<Vec<Assignment>, StoreError> {
        (**self).assignments()
    }
}
