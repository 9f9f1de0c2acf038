use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};
use std::time::{Duration, Instant};

use stockbook_assignments::Assignment;
use stockbook_core::{AssignmentId, ExpectedVersion, ItemId};
use stockbook_inventory::{ItemAccount, MovementRecord};

use super::r#trait::{AccountWrite, LedgerStore, StoreError};

/// Store tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// How long a single operation may wait for the state lock before
    /// giving up with `StoreError::Timeout`.
    pub op_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
struct ItemRecord {
    account: ItemAccount,
    movements: Vec<MovementRecord>,
}

#[derive(Debug, Default)]
struct State {
    items: HashMap<ItemId, ItemRecord>,
    assignments: HashMap<AssignmentId, Assignment>,
}

/// In-memory ledger store.
///
/// Intended for tests/dev; one lock over the whole state keeps the
/// multi-row commits trivially atomic. Movement vectors are append-only
/// and ordered by insertion.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<State>,
    config: StoreConfig,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            state: RwLock::new(State::default()),
            config,
        }
    }

    fn read_guard(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        let deadline = Instant::now() + self.config.op_timeout;
        loop {
            match self.state.try_read() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(_)) => {
                    return Err(StoreError::Unavailable("state lock poisoned".to_string()));
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::Timeout {
                            waited: self.config.op_timeout,
                        });
                    }
                    std::thread::yield_now();
                }
            }
        }
    }

    fn write_guard(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        let deadline = Instant::now() + self.config.op_timeout;
        loop {
            match self.state.try_write() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(_)) => {
                    return Err(StoreError::Unavailable("state lock poisoned".to_string()));
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::Timeout {
                            waited: self.config.op_timeout,
                        });
                    }
                    std::thread::yield_now();
                }
            }
        }
    }
}

fn check_version(expected: ExpectedVersion, current: u64) -> Result<(), StoreError> {
    if expected.matches(current) {
        Ok(())
    } else {
        Err(StoreError::Conflict(format!(
            "expected {expected:?}, found {current}"
        )))
    }
}

fn item_record<'a>(
    state: &'a mut State,
    item_id: ItemId,
) -> Result<&'a mut ItemRecord, StoreError> {
    state
        .items
        .get_mut(&item_id)
        .ok_or_else(|| StoreError::Conflict(format!("item {item_id} is not registered")))
}

impl LedgerStore for InMemoryLedgerStore {
    fn register_account(&self, account: ItemAccount) -> Result<(), StoreError> {
        let mut state = self.write_guard()?;

        if state.items.contains_key(&account.id_typed()) {
            return Err(StoreError::Conflict(format!(
                "item {} is already registered",
                account.id_typed()
            )));
        }
        if state
            .items
            .values()
            .any(|r| r.account.code() == account.code())
        {
            return Err(StoreError::Conflict(format!(
                "item code {} is already taken",
                account.code()
            )));
        }

        state.items.insert(
            account.id_typed(),
            ItemRecord {
                account,
                movements: Vec::new(),
            },
        );
        Ok(())
    }

    fn account(&self, item_id: ItemId) -> Result<Option<ItemAccount>, StoreError> {
        let state = self.read_guard()?;
        Ok(state.items.get(&item_id).map(|r| r.account.clone()))
    }

    fn commit_movement(&self, write: AccountWrite) -> Result<(), StoreError> {
        let mut state = self.write_guard()?;

        let record = item_record(&mut state, write.account.id_typed())?;
        check_version(write.expected, record.account.version())?;

        record.movements.push(write.movement);
        record.account = write.account;
        Ok(())
    }

    fn commit_checkout(
        &self,
        write: AccountWrite,
        assignment: Assignment,
    ) -> Result<(), StoreError> {
        let mut state = self.write_guard()?;

        // Validate everything before mutating anything.
        if state.assignments.contains_key(&assignment.id_typed()) {
            return Err(StoreError::Conflict(format!(
                "assignment {} already exists",
                assignment.id_typed()
            )));
        }
        {
            let record = item_record(&mut state, write.account.id_typed())?;
            check_version(write.expected, record.account.version())?;
        }

        let record = item_record(&mut state, write.account.id_typed())?;
        record.movements.push(write.movement);
        record.account = write.account;
        state.assignments.insert(assignment.id_typed(), assignment);
        Ok(())
    }

    fn commit_transition(
        &self,
        assignment: Assignment,
        expected: ExpectedVersion,
        stock_write: Option<AccountWrite>,
    ) -> Result<(), StoreError> {
        let mut state = self.write_guard()?;

        let current = state
            .assignments
            .get(&assignment.id_typed())
            .ok_or_else(|| {
                StoreError::Conflict(format!("assignment {} is unknown", assignment.id_typed()))
            })?
            .version();
        check_version(expected, current)?;

        if let Some(write) = &stock_write {
            let record = item_record(&mut state, write.account.id_typed())?;
            check_version(write.expected, record.account.version())?;
        }

        if let Some(write) = stock_write {
            let record = item_record(&mut state, write.account.id_typed())?;
            record.movements.push(write.movement);
            record.account = write.account;
        }
        state.assignments.insert(assignment.id_typed(), assignment);
        Ok(())
    }

    fn remove_account(&self, item_id: ItemId) -> Result<(), StoreError> {
        let mut state = self.write_guard()?;

        let record = state
            .items
            .get(&item_id)
            .ok_or_else(|| StoreError::Conflict(format!("item {item_id} is not registered")))?;
        if !record.movements.is_empty() {
            return Err(StoreError::Conflict(format!(
                "item {item_id} has movement history"
            )));
        }

        state.items.remove(&item_id);
        Ok(())
    }

    fn movements(&self, item_id: ItemId) -> Result<Vec<MovementRecord>, StoreError> {
        let state = self.read_guard()?;
        Ok(state
            .items
            .get(&item_id)
            .map(|r| r.movements.clone())
            .unwrap_or_default())
    }

    fn assignment(&self, assignment_id: AssignmentId) -> Result<Option<Assignment>, StoreError> {
        let state = self.read_guard()?;
        Ok(state.assignments.get(&assignment_id).cloned())
    }

    fn assignments(&self) -> Result<Vec<Assignment>, StoreError> {
        let state = self.read_guard()?;
        let mut all: Vec<Assignment> = state.assignments.values().cloned().collect();
        all.sort_by_key(Assignment::created_at);
        Ok(all)
    }
}
