//! Movement ledger: the only write path into inventory state.
//!
//! Every operation loads the current account, runs the pure costing
//! logic, and commits the new account state together with its audit row
//! in one store write. Version conflicts from concurrent writers are
//! retried a bounded number of times against fresh state.

use chrono::{DateTime, Utc};
use thiserror::Error;

use stockbook_core::{
    Clock, DeliveryId, DomainError, ExpectedVersion, ItemId, Money, MovementId, UserId,
};
use stockbook_inventory::{
    costing, ItemAccount, ItemKind, LifecycleStatus, MovementRecord, MovementType, NewItemAccount,
};

use crate::store::{AccountWrite, LedgerStore, StoreError};

/// How many times a commit is retried after a retryable store failure
/// before the error surfaces to the caller.
const COMMIT_ATTEMPTS: u32 = 3;

/// Ledger operation error: a domain rule said no, or the store failed.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Build the Entry write for an account without committing it.
///
/// Shared with the assignment ledger so a return can ride in the same
/// store commit as its assignment row.
pub(crate) fn prepare_entry(
    account: &ItemAccount,
    quantity: i64,
    unit_cost: Money,
    actor_id: UserId,
    notes: Option<String>,
    linked_delivery_id: Option<DeliveryId>,
    now: DateTime<Utc>,
) -> Result<AccountWrite, DomainError> {
    let before = account.snapshot();
    let outcome = costing::entry(before, quantity, unit_cost)?;

    let movement = MovementRecord {
        id: MovementId::new(),
        item_id: account.id_typed(),
        timestamp: now,
        movement_type: MovementType::Entry,
        quantity,
        unit_cost,
        total_value: unit_cost.times(quantity)?,
        quantity_before: before.quantity_on_hand,
        quantity_after: outcome.quantity_after,
        unit_cost_before: before.unit_cost,
        unit_cost_after: outcome.unit_cost_after,
        notes,
        linked_delivery_id,
        linked_assignment_id: None,
        new_status: None,
        actor_id,
    };

    let expected = ExpectedVersion::Exact(account.version());
    let mut account = account.clone();
    account.apply_outcome(&outcome);

    Ok(AccountWrite {
        account,
        movement,
        expected,
    })
}

/// Build the Exit write for an account without committing it.
pub(crate) fn prepare_exit(
    account: &ItemAccount,
    quantity: i64,
    actor_id: UserId,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<AccountWrite, DomainError> {
    let before = account.snapshot();
    let outcome = costing::exit(account.id_typed(), before, quantity)?;

    let movement = MovementRecord {
        id: MovementId::new(),
        item_id: account.id_typed(),
        timestamp: now,
        movement_type: MovementType::Exit,
        quantity,
        unit_cost: before.unit_cost,
        total_value: before.unit_cost.times(quantity)?,
        quantity_before: before.quantity_on_hand,
        quantity_after: outcome.quantity_after,
        unit_cost_before: before.unit_cost,
        unit_cost_after: outcome.unit_cost_after,
        notes,
        linked_delivery_id: None,
        linked_assignment_id: None,
        new_status: None,
        actor_id,
    };

    let expected = ExpectedVersion::Exact(account.version());
    let mut account = account.clone();
    account.apply_outcome(&outcome);

    Ok(AccountWrite {
        account,
        movement,
        expected,
    })
}

/// Audited write service over a `LedgerStore`.
#[derive(Debug)]
pub struct MovementLedger<S, C> {
    store: S,
    clock: C,
}

impl<S, C> MovementLedger<S, C>
where
    S: LedgerStore,
    C: Clock,
{
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn clock(&self) -> &C {
        &self.clock
    }

    pub(crate) fn load(&self, item_id: ItemId) -> LedgerResult<ItemAccount> {
        self.store
            .account(item_id)?
            .ok_or_else(|| DomainError::ItemNotFound(item_id).into())
    }

    /// Run `attempt` until it commits, retrying on retryable store
    /// failures so a loser of a version race reloads and tries again.
    fn with_retry<T>(
        &self,
        op: &'static str,
        mut attempt: impl FnMut() -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut tries = 0;
        loop {
            tries += 1;
            match attempt() {
                Err(LedgerError::Store(err)) if err.is_retryable() && tries < COMMIT_ATTEMPTS => {
                    tracing::warn!(op, %err, tries, "ledger commit retry");
                }
                Err(err) => {
                    tracing::debug!(op, %err, "ledger operation failed");
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }

    /// Open a new item account, then post its opening stock as the first
    /// Entry row. Durable items always carry exactly one unit.
    pub fn register_account(
        &self,
        new: NewItemAccount,
        initial_quantity: i64,
        initial_unit_cost: Money,
        actor_id: UserId,
        notes: Option<String>,
    ) -> LedgerResult<ItemAccount> {
        if initial_quantity < 0 {
            return Err(DomainError::invalid_quantity(initial_quantity).into());
        }
        // Everything about the opening entry is validated before the
        // account is registered, so a bad request leaves nothing behind.
        if initial_unit_cost.is_negative() {
            return Err(DomainError::validation("unit cost cannot be negative").into());
        }
        if let ItemKind::Durable { .. } = new.kind {
            if initial_quantity != 1 {
                return Err(DomainError::validation(
                    "durable items are registered with exactly one unit",
                )
                .into());
            }
        }

        let account = ItemAccount::register(new, self.clock.now())?;
        self.store.register_account(account.clone())?;
        tracing::info!(item_id = %account.id_typed(), code = account.code(), "item account registered");

        if initial_quantity == 0 {
            return Ok(account);
        }

        let write = prepare_entry(
            &account,
            initial_quantity,
            initial_unit_cost,
            actor_id,
            notes,
            None,
            self.clock.now(),
        )?;
        let opened = write.account.clone();
        self.store.commit_movement(write)?;
        Ok(opened)
    }

    /// Post incoming stock, blending its cost into the running average.
    pub fn record_entry(
        &self,
        item_id: ItemId,
        quantity: i64,
        unit_cost: Money,
        actor_id: UserId,
        notes: Option<String>,
        linked_delivery_id: Option<DeliveryId>,
    ) -> LedgerResult<MovementRecord> {
        self.with_retry("record_entry", || {
            let account = self.load(item_id)?;
            let write = prepare_entry(
                &account,
                quantity,
                unit_cost,
                actor_id,
                notes.clone(),
                linked_delivery_id,
                self.clock.now(),
            )?;
            let movement = write.movement.clone();
            self.store.commit_movement(write)?;
            tracing::info!(%item_id, quantity, %unit_cost, "entry recorded");
            Ok(movement)
        })
    }

    /// Post outgoing stock at the current average cost.
    pub fn record_exit(
        &self,
        item_id: ItemId,
        quantity: i64,
        actor_id: UserId,
        notes: Option<String>,
    ) -> LedgerResult<MovementRecord> {
        self.with_retry("record_exit", || {
            let account = self.load(item_id)?;
            let write = prepare_exit(&account, quantity, actor_id, notes.clone(), self.clock.now())?;
            let movement = write.movement.clone();
            self.store.commit_movement(write)?;
            tracing::info!(%item_id, quantity, "exit recorded");
            Ok(movement)
        })
    }

    /// Reconcile the on-hand quantity to a counted absolute value. The
    /// audit row logs the signed delta.
    pub fn record_adjustment(
        &self,
        item_id: ItemId,
        new_quantity: i64,
        actor_id: UserId,
        notes: Option<String>,
    ) -> LedgerResult<MovementRecord> {
        self.with_retry("record_adjustment", || {
            let account = self.load(item_id)?;
            let before = account.snapshot();
            let outcome = costing::adjustment(before, new_quantity)?;
            let delta = new_quantity
                .checked_sub(before.quantity_on_hand)
                .ok_or_else(|| DomainError::validation("quantity delta overflow"))?;

            let movement = MovementRecord {
                id: MovementId::new(),
                item_id,
                timestamp: self.clock.now(),
                movement_type: MovementType::Adjustment,
                quantity: delta,
                unit_cost: before.unit_cost,
                total_value: before.unit_cost.times(delta.abs())?,
                quantity_before: before.quantity_on_hand,
                quantity_after: outcome.quantity_after,
                unit_cost_before: before.unit_cost,
                unit_cost_after: outcome.unit_cost_after,
                notes: notes.clone(),
                linked_delivery_id: None,
                linked_assignment_id: None,
                new_status: None,
                actor_id,
            };

            let expected = ExpectedVersion::Exact(account.version());
            let mut updated = account.clone();
            updated.apply_outcome(&outcome);

            self.store.commit_movement(AccountWrite {
                account: updated,
                movement: movement.clone(),
                expected,
            })?;
            tracing::info!(%item_id, new_quantity, delta, "stock adjusted");
            Ok(movement)
        })
    }

    /// Correct the unit cost. Returns `None` (and writes nothing) when the
    /// new cost is within tolerance of the current one.
    pub fn record_price_adjustment(
        &self,
        item_id: ItemId,
        new_unit_cost: Money,
        actor_id: UserId,
        notes: Option<String>,
    ) -> LedgerResult<Option<MovementRecord>> {
        self.with_retry("record_price_adjustment", || {
            let account = self.load(item_id)?;
            let before = account.snapshot();
            let Some(outcome) = costing::price_adjustment(before, new_unit_cost)? else {
                return Ok(None);
            };

            let movement = MovementRecord {
                id: MovementId::new(),
                item_id,
                timestamp: self.clock.now(),
                movement_type: MovementType::PriceAdjustment,
                quantity: 0,
                unit_cost: new_unit_cost,
                total_value: outcome.total_value_after,
                quantity_before: before.quantity_on_hand,
                quantity_after: outcome.quantity_after,
                unit_cost_before: before.unit_cost,
                unit_cost_after: outcome.unit_cost_after,
                notes: notes.clone(),
                linked_delivery_id: None,
                linked_assignment_id: None,
                new_status: None,
                actor_id,
            };

            let expected = ExpectedVersion::Exact(account.version());
            let mut updated = account.clone();
            updated.apply_outcome(&outcome);

            self.store.commit_movement(AccountWrite {
                account: updated,
                movement: movement.clone(),
                expected,
            })?;
            tracing::info!(%item_id, %new_unit_cost, "unit cost adjusted");
            Ok(Some(movement))
        })
    }

    /// Change the item's condition. Numerically a no-op, still logged.
    pub fn record_status_change(
        &self,
        item_id: ItemId,
        new_status: LifecycleStatus,
        actor_id: UserId,
        notes: Option<String>,
    ) -> LedgerResult<MovementRecord> {
        self.with_retry("record_status_change", || {
            let account = self.load(item_id)?;
            let before = account.snapshot();

            let movement = MovementRecord {
                id: MovementId::new(),
                item_id,
                timestamp: self.clock.now(),
                movement_type: MovementType::StatusChange,
                quantity: 0,
                unit_cost: before.unit_cost,
                total_value: before.total_value,
                quantity_before: before.quantity_on_hand,
                quantity_after: before.quantity_on_hand,
                unit_cost_before: before.unit_cost,
                unit_cost_after: before.unit_cost,
                notes: notes.clone(),
                linked_delivery_id: None,
                linked_assignment_id: None,
                new_status: Some(new_status),
                actor_id,
            };

            let expected = ExpectedVersion::Exact(account.version());
            let mut updated = account.clone();
            updated.set_lifecycle(new_status);

            self.store.commit_movement(AccountWrite {
                account: updated,
                movement: movement.clone(),
                expected,
            })?;
            tracing::info!(%item_id, ?new_status, "item condition changed");
            Ok(movement)
        })
    }

    /// Remove an account that never moved. Anything with history stays
    /// forever; the audit trail is the point.
    pub fn delete_account(&self, item_id: ItemId) -> LedgerResult<()> {
        let account = self.load(item_id)?;
        let movements = self.store.movements(item_id)?;
        if !movements.is_empty() {
            return Err(DomainError::invariant(format!(
                "item {} has {} recorded movements and cannot be deleted",
                account.id_typed(),
                movements.len()
            ))
            .into());
        }

        self.store.remove_account(item_id)?;
        tracing::info!(%item_id, "item account removed");
        Ok(())
    }
}
