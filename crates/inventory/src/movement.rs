//! Immutable movement log rows and the replay fold.
//!
//! Every stock-affecting or auditable event gets exactly one row carrying a
//! full before/after snapshot of the account it touched. Rows are never
//! updated or deleted; replaying them in creation order from an empty
//! snapshot reproduces the live account state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{
    AssignmentId, DeliveryId, DomainError, DomainResult, ItemId, Money, MovementId, UserId,
};

use crate::costing::{self, StockSnapshot};
use crate::item::LifecycleStatus;

/// Movement classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Entry,
    Exit,
    Adjustment,
    PriceAdjustment,
    StatusChange,
}

/// One append-only audit row.
///
/// `quantity` is the movement's own quantity (signed delta for adjustments,
/// 0 for pure price/status rows). For Entry rows `unit_cost` is the incoming
/// cost being blended in; for Exit rows it is the average the stock left at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementId,
    pub item_id: ItemId,
    pub timestamp: DateTime<Utc>,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub unit_cost: Money,
    pub total_value: Money,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub unit_cost_before: Money,
    pub unit_cost_after: Money,
    pub notes: Option<String>,
    /// Provenance link for Entry rows (supplier delivery).
    pub linked_delivery_id: Option<DeliveryId>,
    /// Assignment link for check-out Exits and return-triggered Entries.
    pub linked_assignment_id: Option<AssignmentId>,
    /// New condition for StatusChange rows.
    pub new_status: Option<LifecycleStatus>,
    pub actor_id: UserId,
}

/// Account state reproduced by a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayedState {
    pub quantity_on_hand: i64,
    pub unit_cost: Money,
    pub total_value: Money,
}

impl From<StockSnapshot> for ReplayedState {
    fn from(s: StockSnapshot) -> Self {
        Self {
            quantity_on_hand: s.quantity_on_hand,
            unit_cost: s.unit_cost,
            total_value: s.total_value,
        }
    }
}

/// Fold an item's movement log in creation order, starting from an empty
/// account, through the same costing functions the ledger uses.
///
/// The result must match the live `ItemAccount` exactly; a mismatch means
/// the log and the account have diverged, which the atomic-commit rule is
/// supposed to make impossible.
pub fn replay(records: &[MovementRecord]) -> DomainResult<ReplayedState> {
    let mut snapshot = StockSnapshot::EMPTY;

    for record in records {
        let outcome = match record.movement_type {
            MovementType::Entry => costing::entry(snapshot, record.quantity, record.unit_cost)?,
            MovementType::Exit => costing::exit(record.item_id, snapshot, record.quantity)?,
            MovementType::Adjustment => {
                let target = snapshot
                    .quantity_on_hand
                    .checked_add(record.quantity)
                    .ok_or_else(|| {
                        DomainError::invariant(format!(
                            "adjustment row {} overflows the running quantity",
                            record.id
                        ))
                    })?;
                costing::adjustment(snapshot, target)?
            }
            MovementType::PriceAdjustment => {
                match costing::price_adjustment(snapshot, record.unit_cost_after)? {
                    Some(outcome) => outcome,
                    // A logged price adjustment is by definition outside
                    // tolerance; a None here means the row is inconsistent.
                    None => {
                        return Err(DomainError::invariant(format!(
                            "price adjustment row {} is within tolerance of the running state",
                            record.id
                        )));
                    }
                }
            }
            MovementType::StatusChange => continue,
        };

        snapshot = StockSnapshot {
            quantity_on_hand: outcome.quantity_after,
            unit_cost: outcome.unit_cost_after,
            total_value: outcome.total_value_after,
        };
    }

    Ok(snapshot.into())
}

/// Check the audit chain is gapless: the first row starts from an empty
/// account and every row's `quantity_before` equals its predecessor's
/// `quantity_after`.
pub fn verify_chain(records: &[MovementRecord]) -> DomainResult<()> {
    let mut expected_before = 0i64;

    for record in records {
        if record.quantity_before != expected_before {
            return Err(DomainError::invariant(format!(
                "movement {} breaks the audit chain: quantity_before {} != expected {}",
                record.id, record.quantity_before, expected_before
            )));
        }
        expected_before = record.quantity_after;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        item_id: ItemId,
        movement_type: MovementType,
        quantity: i64,
        unit_cost_minor: i64,
        before: (i64, i64),
        after: (i64, i64),
    ) -> MovementRecord {
        MovementRecord {
            id: MovementId::new(),
            item_id,
            timestamp: Utc::now(),
            movement_type,
            quantity,
            unit_cost: Money::from_minor_units(unit_cost_minor),
            total_value: Money::from_minor_units(unit_cost_minor)
                .times(quantity.abs())
                .unwrap(),
            quantity_before: before.0,
            quantity_after: after.0,
            unit_cost_before: Money::from_minor_units(before.1),
            unit_cost_after: Money::from_minor_units(after.1),
            notes: None,
            linked_delivery_id: None,
            linked_assignment_id: None,
            new_status: None,
            actor_id: UserId::new(),
        }
    }

    #[test]
    fn replay_reproduces_the_worked_scenario() {
        let item_id = ItemId::new();
        let records = vec![
            row(item_id, MovementType::Entry, 100, 20_000, (0, 0), (100, 20_000)),
            row(item_id, MovementType::Entry, 50, 30_000, (100, 20_000), (150, 23_333)),
            row(item_id, MovementType::Exit, 60, 23_333, (150, 23_333), (90, 23_333)),
        ];

        let state = replay(&records).unwrap();
        assert_eq!(state.quantity_on_hand, 90);
        assert_eq!(state.unit_cost, Money::from_minor_units(23_333));
        assert_eq!(state.total_value, Money::from_minor_units(2_100_020));

        verify_chain(&records).unwrap();
    }

    #[test]
    fn replay_applies_adjustment_deltas_and_price_rows() {
        let item_id = ItemId::new();
        let mut records = vec![
            row(item_id, MovementType::Entry, 10, 50_000, (0, 0), (10, 50_000)),
            // Count found 7 on the shelf: delta -3.
            row(item_id, MovementType::Adjustment, -3, 50_000, (10, 50_000), (7, 50_000)),
        ];
        // Reprice to 6.00.
        let mut price_row = row(item_id, MovementType::PriceAdjustment, 0, 60_000, (7, 50_000), (7, 60_000));
        price_row.total_value = Money::from_minor_units(420_000);
        records.push(price_row);

        let state = replay(&records).unwrap();
        assert_eq!(state.quantity_on_hand, 7);
        assert_eq!(state.unit_cost, Money::from_minor_units(60_000));
        assert_eq!(state.total_value, Money::from_minor_units(420_000));
    }

    #[test]
    fn status_rows_do_not_move_the_fold() {
        let item_id = ItemId::new();
        let mut status_row = row(item_id, MovementType::StatusChange, 0, 0, (10, 50_000), (10, 50_000));
        status_row.new_status = Some(LifecycleStatus::Damaged);

        let records = vec![
            row(item_id, MovementType::Entry, 10, 50_000, (0, 0), (10, 50_000)),
            status_row,
        ];

        let state = replay(&records).unwrap();
        assert_eq!(state.quantity_on_hand, 10);
        assert_eq!(state.unit_cost, Money::from_minor_units(50_000));
    }

    #[test]
    fn broken_chain_is_detected() {
        let item_id = ItemId::new();
        let records = vec![
            row(item_id, MovementType::Entry, 10, 50_000, (0, 0), (10, 50_000)),
            // Claims to start from 12 where the previous row ended at 10.
            row(item_id, MovementType::Exit, 2, 50_000, (12, 50_000), (10, 50_000)),
        ];

        let err = verify_chain(&records).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
