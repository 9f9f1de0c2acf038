//! Moving (weighted) average costing.
//!
//! Pure functions from a stock snapshot to the post-movement state. Entries
//! blend the incoming cost into the running average; exits consume value at
//! the current average and never move the per-unit cost basis.

use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult, ItemId, Money};

/// Numeric state of an account at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub quantity_on_hand: i64,
    pub unit_cost: Money,
    pub total_value: Money,
}

impl StockSnapshot {
    pub const EMPTY: StockSnapshot = StockSnapshot {
        quantity_on_hand: 0,
        unit_cost: Money::ZERO,
        total_value: Money::ZERO,
    };
}

/// Result of applying one movement to a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostingOutcome {
    pub quantity_after: i64,
    pub unit_cost_after: Money,
    pub total_value_after: Money,
}

fn ensure_positive_quantity(quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::invalid_quantity(quantity));
    }
    Ok(())
}

/// Stock entry at a given incoming unit cost.
///
/// `total' = total + quantity * incoming`, `unit' = total' / quantity'`
/// (half-up at scale 4). The running total stays the exact value sum; only
/// the average is rounded.
pub fn entry(
    snapshot: StockSnapshot,
    quantity: i64,
    incoming_unit_cost: Money,
) -> DomainResult<CostingOutcome> {
    ensure_positive_quantity(quantity)?;
    if incoming_unit_cost.is_negative() {
        return Err(DomainError::validation("unit cost cannot be negative"));
    }

    let quantity_after = snapshot
        .quantity_on_hand
        .checked_add(quantity)
        .ok_or_else(|| DomainError::validation("quantity addition overflow"))?;
    let total_value_after = snapshot
        .total_value
        .checked_add(incoming_unit_cost.times(quantity)?)?;
    let unit_cost_after = total_value_after.divided_by(quantity_after)?;

    Ok(CostingOutcome {
        quantity_after,
        unit_cost_after,
        total_value_after,
    })
}

/// Stock exit at the current average cost.
///
/// Fails with `InsufficientStock` when the account cannot cover the
/// requested quantity; the snapshot is untouched in that case. An exit that
/// empties the account forces both unit cost and total value to zero.
pub fn exit(
    item_id: ItemId,
    snapshot: StockSnapshot,
    quantity: i64,
) -> DomainResult<CostingOutcome> {
    ensure_positive_quantity(quantity)?;
    if quantity > snapshot.quantity_on_hand {
        return Err(DomainError::insufficient_stock(
            item_id,
            quantity,
            snapshot.quantity_on_hand,
        ));
    }

    let quantity_after = snapshot.quantity_on_hand - quantity;
    if quantity_after == 0 {
        return Ok(CostingOutcome {
            quantity_after: 0,
            unit_cost_after: Money::ZERO,
            total_value_after: Money::ZERO,
        });
    }

    let consumed = snapshot.unit_cost.times(quantity)?;
    let remaining = snapshot.total_value.checked_sub(consumed)?;
    // The average is rounded, so a near-empty account can round the
    // remaining value a hair below zero; clamp rather than carry a
    // negative valuation.
    let total_value_after = if remaining.is_negative() {
        Money::ZERO
    } else {
        remaining
    };

    Ok(CostingOutcome {
        quantity_after,
        unit_cost_after: snapshot.unit_cost,
        total_value_after,
    })
}

/// Manual unit-cost correction.
///
/// Returns `None` when the new cost is within the fixed 0.01 tolerance of
/// the current cost, so rounding noise never produces audit rows.
pub fn price_adjustment(
    snapshot: StockSnapshot,
    new_unit_cost: Money,
) -> DomainResult<Option<CostingOutcome>> {
    if new_unit_cost.is_negative() {
        return Err(DomainError::validation("unit cost cannot be negative"));
    }
    if snapshot.unit_cost.within_tolerance_of(new_unit_cost) {
        return Ok(None);
    }

    Ok(Some(CostingOutcome {
        quantity_after: snapshot.quantity_on_hand,
        unit_cost_after: new_unit_cost,
        total_value_after: new_unit_cost.times(snapshot.quantity_on_hand)?,
    }))
}

/// Direct stock correction to an absolute quantity (count reconciliation).
///
/// Unit cost is unaffected; the total is revalued at the current average.
pub fn adjustment(snapshot: StockSnapshot, new_quantity: i64) -> DomainResult<CostingOutcome> {
    if new_quantity < 0 {
        return Err(DomainError::invalid_quantity(new_quantity));
    }

    let (unit_cost_after, total_value_after) = if new_quantity == 0 {
        (Money::ZERO, Money::ZERO)
    } else {
        (
            snapshot.unit_cost,
            snapshot.unit_cost.times(new_quantity)?,
        )
    };

    Ok(CostingOutcome {
        quantity_after: new_quantity,
        unit_cost_after,
        total_value_after,
    })
}
