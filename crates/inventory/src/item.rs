use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult, Entity, ItemId, Money};

use crate::costing::{CostingOutcome, StockSnapshot};

/// Item kind: aggregate-quantity supplies vs unique serialized instruments.
///
/// The kind-specific fields ride along as a tagged variant; there is no
/// subtype-table polymorphism here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum ItemKind {
    /// Tracked by aggregate quantity (supplies).
    Consumable { reorder_min: i64, reorder_max: i64 },
    /// Unique, serialized unit (an instrument). Always quantity 1.
    Durable {
        brand: String,
        model: String,
        serial_no: String,
    },
}

impl ItemKind {
    pub fn consumable(reorder_min: i64, reorder_max: i64) -> DomainResult<Self> {
        if reorder_min < 0 {
            return Err(DomainError::validation("reorder_min cannot be negative"));
        }
        if reorder_max <= reorder_min {
            return Err(DomainError::validation(
                "reorder_max must be greater than reorder_min",
            ));
        }
        Ok(Self::Consumable {
            reorder_min,
            reorder_max,
        })
    }

    pub fn durable(
        brand: impl Into<String>,
        model: impl Into<String>,
        serial_no: impl Into<String>,
    ) -> DomainResult<Self> {
        let brand = brand.into();
        let model = model.into();
        let serial_no = serial_no.into();
        if brand.trim().is_empty() || model.trim().is_empty() || serial_no.trim().is_empty() {
            return Err(DomainError::validation(
                "durable items require brand, model and serial number",
            ));
        }
        Ok(Self::Durable {
            brand,
            model,
            serial_no,
        })
    }

    pub fn is_consumable(&self) -> bool {
        matches!(self, ItemKind::Consumable { .. })
    }
}

/// Item condition lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Active,
    Damaged,
    Decommissioned,
}

/// Registration data for a new item account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItemAccount {
    pub id: ItemId,
    pub code: String,
    pub name: String,
    pub kind: ItemKind,
}

/// Per-item stock/valuation record: the current truth about an item's
/// quantity and value.
///
/// Accounts start empty and are mutated only through the movement ledger;
/// `total_value == quantity_on_hand * unit_cost` holds after every
/// committed movement (within fixed-point rounding of the average).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAccount {
    id: ItemId,
    code: String,
    name: String,
    kind: ItemKind,
    quantity_on_hand: i64,
    unit_cost: Money,
    total_value: Money,
    lifecycle: LifecycleStatus,
    version: u64,
    created_at: DateTime<Utc>,
}

impl ItemAccount {
    /// Register a new, empty account (quantity 0, cost 0).
    ///
    /// Stock arrives through an initial Entry movement, never by direct
    /// quantity injection.
    pub fn register(new: NewItemAccount, created_at: DateTime<Utc>) -> DomainResult<Self> {
        if new.code.trim().is_empty() {
            return Err(DomainError::validation("item code cannot be empty"));
        }
        if new.name.trim().is_empty() {
            return Err(DomainError::validation("item name cannot be empty"));
        }
        Ok(Self {
            id: new.id,
            code: new.code,
            name: new.name,
            kind: new.kind,
            quantity_on_hand: 0,
            unit_cost: Money::ZERO,
            total_value: Money::ZERO,
            lifecycle: LifecycleStatus::Active,
            version: 0,
            created_at,
        })
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    pub fn quantity_on_hand(&self) -> i64 {
        self.quantity_on_hand
    }

    pub fn unit_cost(&self) -> Money {
        self.unit_cost
    }

    pub fn total_value(&self) -> Money {
        self.total_value
    }

    pub fn lifecycle(&self) -> LifecycleStatus {
        self.lifecycle
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Current numeric state, as input for the costing engine.
    pub fn snapshot(&self) -> StockSnapshot {
        StockSnapshot {
            quantity_on_hand: self.quantity_on_hand,
            unit_cost: self.unit_cost,
            total_value: self.total_value,
        }
    }

    /// Whether a consumable account has fallen to or below its reorder floor.
    pub fn is_below_reorder_min(&self) -> bool {
        match self.kind {
            ItemKind::Consumable { reorder_min, .. } => self.quantity_on_hand <= reorder_min,
            ItemKind::Durable { .. } => false,
        }
    }

    /// Write back a costing outcome. Bumps the optimistic-concurrency version.
    pub fn apply_outcome(&mut self, outcome: &CostingOutcome) {
        self.quantity_on_hand = outcome.quantity_after;
        self.unit_cost = outcome.unit_cost_after;
        self.total_value = outcome.total_value_after;
        self.version += 1;
    }

    /// Metadata-only condition change; quantity and value are untouched.
    pub fn set_lifecycle(&mut self, status: LifecycleStatus) {
        self.lifecycle = status;
        self.version += 1;
    }
}

impl Entity for ItemAccount {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
