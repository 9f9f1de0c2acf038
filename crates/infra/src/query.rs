//! Read-only queries over the ledger store.
//!
//! Everything here is a point-in-time snapshot: reads clone out of the
//! store and never hold a guard across calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_assignments::{Assignment, AssignmentStatus};
use stockbook_core::{ItemId, PersonId};
use stockbook_inventory::{ItemAccount, MovementRecord, MovementType};

use crate::store::{LedgerStore, StoreError};

/// Pagination parameters for movement queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of rows to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(1000), // Cap at 1000 for safety
            offset: offset.unwrap_or(0),
        }
    }
}

/// Filter criteria for movement queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovementFilter {
    pub movement_type: Option<MovementType>,
    /// Keep rows stamped at or after this time.
    pub from: Option<DateTime<Utc>>,
    /// Keep rows stamped at or before this time.
    pub to: Option<DateTime<Utc>>,
}

impl MovementFilter {
    fn matches(&self, record: &MovementRecord) -> bool {
        if let Some(movement_type) = self.movement_type {
            if record.movement_type != movement_type {
                return false;
            }
        }
        if let Some(from) = self.from {
            if record.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.timestamp > to {
                return false;
            }
        }
        true
    }
}

/// Filter criteria for assignment queries.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AssignmentFilter {
    pub item_id: Option<ItemId>,
    pub person_id: Option<PersonId>,
    pub status: Option<AssignmentStatus>,
}

impl AssignmentFilter {
    fn matches(&self, assignment: &Assignment) -> bool {
        if let Some(item_id) = self.item_id {
            if assignment.item_id() != item_id {
                return false;
            }
        }
        if let Some(person_id) = self.person_id {
            if assignment.person_id() != person_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if assignment.status() != status {
                return false;
            }
        }
        true
    }
}

/// Paginated movement query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementPage {
    pub records: Vec<MovementRecord>,
    /// Total rows matching the filter, across all pages.
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

/// Read side of the ledger.
#[derive(Debug)]
pub struct ReportingReader<S> {
    store: S,
}

impl<S> ReportingReader<S>
where
    S: LedgerStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn account(&self, item_id: ItemId) -> Result<Option<ItemAccount>, StoreError> {
        self.store.account(item_id)
    }

    /// An item's movement log, filtered and paginated, in creation order.
    pub fn movements(
        &self,
        item_id: ItemId,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let matching: Vec<MovementRecord> = self
            .store
            .movements(item_id)?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();

        let total = matching.len() as u64;
        let records: Vec<MovementRecord> = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();
        let has_more = u64::from(pagination.offset) + (records.len() as u64) < total;

        Ok(MovementPage {
            records,
            total,
            pagination,
            has_more,
        })
    }

    /// All assignments matching the filter, oldest first.
    pub fn assignments(&self, filter: &AssignmentFilter) -> Result<Vec<Assignment>, StoreError> {
        Ok(self
            .store
            .assignments()?
            .into_iter()
            .filter(|a| filter.matches(a))
            .collect())
    }
}
