//! Domain error model.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::id::{AssignmentId, ItemId, PersonId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a deterministic, recoverable business failure that is
/// reported to the caller with enough structure to render a precise message.
/// Infrastructure concerns (store timeouts, version conflicts) belong to the
/// persistence layer, not here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A requested exit/check-out exceeds the quantity on hand.
    #[error("insufficient stock on item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: i64,
        available: i64,
    },

    /// Zero or negative quantity passed to a quantity-affecting operation.
    #[error("invalid quantity: {quantity} (must be a positive integer)")]
    InvalidQuantity { quantity: i64 },

    /// Operation against a nonexistent item account.
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    /// Check-out target does not exist.
    #[error("person not found: {0}")]
    PersonNotFound(PersonId),

    /// Check-out target exists but is not active.
    #[error("person is inactive: {0}")]
    InactivePerson(PersonId),

    /// Operation against a nonexistent assignment.
    #[error("assignment not found: {0}")]
    AssignmentNotFound(AssignmentId),

    /// Status change attempted after the assignment's edit window closed.
    #[error(
        "edit window expired for assignment {assignment_id}: created {created_at}, attempted {attempted_at}"
    )]
    EditWindowExpired {
        assignment_id: AssignmentId,
        created_at: DateTime<Utc>,
        attempted_at: DateTime<Utc>,
    },

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn insufficient_stock(item_id: ItemId, requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            item_id,
            requested,
            available,
        }
    }

    pub fn invalid_quantity(quantity: i64) -> Self {
        Self::InvalidQuantity { quantity }
    }
}
