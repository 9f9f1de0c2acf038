use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{
    AssignmentId, DomainError, DomainResult, Entity, ItemId, Money, PersonId, UserId,
};

/// How long after creation an assignment's status remains correctable.
pub const EDIT_WINDOW: Duration = Duration::hours(48);

/// Custody status of an assignment.
///
/// All five are mutually exclusive "current" states. Within the edit window
/// any state may transition to any other; only `Returned` puts stock back
/// into circulation. Lost/Damaged/Finalized describe what happened to an
/// already-issued unit without returning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Assigned,
    Returned,
    Lost,
    Damaged,
    Finalized,
}

impl core::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::Returned => "returned",
            AssignmentStatus::Lost => "lost",
            AssignmentStatus::Damaged => "damaged",
            AssignmentStatus::Finalized => "finalized",
        };
        f.write_str(label)
    }
}

/// Stock side effect a status transition requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    /// Pure status flip, no stock movement.
    None,
    /// Leaving any state for Returned: the quantity re-enters stock at the
    /// item's current unit cost.
    ReturnToStock,
    /// Leaving Returned for any other state: the quantity exits stock again
    /// (and may fail on insufficient stock).
    ReissueFromStock,
}

/// One timestamped line of the append-only annotation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteLine {
    pub at: DateTime<Utc>,
    pub actor_id: UserId,
    pub text: String,
}

/// Check-out request data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOut {
    pub assignment_id: AssignmentId,
    pub item_id: ItemId,
    pub person_id: PersonId,
    pub quantity: i64,
    pub unit_cost: Money,
    pub actor_id: UserId,
    pub notes: Option<String>,
}

/// One check-out of a quantity of a consumable to a person.
///
/// Created atomically with the Exit movement that decrements stock; mutated
/// only through `apply_transition`; never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    id: AssignmentId,
    item_id: ItemId,
    person_id: PersonId,
    issued_by: UserId,
    created_at: DateTime<Utc>,
    quantity: i64,
    unit_cost_at_assignment: Money,
    total_value_at_assignment: Money,
    status: AssignmentStatus,
    returned_at: Option<DateTime<Utc>>,
    notes: Vec<NoteLine>,
    version: u64,
}

impl Assignment {
    /// Create a new assignment in the initial `Assigned` state, freezing the
    /// caller-supplied unit cost for the custody line.
    pub fn check_out(request: CheckOut, now: DateTime<Utc>) -> DomainResult<Self> {
        if request.quantity <= 0 {
            return Err(DomainError::invalid_quantity(request.quantity));
        }
        let total_value_at_assignment = request.unit_cost.times(request.quantity)?;

        let mut notes = Vec::new();
        notes.push(NoteLine {
            at: now,
            actor_id: request.actor_id,
            text: match &request.notes {
                Some(remark) => format!("checked out: {remark}"),
                None => "checked out".to_string(),
            },
        });

        Ok(Self {
            id: request.assignment_id,
            item_id: request.item_id,
            person_id: request.person_id,
            issued_by: request.actor_id,
            created_at: now,
            quantity: request.quantity,
            unit_cost_at_assignment: request.unit_cost,
            total_value_at_assignment,
            status: AssignmentStatus::Assigned,
            returned_at: None,
            notes,
            version: 0,
        })
    }

    pub fn id_typed(&self) -> AssignmentId {
        self.id
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn person_id(&self) -> PersonId {
        self.person_id
    }

    pub fn issued_by(&self) -> UserId {
        self.issued_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit_cost_at_assignment(&self) -> Money {
        self.unit_cost_at_assignment
    }

    pub fn total_value_at_assignment(&self) -> Money {
        self.total_value_at_assignment
    }

    pub fn status(&self) -> AssignmentStatus {
        self.status
    }

    pub fn returned_at(&self) -> Option<DateTime<Utc>> {
        self.returned_at
    }

    pub fn notes(&self) -> &[NoteLine] {
        &self.notes
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// The status remains correctable until 48 hours after creation
    /// (boundary inclusive).
    pub fn edit_window_open(&self, now: DateTime<Utc>) -> bool {
        now <= self.created_at + EDIT_WINDOW
    }

    /// Decide what a transition to `new_status` requires, without mutating.
    ///
    /// The window check comes first and is a hard business-rule failure,
    /// distinct from stock problems. Transitions are deliberately
    /// unrestricted beyond that (any state to any state, Finalized back to
    /// Assigned included); tightening this is a policy decision, not a
    /// correctness fix.
    pub fn plan_transition(
        &self,
        new_status: AssignmentStatus,
        now: DateTime<Utc>,
    ) -> DomainResult<StockEffect> {
        if !self.edit_window_open(now) {
            return Err(DomainError::EditWindowExpired {
                assignment_id: self.id,
                created_at: self.created_at,
                attempted_at: now,
            });
        }

        let effect = match (self.status, new_status) {
            (AssignmentStatus::Returned, AssignmentStatus::Returned) => StockEffect::None,
            (_, AssignmentStatus::Returned) => StockEffect::ReturnToStock,
            (AssignmentStatus::Returned, _) => StockEffect::ReissueFromStock,
            _ => StockEffect::None,
        };
        Ok(effect)
    }

    /// Write the transition: append the note line, maintain `returned_at`,
    /// set the new status unconditionally.
    ///
    /// Callers run the stock side effect from `plan_transition` first; this
    /// method is only reached once that has succeeded.
    pub fn apply_transition(
        &mut self,
        new_status: AssignmentStatus,
        now: DateTime<Utc>,
        actor_id: UserId,
        remark: Option<&str>,
    ) {
        let text = match remark {
            Some(remark) if !remark.trim().is_empty() => {
                format!("{} -> {}: {}", self.status, new_status, remark.trim())
            }
            _ => format!("{} -> {}", self.status, new_status),
        };
        self.notes.push(NoteLine {
            at: now,
            actor_id,
            text,
        });

        match (self.status, new_status) {
            (from, AssignmentStatus::Returned) if from != AssignmentStatus::Returned => {
                self.returned_at = Some(now);
            }
            (AssignmentStatus::Returned, to) if to != AssignmentStatus::Returned => {
                self.returned_at = None;
            }
            _ => {}
        }

        self.status = new_status;
        self.version += 1;
    }
}

impl Entity for Assignment {
    type Id = AssignmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
