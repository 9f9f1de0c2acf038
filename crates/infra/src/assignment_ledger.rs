//! Assignment ledger: check-outs and their bounded-edit status changes.
//!
//! Composes the movement ledger's prepared writes with the assignment
//! state machine so the assignment row and its stock side effect always
//! land in one store commit.

use stockbook_assignments::{Assignment, AssignmentStatus, CheckOut, StockEffect};
use stockbook_core::{AssignmentId, Clock, DomainError, ExpectedVersion, ItemId, Money, PersonId, UserId};
use stockbook_directory::{PersonDirectory, PersonPresence};

use crate::ledger::{prepare_entry, prepare_exit, LedgerError, LedgerResult, MovementLedger};
use crate::store::LedgerStore;

/// Custody service over the movement ledger and a person directory.
#[derive(Debug)]
pub struct AssignmentLedger<S, C, D> {
    ledger: MovementLedger<S, C>,
    directory: D,
}

impl<S, C, D> AssignmentLedger<S, C, D>
where
    S: LedgerStore,
    C: Clock,
    D: PersonDirectory,
{
    pub fn new(ledger: MovementLedger<S, C>, directory: D) -> Self {
        Self { ledger, directory }
    }

    pub fn ledger(&self) -> &MovementLedger<S, C> {
        &self.ledger
    }

    fn ensure_active(&self, person_id: PersonId) -> Result<(), DomainError> {
        match self.directory.presence_of(person_id) {
            PersonPresence::Active => Ok(()),
            PersonPresence::Inactive => Err(DomainError::InactivePerson(person_id)),
            PersonPresence::NotFound => Err(DomainError::PersonNotFound(person_id)),
        }
    }

    /// Issue a quantity of a consumable to an active person.
    ///
    /// The assignment freezes the caller-supplied unit cost for the
    /// custody line; the Exit row it links to moves stock at the item's
    /// current average, like any other exit.
    pub fn check_out(
        &self,
        item_id: ItemId,
        person_id: PersonId,
        quantity: i64,
        unit_cost: Money,
        actor_id: UserId,
        notes: Option<String>,
    ) -> LedgerResult<Assignment> {
        self.ensure_active(person_id)?;

        let store = self.ledger.store();
        let account = self.ledger.load(item_id)?;
        if !account.kind().is_consumable() {
            return Err(DomainError::validation(
                "durable items are issued whole, only consumables can be checked out",
            )
            .into());
        }

        let now = self.ledger.clock().now();
        let assignment = Assignment::check_out(
            CheckOut {
                assignment_id: AssignmentId::new(),
                item_id,
                person_id,
                quantity,
                unit_cost,
                actor_id,
                notes: notes.clone(),
            },
            now,
        )?;

        let mut write = prepare_exit(&account, quantity, actor_id, notes, now)?;
        write.movement.linked_assignment_id = Some(assignment.id_typed());

        store.commit_checkout(write, assignment.clone())?;
        tracing::info!(
            assignment_id = %assignment.id_typed(),
            %item_id,
            %person_id,
            quantity,
            "stock checked out"
        );
        Ok(assignment)
    }

    /// Move an assignment to a new status within the 48 hour edit window.
    ///
    /// Entering `Returned` puts the quantity back into stock at the
    /// item's current unit cost; leaving `Returned` exits it again and
    /// can fail on insufficient stock. Either way the assignment row and
    /// the stock row commit together.
    pub fn change_status(
        &self,
        assignment_id: AssignmentId,
        new_status: AssignmentStatus,
        actor_id: UserId,
        remark: Option<&str>,
    ) -> LedgerResult<Assignment> {
        let store = self.ledger.store();
        let assignment = store
            .assignment(assignment_id)?
            .ok_or(DomainError::AssignmentNotFound(assignment_id))?;

        let now = self.ledger.clock().now();
        let effect = assignment.plan_transition(new_status, now)?;

        let stock_write = match effect {
            StockEffect::None => None,
            StockEffect::ReturnToStock => {
                let account = self.ledger.load(assignment.item_id())?;
                let return_cost = account.unit_cost();
                let mut write = prepare_entry(
                    &account,
                    assignment.quantity(),
                    return_cost,
                    actor_id,
                    Some(format!("return of assignment {assignment_id}")),
                    None,
                    now,
                )?;
                write.movement.linked_assignment_id = Some(assignment_id);
                Some(write)
            }
            StockEffect::ReissueFromStock => {
                let account = self.ledger.load(assignment.item_id())?;
                let mut write = prepare_exit(
                    &account,
                    assignment.quantity(),
                    actor_id,
                    Some(format!("reissue of assignment {assignment_id}")),
                    now,
                )?;
                write.movement.linked_assignment_id = Some(assignment_id);
                Some(write)
            }
        };

        let expected = ExpectedVersion::Exact(assignment.version());
        let mut updated = assignment;
        updated.apply_transition(new_status, now, actor_id, remark);

        store.commit_transition(updated.clone(), expected, stock_write)?;
        tracing::info!(
            %assignment_id,
            status = %new_status,
            ?effect,
            "assignment status changed"
        );
        Ok(updated)
    }

    /// Whether any assignment history references the person. Used to gate
    /// person removal in the directory.
    pub fn person_has_assignments(&self, person_id: PersonId) -> Result<bool, LedgerError> {
        let all = self.ledger.store().assignments()?;
        Ok(all.iter().any(|a| a.person_id() == person_id))
    }
}
