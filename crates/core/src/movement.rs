//! Subtree relocation: the approval gate and the move state machine.
//!
//! A move is detach-then-attach executed under a [`MovementApproval`], a
//! single-use proof that the destination does not sit inside the subject's
//! own subtree. The approval's boolean comes from the storage layer's
//! path-containment predicate; the core never walks the tree itself.

use serde::Serialize;

use crate::department::DepartmentNode;
use crate::error::CoreError;
use crate::path::DepartmentPath;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Approval
// ---------------------------------------------------------------------------

/// Proof object certifying that one specific destination/subject pair may
/// be combined without creating a cycle.
///
/// `destination_inside_subject` is the externally computed predicate
/// "subject path is an ancestor of (or equal to) destination path". When
/// true, the move would fold the subject into its own subtree and must be
/// rejected.
#[derive(Debug, Clone)]
pub struct MovementApproval {
    destination_id: DbId,
    subject_id: DbId,
    destination_inside_subject: bool,
}

impl MovementApproval {
    pub fn new(destination_id: DbId, subject_id: DbId, destination_inside_subject: bool) -> Self {
        Self {
            destination_id,
            subject_id,
            destination_inside_subject,
        }
    }

    /// Check this approval against a plan. Three ordered checks, each a
    /// distinct `Conflict`: destination identity, subject identity, cycle.
    pub fn approve(&self, plan: &MovementPlan) -> Result<(), CoreError> {
        if self.destination_id != plan.destination.id {
            return Err(CoreError::Conflict(format!(
                "Approval was issued for destination {}, plan targets {}",
                self.destination_id, plan.destination.id
            )));
        }
        if self.subject_id != plan.subject.id {
            return Err(CoreError::Conflict(format!(
                "Approval was issued for subject {}, plan moves {}",
                self.subject_id, plan.subject.id
            )));
        }
        if self.destination_inside_subject {
            return Err(CoreError::Conflict(format!(
                "Cannot move department {} under department {}: destination is inside the subject's subtree",
                self.subject_id, self.destination_id
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Lifecycle of a single move operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MoveState {
    /// Plan created, nothing checked or mutated.
    Requested,
    /// Approval gate passed.
    Approved,
    /// Subject detached from its old parent.
    Detached,
    /// Subject attached under the destination.
    Attached,
    /// Storage transaction committed.
    Committed,
    /// Approval gate failed; no mutation occurred.
    Rejected,
    /// Detach or attach failed; the owning transaction must roll back.
    Failed,
}

/// Transient aggregate pairing a destination and a subject for one move.
///
/// Exists only for the duration of the operation; it is never persisted.
/// After a successful [`apply`](MovementPlan::apply) the caller persists
/// `destination` and `subject` and rewrites descendant paths using
/// [`prior_subject_path`](MovementPlan::prior_subject_path).
#[derive(Debug)]
pub struct MovementPlan {
    pub destination: DepartmentNode,
    pub subject: DepartmentNode,
    state: MoveState,
    prior_subject_path: Option<DepartmentPath>,
}

impl MovementPlan {
    pub fn new(destination: DepartmentNode, subject: DepartmentNode) -> Self {
        Self {
            destination,
            subject,
            state: MoveState::Requested,
            prior_subject_path: None,
        }
    }

    pub fn state(&self) -> MoveState {
        self.state
    }

    /// The subject's path before the move; `Some` once the plan reached
    /// `Attached`. This is the `old_path` of the bulk descendant rewrite.
    pub fn prior_subject_path(&self) -> Option<&DepartmentPath> {
        self.prior_subject_path.as_ref()
    }

    /// Execute detach-then-attach under the given approval.
    ///
    /// On a rejected approval the plan ends `Rejected` with no mutation.
    /// A failure after the gate leaves the plan `Failed` with the subject
    /// possibly half-moved in memory; the owning storage transaction must
    /// roll back so that state is never observable.
    pub fn apply(
        &mut self,
        approval: &MovementApproval,
        old_parent: &mut DepartmentNode,
        now: Timestamp,
    ) -> Result<(), CoreError> {
        if self.state != MoveState::Requested {
            return Err(CoreError::Conflict(format!(
                "Move plan for department {} has already been applied",
                self.subject.id
            )));
        }

        if let Err(err) = approval.approve(self) {
            self.state = MoveState::Rejected;
            return Err(err);
        }
        self.state = MoveState::Approved;

        let prior_path = self.subject.path.clone();

        if let Err(err) = old_parent.detach(&mut self.subject) {
            self.state = MoveState::Failed;
            return Err(err);
        }
        self.state = MoveState::Detached;

        if let Err(err) = self.destination.attach(&mut self.subject, now) {
            self.state = MoveState::Failed;
            return Err(err);
        }
        self.state = MoveState::Attached;
        self.prior_subject_path = Some(prior_path);
        Ok(())
    }

    /// Record that the storage transaction committed.
    pub fn mark_committed(&mut self) -> Result<(), CoreError> {
        if self.state != MoveState::Attached {
            return Err(CoreError::Conflict(format!(
                "Move plan for department {} cannot commit from state {:?}",
                self.subject.id, self.state
            )));
        }
        self.state = MoveState::Committed;
        Ok(())
    }
}
