//! The department tree node and its invariant-preserving mutations.
//!
//! A [`DepartmentNode`] carries its full ancestry as a materialized path
//! plus the redundant projections derived from it (depth, parent pointer)
//! and an append-only attachment audit log. `attach` and `detach` are the
//! only mutations that touch tree structure; both re-check the node
//! invariants before returning.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::path::{DepartmentIdentifier, DepartmentPath};
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Attachment audit log
// ---------------------------------------------------------------------------

/// Audit entry marking that a child was attached to this parent.
///
/// One record per child ever attached; records are never removed or
/// overwritten, so re-attaching after a detach appends a second record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub child_id: DbId,
    pub attached_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A node in the department forest.
#[derive(Debug, Clone, Serialize)]
pub struct DepartmentNode {
    pub id: DbId,
    pub identifier: DepartmentIdentifier,
    pub name: String,
    pub path: DepartmentPath,
    pub depth: i32,
    pub parent_id: Option<DbId>,
    pub child_count: i32,
    pub attachment_history: Vec<AttachmentRecord>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl DepartmentNode {
    /// Create a root department: depth 1, path equal to its own identifier.
    pub fn new_root(
        id: DbId,
        identifier: DepartmentIdentifier,
        name: String,
        now: Timestamp,
    ) -> Self {
        let path = DepartmentPath::root(&identifier);
        Self {
            id,
            identifier,
            name,
            path,
            depth: 1,
            parent_id: None,
            child_count: 0,
            attachment_history: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// True until the node has been soft-deleted.
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Fail with `Conflict` if the node has been soft-deleted.
    ///
    /// A deleted node can neither be mutated nor deleted again.
    pub fn ensure_active(&self) -> Result<(), CoreError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Department {} is deleted and cannot be modified",
                self.id
            )))
        }
    }

    /// Transition `active -> deleted`. Total: the only other state is
    /// "already deleted", which is a `Conflict`.
    pub fn mark_deleted(&mut self, now: Timestamp) -> Result<(), CoreError> {
        self.ensure_active()?;
        self.deleted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Check the structural invariants that must hold after every mutation.
    ///
    /// 1. `path` contains `identifier` as a segment.
    /// 2. `depth` equals the 1-based index of `identifier` within `path`.
    /// 3. `parent_id` is set iff `depth > 1`.
    /// 4. `child_count >= 0`.
    pub fn invariants_hold(&self) -> Result<(), CoreError> {
        if !self.path.contains_identifier(&self.identifier) {
            return Err(CoreError::Validation(format!(
                "Department {}: path '{}' does not contain identifier '{}'",
                self.id, self.path, self.identifier
            )));
        }
        let level = self.path.depth_level(&self.identifier)?;
        if level != self.depth {
            return Err(CoreError::Validation(format!(
                "Department {}: depth {} does not match position {} of '{}' in '{}'",
                self.id, self.depth, level, self.identifier, self.path
            )));
        }
        if self.parent_id.is_some() != (self.depth > 1) {
            return Err(CoreError::Validation(format!(
                "Department {}: parent pointer inconsistent with depth {}",
                self.id, self.depth
            )));
        }
        if self.child_count < 0 {
            return Err(CoreError::Validation(format!(
                "Department {}: negative child count {}",
                self.id, self.child_count
            )));
        }
        Ok(())
    }

    /// Whether `child` is currently attached to this node.
    ///
    /// The audit log alone cannot answer this (records survive detach);
    /// current attachment is the child's parent pointer plus a log entry.
    fn is_attached(&self, child: &DepartmentNode) -> bool {
        child.parent_id == Some(self.id)
            && self
                .attachment_history
                .iter()
                .any(|r| r.child_id == child.id)
    }

    /// Attach `child` under this node.
    ///
    /// Recomputes the child's path, depth and parent pointer from this
    /// node's path, appends an [`AttachmentRecord`] and increments
    /// `child_count`. Fails with `Conflict` if the child is already
    /// attached or its identifier already occurs in this node's path
    /// (which would fold the child into its own ancestry).
    pub fn attach(
        &mut self,
        child: &mut DepartmentNode,
        now: Timestamp,
    ) -> Result<(), CoreError> {
        self.ensure_active()?;
        child.ensure_active()?;
        if self.is_attached(child) {
            return Err(CoreError::Conflict(format!(
                "Department {} is already attached to department {}",
                child.id, self.id
            )));
        }

        child.path = self.path.concat(&child.identifier)?;
        child.depth = child.path.depth();
        child.parent_id = Some(self.id);
        child.updated_at = now;
        child.invariants_hold()?;

        // The history is replaced wholesale rather than pushed in place, so
        // other loaded copies of this node never observe a half-built log.
        let mut history = Vec::with_capacity(self.attachment_history.len() + 1);
        history.extend(self.attachment_history.iter().cloned());
        history.push(AttachmentRecord {
            child_id: child.id,
            attached_at: now,
        });
        self.attachment_history = history;

        self.child_count += 1;
        self.updated_at = now;
        Ok(())
    }

    /// Detach `child` from this node, as the first half of a move.
    ///
    /// Clears the child's parent pointer; path and depth are left for the
    /// subsequent `attach` to recompute. Detaching a child that is not
    /// currently attached is a `Conflict`, never silently ignored.
    ///
    /// `child_count` is not decremented here, matching the observed
    /// reference behavior; `DepartmentRepo::recompute_child_count` is the
    /// reconciliation path.
    pub fn detach(&mut self, child: &mut DepartmentNode) -> Result<(), CoreError> {
        self.ensure_active()?;
        child.ensure_active()?;
        if !self.is_attached(child) {
            return Err(CoreError::Conflict(format!(
                "Department {} is not attached to department {}",
                child.id, self.id
            )));
        }
        child.parent_id = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn root(id: DbId, ident: &str) -> DepartmentNode {
        DepartmentNode::new_root(
            id,
            DepartmentIdentifier::new(ident).unwrap(),
            ident.to_uppercase(),
            ts(0),
        )
    }

    /// Child nodes start life as roots and get their real path on attach.
    fn child_of(parent: &mut DepartmentNode, id: DbId, ident: &str) -> DepartmentNode {
        let mut node = root(id, ident);
        parent.attach(&mut node, ts(id)).unwrap();
        node
    }

    #[test]
    fn test_new_root_shape() {
        let a = root(1, "a");
        assert_eq!(a.path.as_str(), "a");
        assert_eq!(a.depth, 1);
        assert_eq!(a.parent_id, None);
        assert_eq!(a.child_count, 0);
        a.invariants_hold().unwrap();
    }

    #[test]
    fn test_attach_computes_path_depth_parent() {
        let mut a = root(1, "a");
        let b = child_of(&mut a, 2, "b");

        assert_eq!(b.path.as_str(), "a.b");
        assert_eq!(b.depth, 2);
        assert_eq!(b.parent_id, Some(1));
        assert_eq!(a.child_count, 1);
        assert_eq!(a.attachment_history.len(), 1);
        assert_eq!(a.attachment_history[0].child_id, 2);
        a.invariants_hold().unwrap();
        b.invariants_hold().unwrap();
    }

    #[test]
    fn test_attach_builds_deep_chain() {
        let mut a = root(1, "a");
        let _b = child_of(&mut a, 2, "b");
        let mut c = child_of(&mut a, 3, "c");
        let mut d = child_of(&mut c, 4, "d");
        let e = child_of(&mut d, 5, "e");

        assert_eq!(c.path.as_str(), "a.c");
        assert_eq!(d.path.as_str(), "a.c.d");
        assert_eq!(e.path.as_str(), "a.c.d.e");
        assert_eq!(e.depth, 4);
        assert_eq!(a.child_count, 2);
    }

    #[test]
    fn test_duplicate_attach_is_conflict_and_leaves_first_intact() {
        let mut a = root(1, "a");
        let mut b = child_of(&mut a, 2, "b");

        let before_history = a.attachment_history.clone();
        assert_matches!(a.attach(&mut b, ts(99)), Err(CoreError::Conflict(_)));
        assert_eq!(a.attachment_history, before_history);
        assert_eq!(a.child_count, 1);
        assert_eq!(b.path.as_str(), "a.b");
    }

    #[test]
    fn test_attach_rejects_identifier_already_in_parent_path() {
        let mut a = root(1, "a");
        let mut clone_of_a = root(2, "a");
        assert_matches!(a.attach(&mut clone_of_a, ts(1)), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn test_detach_clears_parent_pointer_only() {
        let mut a = root(1, "a");
        let mut b = child_of(&mut a, 2, "b");

        a.detach(&mut b).unwrap();
        assert_eq!(b.parent_id, None);
        // Count is intentionally left as-is.
        assert_eq!(a.child_count, 1);
        assert_eq!(a.attachment_history.len(), 1);
    }

    #[test]
    fn test_child_count_drifts_from_live_children_after_detach() {
        let mut a = root(1, "a");
        let mut b = child_of(&mut a, 2, "b");
        let c = child_of(&mut a, 3, "c");

        a.detach(&mut b).unwrap();

        // The stored count keeps counting b; only the parent pointers say
        // who is still attached. Reconciliation must recount from those
        // pointers, not from the audit log.
        let live = [&b, &c]
            .iter()
            .filter(|n| n.parent_id == Some(a.id))
            .count() as i32;
        assert_eq!(a.child_count, 2);
        assert_eq!(live, 1);
        assert_eq!(a.attachment_history.len() as i32, a.child_count);
        assert_ne!(a.child_count, live);
    }

    #[test]
    fn test_double_detach_is_conflict() {
        let mut a = root(1, "a");
        let mut b = child_of(&mut a, 2, "b");

        a.detach(&mut b).unwrap();
        assert_matches!(a.detach(&mut b), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn test_detach_of_never_attached_child_is_conflict() {
        let mut a = root(1, "a");
        let mut stranger = root(9, "z");
        assert_matches!(a.detach(&mut stranger), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn test_reattach_appends_new_record() {
        let mut a = root(1, "a");
        let mut b = child_of(&mut a, 2, "b");

        a.detach(&mut b).unwrap();
        a.attach(&mut b, ts(50)).unwrap();

        assert_eq!(a.attachment_history.len(), 2);
        assert_eq!(a.attachment_history[0].child_id, 2);
        assert_eq!(a.attachment_history[1].child_id, 2);
        assert_ne!(
            a.attachment_history[0].attached_at,
            a.attachment_history[1].attached_at
        );
        assert_eq!(b.path.as_str(), "a.b");
    }

    #[test]
    fn test_mark_deleted_twice_is_conflict() {
        let mut a = root(1, "a");
        a.mark_deleted(ts(1)).unwrap();
        assert_eq!(a.deleted_at, Some(ts(1)));
        assert_matches!(a.mark_deleted(ts(2)), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn test_deleted_parent_rejects_attach_and_detach() {
        let mut a = root(1, "a");
        let mut b = child_of(&mut a, 2, "b");
        a.mark_deleted(ts(9)).unwrap();

        let mut c = root(3, "c");
        assert_matches!(a.attach(&mut c, ts(10)), Err(CoreError::Conflict(_)));
        assert_matches!(a.detach(&mut b), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn test_invariants_catch_inconsistent_depth() {
        let mut a = root(1, "a");
        a.depth = 3;
        assert_matches!(a.invariants_hold(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn test_invariants_catch_orphan_parent_pointer() {
        let mut a = root(1, "a");
        a.parent_id = Some(42);
        assert_matches!(a.invariants_hold(), Err(CoreError::Validation(_)));
    }
}
