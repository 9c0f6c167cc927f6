//! Move orchestration: one department subtree relocated per transaction.
//!
//! The engine holds no locks of its own; every move runs inside a single
//! database transaction that row-locks both subtrees before anything is
//! read or decided. All locks are taken by one id-ordered statement, so
//! two moves touching overlapping subtrees queue on the lowest contended
//! row rather than deadlocking; disjoint moves proceed fully
//! concurrently. Dropping the returned future, or triggering the
//! cancellation token, rolls the whole transaction back - a half-applied
//! detach is never observable.

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use orgdir_core::department::DepartmentNode;
use orgdir_core::error::CoreError;
use orgdir_core::movement::{MovementApproval, MovementPlan};
use orgdir_core::path::DepartmentPath;
use orgdir_core::types::DbId;

use crate::config::DbConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::department::MoveDepartment;
use crate::repositories::DepartmentRepo;

/// Result of a committed move.
#[derive(Debug, Serialize)]
pub struct MoveOutcome {
    pub subject: DepartmentNode,
    pub destination: DepartmentNode,
    pub descendants_rewritten: u64,
}

/// Executes department moves against the store.
pub struct MovementService {
    pool: PgPool,
    config: DbConfig,
}

impl MovementService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            config: DbConfig::default(),
        }
    }

    pub fn with_config(pool: PgPool, config: DbConfig) -> Self {
        Self { pool, config }
    }

    /// Move the subject department (and its whole subtree) under the
    /// requested destination department.
    ///
    /// Runs steps lock, resolve, approve, detach/attach, persist, rewrite
    /// and commit as one atomic unit. Returns `Conflict` for cycles,
    /// duplicate attachments and deleted nodes, `NotFound` for missing
    /// participants, and a retryable `LockTimeout` when subtree locks
    /// cannot be acquired within the configured window.
    pub async fn move_department(
        &self,
        cancel: &CancellationToken,
        subject_id: DbId,
        request: &MoveDepartment,
    ) -> StoreResult<MoveOutcome> {
        let destination_id = request.destination_id;
        let mut tx = self.pool.begin().await?;

        // Bound lock waits so contention surfaces as a retryable failure
        // instead of an indefinite stall. SET LOCAL scopes both settings
        // to this transaction.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.config.lock_timeout_ms
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = '{}ms'",
            self.config.statement_timeout_ms
        ))
        .execute(&mut *tx)
        .await?;

        // Lock both subtrees first, in one id-ordered statement, before
        // any participant row is read. Every lock this move ever takes
        // is acquired here or covered by it.
        let locked =
            DepartmentRepo::lock_subtrees(&mut *tx, &[subject_id, destination_id]).await?;
        tracing::debug!(subject_id, destination_id, locked_rows = locked, "Subtrees locked");

        // Resolve both participants; soft-deleted rows read as missing.
        // Their rows are already locked above, so these reads settle
        // instantly and observe post-lock state.
        let destination_row = DepartmentRepo::find_active_for_update(&mut *tx, destination_id)
            .await?
            .ok_or_else(|| StoreError::Core(CoreError::not_found("Department", destination_id)))?;
        let subject_row = DepartmentRepo::find_active_for_update(&mut *tx, subject_id)
            .await?
            .ok_or_else(|| StoreError::Core(CoreError::not_found("Department", subject_id)))?;

        let destination = DepartmentNode::try_from(destination_row).map_err(StoreError::Core)?;
        let subject = DepartmentNode::try_from(subject_row).map_err(StoreError::Core)?;

        // The subject's current parent, found by walking its path one
        // level up. A subject with no resolvable parent cannot be moved.
        let parent_level = subject.depth - 1;
        let old_parent_row =
            DepartmentRepo::find_ancestor_at_level(&mut *tx, &subject.path, parent_level)
                .await?
                .ok_or_else(|| {
                    StoreError::Core(CoreError::NotFound {
                        entity: "Parent department",
                        key: format!("of department {subject_id} at level {parent_level}"),
                    })
                })?;
        let mut old_parent = DepartmentNode::try_from(old_parent_row).map_err(StoreError::Core)?;

        let destination_inside_subject =
            DepartmentRepo::is_ancestor_or_self(&mut *tx, &subject.path, &destination.path).await?;
        let approval =
            MovementApproval::new(destination.id, subject.id, destination_inside_subject);

        if cancel.is_cancelled() {
            tx.rollback().await?;
            return Err(StoreError::Cancelled);
        }

        let mut plan = MovementPlan::new(destination, subject);
        let now = Utc::now();
        if let Err(err) = plan.apply(&approval, &mut old_parent, now) {
            tx.rollback().await?;
            tracing::debug!(
                subject_id,
                destination_id,
                state = ?plan.state(),
                error = %err,
                "Move not applied"
            );
            return Err(StoreError::Core(err));
        }

        let old_path: DepartmentPath = plan
            .prior_subject_path()
            .cloned()
            .ok_or_else(|| {
                StoreError::Core(CoreError::Internal(
                    "applied move plan is missing its prior subject path".to_string(),
                ))
            })?;

        // Persist the two mutated nodes, then re-root the descendants in
        // one set-based rewrite, all inside the same transaction and all
        // stamped with the same `now`.
        DepartmentRepo::persist_node_changes(&mut *tx, &[&plan.destination, &plan.subject]).await?;

        let depth_delta = plan.subject.depth - old_path.depth();
        let rewritten = DepartmentRepo::rewrite_descendant_paths(
            &mut *tx,
            &old_path,
            &plan.subject.path,
            depth_delta,
            plan.subject.id,
            now,
        )
        .await?;

        if cancel.is_cancelled() {
            tx.rollback().await?;
            return Err(StoreError::Cancelled);
        }

        tx.commit().await?;
        plan.mark_committed().map_err(StoreError::Core)?;

        tracing::info!(
            subject_id,
            destination_id,
            old_path = %old_path,
            new_path = %plan.subject.path,
            depth_delta,
            descendants_rewritten = rewritten,
            "Department moved"
        );

        Ok(MoveOutcome {
            subject: plan.subject,
            destination: plan.destination,
            descendants_rewritten: rewritten,
        })
    }
}
