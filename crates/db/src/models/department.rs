//! Department models and DTOs.
//!
//! `DepartmentRow` mirrors the `departments` table; the attachment audit
//! log is a JSONB column deserialized straight into the core record type.
//! Converting a row into a [`DepartmentNode`] re-validates identifier and
//! path, so malformed stored values surface as `Validation` errors at the
//! boundary instead of corrupting the engine.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use orgdir_core::department::{AttachmentRecord, DepartmentNode};
use orgdir_core::error::CoreError;
use orgdir_core::path::{DepartmentIdentifier, DepartmentPath};
use orgdir_core::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A department row from the `departments` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DepartmentRow {
    pub id: DbId,
    pub identifier: String,
    pub name: String,
    pub path: String,
    pub depth: i32,
    pub parent_id: Option<DbId>,
    pub child_count: i32,
    pub attachment_history: Json<Vec<AttachmentRecord>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl TryFrom<DepartmentRow> for DepartmentNode {
    type Error = CoreError;

    fn try_from(row: DepartmentRow) -> Result<Self, Self::Error> {
        Ok(DepartmentNode {
            id: row.id,
            identifier: DepartmentIdentifier::new(&row.identifier)?,
            name: row.name,
            path: DepartmentPath::parse(&row.path)?,
            depth: row.depth,
            parent_id: row.parent_id,
            child_count: row.child_count,
            attachment_history: row.attachment_history.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Create DTO
// ---------------------------------------------------------------------------

/// Input for creating a department, root or child.
#[derive(Debug, Deserialize)]
pub struct CreateDepartment {
    pub identifier: String,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Move DTO
// ---------------------------------------------------------------------------

/// Request body for moving a department subtree.
#[derive(Debug, Deserialize)]
pub struct MoveDepartment {
    pub destination_id: DbId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn row(identifier: &str, path: &str, depth: i32, parent_id: Option<DbId>) -> DepartmentRow {
        let now = Utc::now();
        DepartmentRow {
            id: 7,
            identifier: identifier.to_string(),
            name: "Dept".to_string(),
            path: path.to_string(),
            depth,
            parent_id,
            child_count: 0,
            attachment_history: Json(Vec::new()),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_row_converts_to_node() {
        let node = DepartmentNode::try_from(row("d", "a.c.d", 3, Some(3))).unwrap();
        assert_eq!(node.path.as_str(), "a.c.d");
        assert_eq!(node.depth, 3);
        node.invariants_hold().unwrap();
    }

    #[test]
    fn test_malformed_stored_path_is_validation_error() {
        assert_matches!(
            DepartmentNode::try_from(row("d", "a..d", 3, Some(3))),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn test_history_column_serializes_as_plain_array() {
        let mut r = row("d", "a.c.d", 3, Some(3));
        r.attachment_history = Json(vec![AttachmentRecord {
            child_id: 9,
            attached_at: Utc::now(),
        }]);
        let value = serde_json::to_value(&r).unwrap();
        assert_eq!(value["attachment_history"][0]["child_id"], 9);
    }

    #[test]
    fn test_malformed_stored_identifier_is_validation_error() {
        assert_matches!(
            DepartmentNode::try_from(row("d3", "a.c.d", 3, Some(3))),
            Err(CoreError::Validation(_))
        );
    }
}
