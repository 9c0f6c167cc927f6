//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` create/move DTOs for writes
//! - Conversions between the row struct and the core domain entity

pub mod department;
