//! Pure domain logic for the organizational directory.
//!
//! Departments form a forest stored as materialized paths. This crate owns
//! the path algebra, the tree-node entity with its invariant-preserving
//! attach/detach mutations, and the move state machine. It performs no I/O;
//! persistence and row locking live in `orgdir-db`.

pub mod department;
pub mod error;
pub mod movement;
pub mod path;
pub mod types;
