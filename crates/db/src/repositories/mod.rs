//! Repository layer.
//!
//! Repositories are zero-sized structs providing async methods. Pool-scoped
//! reads and single-step writes take `&PgPool`; operations that must share
//! a move transaction take `&mut PgConnection` and are called with
//! `&mut *tx`.

pub mod department_repo;

pub use department_repo::DepartmentRepo;
