//! Store-level error taxonomy.
//!
//! Domain conditions travel as [`CoreError`]; storage faults are wrapped
//! here. Lock-wait expiry is classified into its own retryable variant:
//! it signals contention, not an invariant violation.

use orgdir_core::error::CoreError;

/// PostgreSQL `lock_not_available` (raised by `lock_timeout`).
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";
/// PostgreSQL `query_canceled` (raised by `statement_timeout`).
const PG_QUERY_CANCELED: &str = "57014";
/// PostgreSQL `unique_violation`.
const PG_UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A domain-level error from `orgdir_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Lock or statement wait expired; the caller may retry.
    #[error("Lock acquisition timed out: {0}")]
    LockTimeout(String),

    /// The operation was cancelled before its transaction committed.
    #[error("Operation cancelled before commit")]
    Cancelled,

    /// An unexpected database failure; the transaction was rolled back.
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

/// Convenience type alias for store return values.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some(PG_LOCK_NOT_AVAILABLE) | Some(PG_QUERY_CANCELED) => {
                    return StoreError::LockTimeout(db_err.message().to_string());
                }
                Some(PG_UNIQUE_VIOLATION) => {
                    let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                    return StoreError::Core(CoreError::Conflict(format!(
                        "Duplicate value violates unique constraint: {constraint}"
                    )));
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

impl StoreError {
    /// Whether the caller may retry the whole operation.
    ///
    /// Contention and transient storage faults are retryable; domain
    /// conflicts and validation failures are terminal for the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::LockTimeout(_) | StoreError::Database(_))
    }
}
