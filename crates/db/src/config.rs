//! Database configuration loaded from environment variables.

/// Pool and transaction settings.
///
/// All fields have defaults suitable for local development. In production,
/// override via environment variables.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Maximum pool connections (default: `5`).
    pub max_connections: u32,
    /// Pool acquire timeout in seconds (default: `5`).
    pub acquire_timeout_secs: u64,
    /// Per-transaction `lock_timeout` in milliseconds (default: `5000`).
    ///
    /// Bounds how long a move waits for a contended subtree; expiry
    /// surfaces as a retryable [`StoreError::LockTimeout`](crate::StoreError).
    pub lock_timeout_ms: u64,
    /// Per-transaction `statement_timeout` in milliseconds (default: `30000`).
    pub statement_timeout_ms: u64,
}

impl DbConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default |
    /// |-------------------------|---------|
    /// | `DB_MAX_CONNECTIONS`    | `5`     |
    /// | `DB_ACQUIRE_TIMEOUT_SECS` | `5`   |
    /// | `DB_LOCK_TIMEOUT_MS`    | `5000`  |
    /// | `DB_STATEMENT_TIMEOUT_MS` | `30000` |
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let max_connections: u32 = std::env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("DB_MAX_CONNECTIONS must be a valid u32");

        let acquire_timeout_secs: u64 = std::env::var("DB_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("DB_ACQUIRE_TIMEOUT_SECS must be a valid u64");

        let lock_timeout_ms: u64 = std::env::var("DB_LOCK_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .expect("DB_LOCK_TIMEOUT_MS must be a valid u64");

        let statement_timeout_ms: u64 = std::env::var("DB_STATEMENT_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".into())
            .parse()
            .expect("DB_STATEMENT_TIMEOUT_MS must be a valid u64");

        Self {
            max_connections,
            acquire_timeout_secs,
            lock_timeout_ms,
            statement_timeout_ms,
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout_secs: 5,
            lock_timeout_ms: 5_000,
            statement_timeout_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let cfg = DbConfig::default();
        assert_eq!(cfg.max_connections, 5);
        assert_eq!(cfg.lock_timeout_ms, 5_000);
        assert_eq!(cfg.statement_timeout_ms, 30_000);
    }
}
