//! Environment-backed configuration helpers
//!
//! Every loader takes a lookup function instead of reading the process
//! environment directly, so configuration can be built from a map in tests.

use crate::constants::storage::{
    DEFAULT_ACQUIRE_TIMEOUT_SECS, DEFAULT_MAX_CONNECTIONS, DEFAULT_PG_PORT,
};
use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// Read a variable from the process environment
#[must_use]
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Trimmed value of `key`, `None` when unset or blank
pub fn non_empty<L>(lookup: &L, key: &str) -> Option<String>
where
    L: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `key`, falling back to `default` when unset. A value that is set
/// but does not parse is an error, never silently replaced.
pub fn parse_or<L, T>(lookup: &L, key: &str, default: T) -> Result<T, ServiceError>
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match non_empty(lookup, key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| ServiceError::InvalidConfig(format!("Invalid {key} '{raw}': {e}"))),
        None => Ok(default),
    }
}

/// Value of a variable that must be set
pub fn required<L>(lookup: &L, key: &str) -> Result<String, ServiceError>
where
    L: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key).ok_or_else(|| ServiceError::InvalidConfig(format!("{key} not set")))
}

/// Tick/candle database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL
    pub url: String,
    /// Maximum pooled connections
    pub max_connections: u32,
    /// Connection acquire timeout
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    /// Create config for `url` with default pool settings
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }

    /// Load from the process environment
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(env_lookup)
    }

    /// Load from `DATABASE_URL`, or assemble the URL from
    /// `PGHOST`, `PGPORT`, `PGDATABASE`, `PGUSER` and `PGPASSWORD`.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ServiceError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let url = match non_empty(&lookup, "DATABASE_URL") {
            Some(url) => url,
            None => {
                let host = required(&lookup, "PGHOST")?;
                let port: u16 = parse_or(&lookup, "PGPORT", DEFAULT_PG_PORT)?;
                let database = required(&lookup, "PGDATABASE")?;
                let user = required(&lookup, "PGUSER")?;
                let password = required(&lookup, "PGPASSWORD")?;
                format!("postgres://{user}:{password}@{host}:{port}/{database}")
            }
        };

        let max_connections = parse_or(&lookup, "MDS_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(ServiceError::InvalidConfig(
                "MDS_DB_MAX_CONNECTIONS must be positive".to_string(),
            ));
        }

        Ok(Self {
            url,
            max_connections,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        })
    }
}
