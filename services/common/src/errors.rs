//! Common error types for services

use thiserror::Error;

/// Service error types
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Connection failed error
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Service unavailable error
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Upstream answered with something we could not interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Symbol has no upstream instrument mapping
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Storage used before `init_pool` or after `close_pool`
    #[error("Storage pool not initialized")]
    PoolNotInitialized,

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Rate limited error
    #[error("Rate limited: {0}")]
    RateLimited(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout(err.to_string());
        }
        if err.is_connect() {
            return Self::ConnectionFailed(err.to_string());
        }
        if err.is_decode() {
            return Self::InvalidResponse(err.to_string());
        }
        match err.status() {
            Some(status) if status.as_u16() == 429 => Self::RateLimited(err.to_string()),
            _ => Self::ServiceUnavailable(err.to_string()),
        }
    }
}
