//! Error types for the market data service

use services_common::ServiceError;
use thiserror::Error;

/// Lifecycle and configuration errors
#[derive(Error, Debug)]
pub enum MdsError {
    /// Storage pool could not be opened, the service stays stopped
    #[error("Failed to initialize storage pool: {0:#}")]
    PoolInit(#[source] anyhow::Error),

    /// Storage pool could not be closed cleanly
    #[error("Failed to close storage pool: {0:#}")]
    PoolClose(#[source] anyhow::Error),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ServiceError),
}

/// Type alias for market data service results
pub type MdsResult<T> = Result<T, MdsError>;
