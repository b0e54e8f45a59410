//! Shared types, capability traits and configuration for market data services
//!
//! Everything the sampling service consumes from the outside world is
//! described here: the blocking quote client, the tick/candle store, the
//! candle data model, the sample clock and the environment configuration helpers.

pub mod clients;
pub mod clock;
pub mod config;
pub mod constants;
pub mod errors;
pub mod storage;
pub mod types;

pub use clients::*;
pub use clock::*;
pub use config::*;
pub use errors::*;
pub use storage::*;
pub use types::*;
