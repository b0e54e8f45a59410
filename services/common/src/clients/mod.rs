//! Upstream quote clients

pub mod dhan_client;

pub use dhan_client::{DhanConfig, DhanQuoteClient};

use anyhow::Result;

/// Blocking last-traded-price lookup.
///
/// Calls may be slow and may fail. Callers are expected to run them on a
/// blocking worker, never on an async executor thread.
pub trait QuoteClient: Send + Sync {
    /// Latest price for an upper-cased symbol. `Ok(None)` when the upstream
    /// has no quote; non-positive values are passed through unfiltered.
    fn latest_price(&self, symbol: &str) -> Result<Option<f64>>;
}
