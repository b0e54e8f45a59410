//! Tick and candle persistence contract

use crate::types::{Candle, Tick};
use anyhow::Result;
use async_trait::async_trait;

/// Durable store for raw ticks and candles.
///
/// Implementations own their connection pool. `init_pool` and `close_pool`
/// are idempotent, and writes issued while no pool is open fail rather
/// than reconnecting on their own.
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Open the connection pool
    async fn init_pool(&self) -> Result<()>;

    /// Close the connection pool
    async fn close_pool(&self) -> Result<()>;

    /// Append a raw tick
    async fn insert_tick(&self, tick: &Tick) -> Result<()>;

    /// Insert or fully overwrite the candle keyed by
    /// `(symbol, timeframe, open_time)`. Last write wins, no merging.
    async fn upsert_candle(&self, candle: &Candle) -> Result<()>;
}
