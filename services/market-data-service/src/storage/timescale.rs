//! TimescaleDB persistence for ticks and candles
//!
//! Expects existing tables:
//! - `ticks(time timestamptz, symbol text, ltp double precision)`
//! - `candles(time timestamptz, symbol text, timeframe_seconds integer,
//!   open, high, low, close, volume double precision)` with a unique key on
//!   `(symbol, timeframe_seconds, time)`

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use services_common::{Candle, CandleStore, DatabaseConfig, ServiceError, Tick};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

/// Postgres/TimescaleDB backed [`CandleStore`]
#[derive(Debug)]
pub struct TimescaleStore {
    config: DatabaseConfig,
    pool: RwLock<Option<PgPool>>,
}

impl TimescaleStore {
    /// Create store, no connection is opened until [`CandleStore::init_pool`]
    #[must_use]
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
        }
    }

    /// Whether the pool is open
    pub fn is_connected(&self) -> bool {
        self.pool.read().is_some()
    }

    fn pool(&self) -> Result<PgPool> {
        self.pool
            .read()
            .clone()
            .ok_or_else(|| ServiceError::PoolNotInitialized.into())
    }
}

#[async_trait]
impl CandleStore for TimescaleStore {
    async fn init_pool(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let pool = PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(self.config.acquire_timeout)
            .connect(&self.config.url)
            .await
            .context("Failed to connect to tick database")?;

        self.pool.write().get_or_insert(pool);
        info!(
            "Connected to tick database (max {} connections)",
            self.config.max_connections
        );
        Ok(())
    }

    async fn close_pool(&self) -> Result<()> {
        let pool = self.pool.write().take();
        if let Some(pool) = pool {
            pool.close().await;
            info!("Tick database pool closed");
        }
        Ok(())
    }

    async fn insert_tick(&self, tick: &Tick) -> Result<()> {
        let pool = self.pool()?;
        sqlx::query("INSERT INTO ticks (time, symbol, ltp) VALUES ($1, $2, $3)")
            .bind(tick.ts)
            .bind(&tick.symbol)
            .bind(tick.price)
            .execute(&pool)
            .await
            .with_context(|| format!("insert tick {} @ {}", tick.symbol, tick.ts))?;
        Ok(())
    }

    async fn upsert_candle(&self, candle: &Candle) -> Result<()> {
        let pool = self.pool()?;
        let timeframe_seconds = i32::try_from(candle.timeframe.seconds())
            .context("timeframe does not fit an integer column")?;

        sqlx::query(
            r"
            INSERT INTO candles (
                time, symbol, timeframe_seconds, open, high, low, close, volume
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8
            )
            ON CONFLICT (symbol, timeframe_seconds, time) DO UPDATE SET
                open = EXCLUDED.open,
                high = EXCLUDED.high,
                low = EXCLUDED.low,
                close = EXCLUDED.close,
                volume = EXCLUDED.volume
            ",
        )
        .bind(candle.open_time)
        .bind(&candle.symbol)
        .bind(timeframe_seconds)
        .bind(candle.open)
        .bind(candle.high)
        .bind(candle.low)
        .bind(candle.close)
        .bind(candle.volume)
        .execute(&pool)
        .await
        .with_context(|| {
            format!(
                "upsert candle {}/{} @ {}",
                candle.symbol, candle.timeframe, candle.open_time
            )
        })?;

        debug!(
            "Candle {}/{} @ {} persisted",
            candle.symbol, candle.timeframe, candle.open_time
        );
        Ok(())
    }
}
