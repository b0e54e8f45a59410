//! Sampling and aggregation counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Service metrics, shared between the service handle and the sampling task
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    /// Completed sampling cycles, including failed ones
    pub cycles: AtomicU64,
    /// Ticks written to the store
    pub ticks_recorded: AtomicU64,
    /// Cycles where the upstream had no usable price
    pub quotes_absent: AtomicU64,
    /// Cycles that failed to fetch and backed off
    pub fetch_failures: AtomicU64,
    /// Raw tick writes that failed
    pub tick_write_failures: AtomicU64,
    /// Live candle upserts that succeeded
    pub candle_upserts: AtomicU64,
    /// Live candle upserts that failed
    pub candle_upsert_failures: AtomicU64,
    /// Buckets finalized
    pub candles_closed: AtomicU64,
}

/// Point-in-time copy of [`ServiceMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub cycles: u64,
    pub ticks_recorded: u64,
    pub quotes_absent: u64,
    pub fetch_failures: u64,
    pub tick_write_failures: u64,
    pub candle_upserts: u64,
    pub candle_upsert_failures: u64,
    pub candles_closed: u64,
}

impl ServiceMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            ticks_recorded: self.ticks_recorded.load(Ordering::Relaxed),
            quotes_absent: self.quotes_absent.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            tick_write_failures: self.tick_write_failures.load(Ordering::Relaxed),
            candle_upserts: self.candle_upserts.load(Ordering::Relaxed),
            candle_upsert_failures: self.candle_upsert_failures.load(Ordering::Relaxed),
            candles_closed: self.candles_closed.load(Ordering::Relaxed),
        }
    }
}
