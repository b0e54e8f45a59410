//! Multi-timeframe candle aggregation
//!
//! [`CandleAggregator`] owns one [`CandleBuilder`] per configured timeframe
//! for every symbol it has seen. Each tick is fanned out to all builders of
//! its symbol; every live candle is upserted and every finalized candle is
//! announced on the closed-candle channel.

pub mod candle;

pub use candle::{CandleBuilder, TickCount, VolumeModel};

use crate::metrics::ServiceMetrics;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use services_common::{Candle, CandleStore, Timeframe};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Result of fanning one tick out to every timeframe
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationReport {
    /// Live candles persisted
    pub upserted: usize,
    /// Live candle upserts that failed
    pub failed: usize,
    /// Candles finalized by this tick
    pub closed: Vec<Candle>,
}

/// Symbol → timeframe candle registry.
///
/// Not shared: the sampling task owns it and calls [`update`](Self::update)
/// sequentially, so builders need no locking. Registry entries live until
/// the aggregator is dropped.
pub struct CandleAggregator {
    timeframes: Vec<Timeframe>,
    builders: FxHashMap<String, Vec<CandleBuilder>>,
    store: Arc<dyn CandleStore>,
    volume: Arc<dyn VolumeModel>,
    closed_tx: broadcast::Sender<Candle>,
    metrics: Arc<ServiceMetrics>,
}

impl std::fmt::Debug for CandleAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleAggregator")
            .field("timeframes", &self.timeframes)
            .field("symbols", &self.builders.len())
            .field("volume", &self.volume)
            .finish()
    }
}

impl CandleAggregator {
    /// Create an empty registry
    pub fn new(
        timeframes: Vec<Timeframe>,
        store: Arc<dyn CandleStore>,
        closed_tx: broadcast::Sender<Candle>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            timeframes,
            builders: FxHashMap::default(),
            store,
            volume: Arc::new(TickCount),
            closed_tx,
            metrics,
        }
    }

    /// Replace the per-tick volume model
    #[must_use]
    pub fn with_volume_model(mut self, volume: Arc<dyn VolumeModel>) -> Self {
        self.volume = volume;
        self
    }

    /// Configured timeframes
    pub fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    /// Symbols with registered builders
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }

    /// Current live candle for `symbol` / `timeframe`
    pub fn live_candle(&self, symbol: &str, timeframe: Timeframe) -> Option<&Candle> {
        self.builders
            .get(symbol)?
            .iter()
            .find(|b| b.timeframe() == timeframe)?
            .live()
    }

    /// Fan a tick out to every timeframe of `symbol`.
    ///
    /// Storage failures are logged per timeframe and never stop the
    /// remaining timeframes from being updated and persisted.
    pub async fn update(&mut self, symbol: &str, price: f64, ts: DateTime<Utc>) -> AggregationReport {
        let increment = self.volume.increment(price);
        let timeframes = &self.timeframes;
        let builders = self.builders.entry(symbol.to_string()).or_insert_with(|| {
            info!("Registering {} candle timeframes for {}", timeframes.len(), symbol);
            timeframes
                .iter()
                .map(|tf| CandleBuilder::new(symbol, *tf))
                .collect()
        });

        let mut report = AggregationReport::default();

        for builder in builders.iter_mut() {
            let closed = builder.on_tick(price, increment, ts);

            if let Some(live) = builder.live() {
                match self.store.upsert_candle(live).await {
                    Ok(()) => {
                        report.upserted += 1;
                        ServiceMetrics::incr(&self.metrics.candle_upserts);
                    }
                    Err(e) => {
                        report.failed += 1;
                        ServiceMetrics::incr(&self.metrics.candle_upsert_failures);
                        warn!(
                            "Candle upsert failed for {}/{} @ {}: {:#}",
                            symbol, live.timeframe, live.open_time, e
                        );
                    }
                }
            }

            if let Some(closed) = closed {
                info!(
                    "Candle closed {}/{} O={} H={} L={} C={} V={}",
                    closed.symbol,
                    closed.timeframe,
                    closed.open,
                    closed.high,
                    closed.low,
                    closed.close,
                    closed.volume
                );
                ServiceMetrics::incr(&self.metrics.candles_closed);
                if self.closed_tx.send(closed.clone()).is_err() {
                    debug!("No closed-candle subscribers");
                }
                report.closed.push(closed);
            }
        }

        report
    }
}
