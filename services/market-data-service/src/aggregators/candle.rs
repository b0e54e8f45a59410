//! Single-timeframe candle builder

use chrono::{DateTime, Utc};
use services_common::{Candle, Timeframe};
use std::fmt::Debug;
use tracing::debug;

/// Volume contributed by one tick
pub trait VolumeModel: Send + Sync + Debug {
    /// Increment added to the live candle for a tick at `price`
    fn increment(&self, price: f64) -> f64;
}

/// Every tick counts as one unit of volume
#[derive(Debug, Clone, Copy, Default)]
pub struct TickCount;

impl VolumeModel for TickCount {
    fn increment(&self, _price: f64) -> f64 {
        1.0
    }
}

/// Rolling candle for one symbol and one timeframe.
///
/// Holds the live candle of the current bucket and hands back the previous
/// bucket's candle exactly once, when the first tick of a later bucket
/// arrives. Ticks that map to an earlier bucket are dropped.
#[derive(Debug, Clone)]
pub struct CandleBuilder {
    symbol: String,
    timeframe: Timeframe,
    /// Current bucket's candle; its `open_time` is the bucket start
    live: Option<Candle>,
}

impl CandleBuilder {
    /// Create an empty builder
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            live: None,
        }
    }

    /// Symbol this builder aggregates
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Timeframe this builder aggregates
    pub const fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Start of the bucket currently being built
    pub fn bucket_start(&self) -> Option<DateTime<Utc>> {
        self.live.as_ref().map(|live| live.open_time)
    }

    /// In-progress candle, `None` before the first tick
    pub const fn live(&self) -> Option<&Candle> {
        self.live.as_ref()
    }

    /// Fold a tick in. Returns the finalized candle of the previous bucket
    /// when `ts` starts a new one.
    pub fn on_tick(&mut self, price: f64, volume: f64, ts: DateTime<Utc>) -> Option<Candle> {
        let start = self.timeframe.bucket_start(ts);

        match self.live.as_mut() {
            Some(live) if start == live.open_time => {
                live.update(price, volume);
                None
            }
            Some(live) if start < live.open_time => {
                debug!(
                    "Dropping late {} tick for {}: bucket {} is before {}",
                    self.timeframe, self.symbol, start, live.open_time
                );
                None
            }
            _ => self.live.replace(Candle::new(
                self.symbol.clone(),
                self.timeframe,
                start,
                price,
                volume,
            )),
        }
    }
}
