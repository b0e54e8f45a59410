//! Resilient sampling loop
//!
//! One task polls the quote source, appends each usable price as a raw
//! tick and feeds it to the candle aggregator. Fetch failures back off
//! exponentially; storage failures are logged and absorbed. Cancellation
//! is observed while fetching and while sleeping and is never treated as
//! a failure.

use crate::aggregators::CandleAggregator;
use crate::metrics::ServiceMetrics;
use crate::source::SampleSource;
use services_common::{CandleStore, Clock, Quote, SystemClock, Tick};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Exponential backoff: after `n` consecutive failures the delay is
/// `min(max, base * 2^(n-1))`. [`reset`](Self::reset) on success.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    /// Create new backoff with no recorded failures
    #[must_use]
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: 0,
        }
    }

    /// Consecutive failures so far
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure and return how long to wait
    pub fn on_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let exponent = (self.failures - 1).min(31);
        self.base.saturating_mul(1_u32 << exponent).min(self.max)
    }

    /// Forget previous failures
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

/// Resolves once shutdown is requested or the sender is gone
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Sampling loop state, moved into the background task by the service
pub struct SamplingLoop {
    source: SampleSource,
    store: Arc<dyn CandleStore>,
    aggregator: CandleAggregator,
    symbol_rx: watch::Receiver<String>,
    poll_interval: Duration,
    backoff: Backoff,
    clock: Arc<dyn Clock>,
    metrics: Arc<ServiceMetrics>,
}

impl std::fmt::Debug for SamplingLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplingLoop")
            .field("source", &self.source)
            .field("aggregator", &self.aggregator)
            .field("symbol", &*self.symbol_rx.borrow())
            .field("poll_interval", &self.poll_interval)
            .field("backoff", &self.backoff)
            .field("clock", &self.clock)
            .finish()
    }
}

impl SamplingLoop {
    /// Create new loop
    pub fn new(
        source: SampleSource,
        store: Arc<dyn CandleStore>,
        aggregator: CandleAggregator,
        symbol_rx: watch::Receiver<String>,
        poll_interval: Duration,
        backoff: Backoff,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            source,
            store,
            aggregator,
            symbol_rx,
            poll_interval,
            backoff,
            clock: Arc::new(SystemClock),
            metrics,
        }
    }

    /// Stamp samples with `clock` instead of the system time
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Candle registry driven by this loop
    pub const fn aggregator(&self) -> &CandleAggregator {
        &self.aggregator
    }

    /// Current backoff state
    pub const fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Run until shutdown is requested
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Sampling loop started, poll interval {:?}", self.poll_interval);

        loop {
            if *shutdown.borrow() {
                break;
            }
            let Some(delay) = self.run_cycle(&mut shutdown).await else {
                break;
            };
            tokio::select! {
                biased;
                () = cancelled(&mut shutdown) => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        info!("Sampling loop stopped");
    }

    /// One fetch → record → aggregate pass. Returns the delay before the
    /// next cycle, or `None` if shutdown arrived mid-fetch.
    pub async fn run_cycle(&mut self, shutdown: &mut watch::Receiver<bool>) -> Option<Duration> {
        let symbol = self.symbol_rx.borrow_and_update().clone();
        let observed_at = self.clock.now();

        let fetched = tokio::select! {
            biased;
            () = cancelled(shutdown) => return None,
            fetched = self.source.fetch(&symbol) => fetched,
        };
        ServiceMetrics::incr(&self.metrics.cycles);

        match fetched {
            Ok(quote) => {
                self.backoff.reset();
                match quote {
                    Quote::Price(price) => self.record(Tick::new(symbol, price, observed_at)).await,
                    Quote::Absent => {
                        ServiceMetrics::incr(&self.metrics.quotes_absent);
                        debug!("No quote for {} this cycle", symbol);
                    }
                }
                Some(self.poll_interval)
            }
            Err(e) => {
                ServiceMetrics::incr(&self.metrics.fetch_failures);
                let delay = self.backoff.on_failure();
                error!(
                    "Sampling cycle for {} failed ({} in a row): {:#}; backing off {:?}",
                    symbol,
                    self.backoff.failures(),
                    e,
                    delay
                );
                Some(delay)
            }
        }
    }

    async fn record(&mut self, tick: Tick) {
        match self.store.insert_tick(&tick).await {
            Ok(()) => ServiceMetrics::incr(&self.metrics.ticks_recorded),
            Err(e) => {
                ServiceMetrics::incr(&self.metrics.tick_write_failures);
                warn!("Tick insert failed for {}: {:#}", tick.symbol, e);
            }
        }

        let report = self.aggregator.update(&tick.symbol, tick.price, tick.ts).await;
        if report.failed > 0 {
            debug!(
                "{} of {} candle upserts failed for {}",
                report.failed,
                report.failed + report.upserted,
                tick.symbol
            );
        }
    }
}
