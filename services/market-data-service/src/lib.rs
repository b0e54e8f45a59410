//! Market Data Service
//!
//! Samples the last traded price of one index, stores every sample as a
//! raw tick and keeps live OHLC candles for several timeframes:
//! - Raw ticks appended on every successful fetch
//! - Live candles upserted on every tick, per timeframe
//! - Closed candles announced once, when the next bucket starts
//! - Exponential backoff on upstream failures, clean cancellation on stop

pub mod aggregators;
pub mod config;
pub mod error;
pub mod metrics;
pub mod sampler;
pub mod source;
pub mod storage;

pub use aggregators::{AggregationReport, CandleAggregator, CandleBuilder, TickCount, VolumeModel};
pub use config::MarketDataConfig;
pub use error::{MdsError, MdsResult};
pub use metrics::{MetricsSnapshot, ServiceMetrics};
pub use sampler::{Backoff, SamplingLoop};
pub use source::SampleSource;
pub use storage::TimescaleStore;

use parking_lot::RwLock;
use services_common::constants::instruments::CLOSED_CANDLE_CHANNEL_SIZE;
use services_common::{
    Candle, CandleStore, Clock, QuoteClient, ServiceError, SystemClock, normalize_symbol,
};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Service lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Not sampling, no pool
    Stopped,
    /// Opening the storage pool
    Starting,
    /// Sampling task running
    Running,
    /// Cancelling the sampling task and closing the pool
    Stopping,
}

/// Handle to the spawned sampling task
struct RunningLoop {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Sampling service: owns the storage pool lifecycle and the background
/// sampling task.
pub struct MarketDataService {
    config: MarketDataConfig,
    client: Arc<dyn QuoteClient>,
    store: Arc<dyn CandleStore>,
    volume: Arc<dyn VolumeModel>,
    clock: Arc<dyn Clock>,
    state: RwLock<ServiceState>,
    /// Serializes start/stop; `Some` while the task is alive
    runner: Mutex<Option<RunningLoop>>,
    symbol_tx: watch::Sender<String>,
    closed_tx: broadcast::Sender<Candle>,
    /// Single upstream call slot, shared by every run of the sampling task
    in_flight: Arc<Semaphore>,
    metrics: Arc<ServiceMetrics>,
}

impl std::fmt::Debug for MarketDataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataService")
            .field("config", &self.config)
            .field("state", &*self.state.read())
            .field("symbol", &*self.symbol_tx.borrow())
            .finish()
    }
}

impl MarketDataService {
    /// Create a stopped service
    pub fn new(
        config: MarketDataConfig,
        client: Arc<dyn QuoteClient>,
        store: Arc<dyn CandleStore>,
    ) -> Self {
        let (symbol_tx, _) = watch::channel(config.symbol.clone());
        let (closed_tx, _) = broadcast::channel(CLOSED_CANDLE_CHANNEL_SIZE);
        Self {
            config,
            client,
            store,
            volume: Arc::new(TickCount),
            clock: Arc::new(SystemClock),
            state: RwLock::new(ServiceState::Stopped),
            runner: Mutex::new(None),
            symbol_tx,
            closed_tx,
            in_flight: Arc::new(Semaphore::new(1)),
            metrics: Arc::new(ServiceMetrics::default()),
        }
    }

    /// Replace the per-tick volume model used by later starts
    #[must_use]
    pub fn with_volume_model(mut self, volume: Arc<dyn VolumeModel>) -> Self {
        self.volume = volume;
        self
    }

    /// Replace the sample clock used by later starts
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServiceState {
        *self.state.read()
    }

    /// Whether the sampling task is running
    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    /// Symbol sampled by the next cycle
    pub fn active_symbol(&self) -> String {
        self.symbol_tx.borrow().clone()
    }

    /// Switch the sampled symbol. Takes effect at the start of the next
    /// cycle; the previous symbol's candles stay registered.
    pub fn select_symbol(&self, symbol: &str) -> MdsResult<()> {
        let symbol = normalize_symbol(symbol)
            .ok_or_else(|| ServiceError::InvalidConfig("symbol must not be blank".to_string()))?;
        let previous = self.symbol_tx.send_replace(symbol.clone());
        if previous != symbol {
            info!("Active symbol changed {} -> {}", previous, symbol);
        }
        Ok(())
    }

    /// Receive every candle finalized after this call
    pub fn subscribe_closed(&self) -> broadcast::Receiver<Candle> {
        self.closed_tx.subscribe()
    }

    /// Shared counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Service configuration
    pub const fn config(&self) -> &MarketDataConfig {
        &self.config
    }

    fn set_state(&self, state: ServiceState) {
        *self.state.write() = state;
    }

    /// Open the storage pool and spawn the sampling task.
    ///
    /// No-op while running. On pool failure the service stays stopped and
    /// nothing is spawned.
    pub async fn start(&self) -> MdsResult<()> {
        let mut runner = self.runner.lock().await;
        if runner.is_some() {
            debug!("Market data service already running");
            return Ok(());
        }

        self.set_state(ServiceState::Starting);
        if let Err(e) = self.store.init_pool().await {
            self.set_state(ServiceState::Stopped);
            error!("Market data service failed to start: {:#}", e);
            return Err(MdsError::PoolInit(e));
        }

        let aggregator = CandleAggregator::new(
            self.config.timeframes.clone(),
            Arc::clone(&self.store),
            self.closed_tx.clone(),
            Arc::clone(&self.metrics),
        )
        .with_volume_model(Arc::clone(&self.volume));
        let sampler = SamplingLoop::new(
            SampleSource::with_gate(
                Arc::clone(&self.client),
                self.config.fetch_timeout,
                Arc::clone(&self.in_flight),
            ),
            Arc::clone(&self.store),
            aggregator,
            self.symbol_tx.subscribe(),
            self.config.poll_interval,
            Backoff::new(self.config.backoff_base, self.config.backoff_max),
            Arc::clone(&self.metrics),
        )
        .with_clock(Arc::clone(&self.clock));

        // Dropping the sender also cancels the loop
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.set_state(ServiceState::Running);
        let handle = tokio::spawn(sampler.run(shutdown_rx));
        *runner = Some(RunningLoop {
            shutdown_tx,
            handle,
        });

        info!(
            "Market data service started: symbol {}, timeframes {:?}",
            self.active_symbol(),
            self.config.timeframes.iter().map(ToString::to_string).collect::<Vec<_>>()
        );
        Ok(())
    }

    /// Cancel the sampling task, wait for it to finish, then close the
    /// pool. Safe to call when never started.
    pub async fn stop(&self) -> MdsResult<()> {
        let mut runner = self.runner.lock().await;
        self.set_state(ServiceState::Stopping);

        if let Some(RunningLoop {
            shutdown_tx,
            mut handle,
        }) = runner.take()
        {
            let _ = shutdown_tx.send(true);
            match tokio::time::timeout(self.config.stop_timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_panic() => error!("Sampling task panicked: {}", e),
                Ok(Err(e)) => debug!("Sampling task ended: {}", e),
                Err(_) => {
                    warn!(
                        "Sampling task ignored shutdown for {:?}, aborting",
                        self.config.stop_timeout
                    );
                    handle.abort();
                    let _ = handle.await;
                }
            }
        }

        // The task is gone, no write can race the pool teardown
        let closed = self.store.close_pool().await;
        self.set_state(ServiceState::Stopped);
        closed.map_err(MdsError::PoolClose)?;

        info!("Market data service stopped");
        Ok(())
    }
}
