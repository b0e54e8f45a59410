//! Non-blocking adapter over the blocking quote client

use anyhow::{Context, Result};
use services_common::{Quote, QuoteClient, ServiceError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::trace;

/// Runs blocking quote lookups on tokio's blocking pool.
///
/// At most one lookup per gate is in flight. A lookup abandoned by a
/// cancelled or timed-out caller keeps its permit until the worker returns,
/// so the next fetch waits for it instead of overlapping.
pub struct SampleSource {
    client: Arc<dyn QuoteClient>,
    in_flight: Arc<Semaphore>,
    timeout: Duration,
}

impl std::fmt::Debug for SampleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleSource")
            .field("timeout", &self.timeout)
            .field("busy", &(self.in_flight.available_permits() == 0))
            .finish()
    }
}

impl SampleSource {
    /// Create new source bounded by `timeout` per fetch
    pub fn new(client: Arc<dyn QuoteClient>, timeout: Duration) -> Self {
        Self::with_gate(client, timeout, Arc::new(Semaphore::new(1)))
    }

    /// Create new source that takes a permit from `gate` for every lookup.
    ///
    /// Sources sharing a single-permit gate never call the client
    /// concurrently, including a lookup abandoned by an earlier source.
    pub fn with_gate(client: Arc<dyn QuoteClient>, timeout: Duration, gate: Arc<Semaphore>) -> Self {
        Self {
            client,
            in_flight: gate,
            timeout,
        }
    }

    /// Fetch the latest quote for `symbol`.
    ///
    /// `Ok(Quote::Absent)` covers missing and non-positive prices. Upstream
    /// errors, worker panics and timeouts are `Err`.
    pub async fn fetch(&self, symbol: &str) -> Result<Quote> {
        let lookup = async {
            let permit = Arc::clone(&self.in_flight)
                .acquire_owned()
                .await
                .context("Quote worker semaphore closed")?;
            let client = Arc::clone(&self.client);
            let owned_symbol = symbol.to_string();

            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                client.latest_price(&owned_symbol)
            })
            .await
            .context("Quote worker panicked")?
        };

        let raw = tokio::time::timeout(self.timeout, lookup)
            .await
            .map_err(|_| {
                ServiceError::Timeout(format!("quote for {symbol} after {:?}", self.timeout))
            })??;

        let quote = Quote::from_raw(raw);
        trace!("Fetched {} -> {:?}", symbol, quote);
        Ok(quote)
    }
}
