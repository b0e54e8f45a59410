//! Market data service configuration

use services_common::constants::instruments::{DEFAULT_SYMBOL, DEFAULT_TIMEFRAMES_SECS};
use services_common::constants::sampling::{
    BACKOFF_BASE_SECS, BACKOFF_MAX_SECS, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_POLL_SECONDS,
    DEFAULT_STOP_TIMEOUT_SECS, MAX_POLL_SECONDS, MIN_POLL_SECONDS,
};
use services_common::{ServiceError, Timeframe, env_lookup, non_empty, normalize_symbol, parse_or};
use std::collections::BTreeSet;
use std::time::Duration;

/// Sampling service configuration
#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    /// Active symbol, upper-cased
    pub symbol: String,
    /// Time between successful cycles, always within the clamp bounds
    pub poll_interval: Duration,
    /// Candle timeframes maintained for every symbol
    pub timeframes: Vec<Timeframe>,
    /// Bound on one upstream fetch
    pub fetch_timeout: Duration,
    /// Bound on joining the sampling task in `stop()`
    pub stop_timeout: Duration,
    /// First backoff delay
    pub backoff_base: Duration,
    /// Backoff ceiling
    pub backoff_max: Duration,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            symbol: DEFAULT_SYMBOL.to_string(),
            poll_interval: clamp_poll_interval(DEFAULT_POLL_SECONDS),
            timeframes: DEFAULT_TIMEFRAMES_SECS
                .iter()
                .filter_map(|s| Timeframe::from_seconds(*s))
                .collect(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            stop_timeout: Duration::from_secs(DEFAULT_STOP_TIMEOUT_SECS),
            backoff_base: Duration::from_secs(BACKOFF_BASE_SECS),
            backoff_max: Duration::from_secs(BACKOFF_MAX_SECS),
        }
    }
}

impl MarketDataConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(env_lookup)
    }

    /// Load from `MDS_POLL_SECONDS`, `SELECTED_INDEX`, `MDS_TIMEFRAMES`,
    /// `MDS_FETCH_TIMEOUT_SECS` and `MDS_STOP_TIMEOUT_SECS`
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ServiceError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let poll_seconds: f64 = parse_or(&lookup, "MDS_POLL_SECONDS", DEFAULT_POLL_SECONDS)?;
        let symbol = non_empty(&lookup, "SELECTED_INDEX")
            .and_then(|raw| normalize_symbol(&raw))
            .unwrap_or(defaults.symbol);
        let timeframes = match non_empty(&lookup, "MDS_TIMEFRAMES") {
            Some(raw) => parse_timeframes(&raw)?,
            None => defaults.timeframes,
        };
        let fetch_timeout: u64 =
            parse_or(&lookup, "MDS_FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?;
        let stop_timeout: u64 =
            parse_or(&lookup, "MDS_STOP_TIMEOUT_SECS", DEFAULT_STOP_TIMEOUT_SECS)?;

        Ok(Self {
            symbol,
            poll_interval: clamp_poll_interval(poll_seconds),
            timeframes,
            fetch_timeout: Duration::from_secs(fetch_timeout.max(1)),
            stop_timeout: Duration::from_secs(stop_timeout.max(1)),
            ..defaults
        })
    }

    /// Replace the poll interval, clamped like the environment value
    #[must_use]
    pub fn with_poll_seconds(mut self, seconds: f64) -> Self {
        self.poll_interval = clamp_poll_interval(seconds);
        self
    }
}

/// Clamp a poll interval to `[MIN_POLL_SECONDS, MAX_POLL_SECONDS]`.
/// NaN falls back to the default.
#[must_use]
pub fn clamp_poll_interval(seconds: f64) -> Duration {
    let seconds = if seconds.is_nan() {
        DEFAULT_POLL_SECONDS
    } else {
        seconds.clamp(MIN_POLL_SECONDS, MAX_POLL_SECONDS)
    };
    Duration::from_secs_f64(seconds)
}

/// Parse a comma separated timeframe list such as `"5,15,1m"`.
/// Output is sorted; empty lists and duplicates are rejected.
pub fn parse_timeframes(raw: &str) -> Result<Vec<Timeframe>, ServiceError> {
    let mut seen = BTreeSet::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let tf: Timeframe = part.parse()?;
        if !seen.insert(tf) {
            return Err(ServiceError::InvalidConfig(format!(
                "duplicate timeframe {tf} in MDS_TIMEFRAMES"
            )));
        }
    }
    if seen.is_empty() {
        return Err(ServiceError::InvalidConfig(
            "MDS_TIMEFRAMES lists no timeframes".to_string(),
        ));
    }
    Ok(seen.into_iter().collect())
}
