//! Common constants used across market data services
//!
//! Single source of truth for defaults and bounds.

/// Sampling loop timing
pub mod sampling {
    /// Default poll interval in seconds
    pub const DEFAULT_POLL_SECONDS: f64 = 1.0;

    /// Lower bound for the poll interval, prevents busy-looping
    pub const MIN_POLL_SECONDS: f64 = 0.25;

    /// Upper bound for the poll interval, prevents stale candles
    pub const MAX_POLL_SECONDS: f64 = 5.0;

    /// First backoff delay after a failed cycle
    pub const BACKOFF_BASE_SECS: u64 = 1;

    /// Backoff ceiling
    pub const BACKOFF_MAX_SECS: u64 = 60;

    /// Bound on a single upstream quote fetch
    pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

    /// Bound on joining the sampling task during shutdown
    pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 5;
}

/// Instruments and candle timeframes
pub mod instruments {
    /// Index sampled when nothing is selected
    pub const DEFAULT_SYMBOL: &str = "NIFTY";

    /// Candle timeframes maintained for every symbol, in seconds
    pub const DEFAULT_TIMEFRAMES_SECS: [u32; 6] = [5, 15, 30, 60, 300, 900];

    /// Capacity of the closed-candle broadcast channel
    pub const CLOSED_CANDLE_CHANNEL_SIZE: usize = 256;
}

/// Tick and candle storage
pub mod storage {
    /// Default Postgres port
    pub const DEFAULT_PG_PORT: u16 = 5432;

    /// Small pool, writes are sequential from one task
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

    /// Connection acquire timeout in seconds
    pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;
}

/// Dhan market feed
pub mod dhan {
    /// REST API base URL
    pub const DEFAULT_BASE_URL: &str = "https://api.dhan.co";

    /// LTP endpoint path
    pub const LTP_PATH: &str = "/v2/marketfeed/ltp";

    /// Exchange segment for index instruments
    pub const INDEX_SEGMENT: &str = "IDX_I";

    /// HTTP request timeout in seconds
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

    /// NIFTY 50 security id
    pub const NIFTY_SECURITY_ID: u32 = 13;
    /// NIFTY BANK security id
    pub const BANKNIFTY_SECURITY_ID: u32 = 25;
    /// NIFTY FIN SERVICE security id
    pub const FINNIFTY_SECURITY_ID: u32 = 27;
    /// NIFTY MID SELECT security id
    pub const MIDCPNIFTY_SECURITY_ID: u32 = 442;
    /// SENSEX security id
    pub const SENSEX_SECURITY_ID: u32 = 51;
}
