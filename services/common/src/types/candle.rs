//! Candle timeframes and OHLCV candles

use crate::errors::ServiceError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed-length, epoch-aligned candle bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Timeframe(u32);

impl Timeframe {
    /// 5 second bars
    pub const S5: Self = Self(5);
    /// 15 second bars
    pub const S15: Self = Self(15);
    /// 30 second bars
    pub const S30: Self = Self(30);
    /// 1 minute bars
    pub const M1: Self = Self(60);
    /// 5 minute bars
    pub const M5: Self = Self(300);
    /// 15 minute bars
    pub const M15: Self = Self(900);

    /// Timeframe of `seconds` length, `None` for zero
    #[must_use]
    pub const fn from_seconds(seconds: u32) -> Option<Self> {
        if seconds == 0 { None } else { Some(Self(seconds)) }
    }

    /// Get duration in seconds
    #[must_use]
    pub const fn seconds(self) -> u32 {
        self.0
    }

    /// Get chrono duration
    #[must_use]
    pub fn to_duration(self) -> Duration {
        Duration::seconds(i64::from(self.0))
    }

    /// Start of the bucket containing `ts`: `floor(epoch_secs / T) * T`.
    ///
    /// Boundaries depend only on the timestamp, never on when sampling
    /// started. Pre-epoch instants floor towards negative infinity.
    #[must_use]
    pub fn bucket_start(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let secs = i64::from(self.0);
        let start = ts.timestamp().div_euclid(secs) * secs;
        DateTime::from_timestamp(start, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            s if s % 3600 == 0 => write!(f, "{}h", s / 3600),
            s if s % 60 == 0 => write!(f, "{}m", s / 60),
            s => write!(f, "{s}s"),
        }
    }
}

impl FromStr for Timeframe {
    type Err = ServiceError;

    /// Accepts bare seconds (`"300"`) or a unit suffix (`"5s"`, `"5m"`, `"1h"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (digits, unit) = match s.char_indices().last() {
            Some((idx, c)) if c.is_ascii_alphabetic() => (&s[..idx], c.to_ascii_lowercase()),
            _ => (s, 's'),
        };
        let multiplier = match unit {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            other => {
                return Err(ServiceError::InvalidConfig(format!(
                    "unknown timeframe unit '{other}' in '{s}'"
                )));
            }
        };
        let value: u32 = digits
            .parse()
            .map_err(|e| ServiceError::InvalidConfig(format!("invalid timeframe '{s}': {e}")))?;
        value
            .checked_mul(multiplier)
            .and_then(Self::from_seconds)
            .ok_or_else(|| ServiceError::InvalidConfig(format!("timeframe out of range: '{s}'")))
    }
}

impl TryFrom<u32> for Timeframe {
    type Error = ServiceError;

    fn try_from(seconds: u32) -> Result<Self, Self::Error> {
        Self::from_seconds(seconds)
            .ok_or_else(|| ServiceError::InvalidConfig("timeframe must be positive".to_string()))
    }
}

impl From<Timeframe> for u32 {
    fn from(tf: Timeframe) -> Self {
        tf.0
    }
}

/// OHLCV candle data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Symbol
    pub symbol: String,
    /// Timeframe
    pub timeframe: Timeframe,
    /// Bucket start
    pub open_time: DateTime<Utc>,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Volume
    pub volume: f64,
}

impl Candle {
    /// Create new candle seeded from the first price of a bucket
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        open_time: DateTime<Utc>,
        price: f64,
        volume: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            open_time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    /// Fold another price of the same bucket into the candle
    pub fn update(&mut self, price: f64, volume: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }

    /// End of the bucket (exclusive)
    #[must_use]
    pub fn close_time(&self) -> DateTime<Utc> {
        self.open_time + self.timeframe.to_duration()
    }
}
