//! Price samples and quote results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed price for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Upper-cased symbol
    pub symbol: String,
    /// Last traded price, always positive
    pub price: f64,
    /// Observation time
    pub ts: DateTime<Utc>,
}

impl Tick {
    /// Create new tick
    pub fn new(symbol: impl Into<String>, price: f64, ts: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            ts,
        }
    }
}

/// Outcome of a quote fetch that did not fail
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quote {
    /// Usable price
    Price(f64),
    /// Upstream had nothing usable this time
    Absent,
}

impl Quote {
    /// Normalize a raw upstream value. Missing, zero, negative and
    /// non-finite prices are all absent.
    #[must_use]
    pub fn from_raw(raw: Option<f64>) -> Self {
        match raw {
            Some(price) if price.is_finite() && price > 0.0 => Self::Price(price),
            _ => Self::Absent,
        }
    }

    /// Price if present
    #[must_use]
    pub const fn price(self) -> Option<f64> {
        match self {
            Self::Price(price) => Some(price),
            Self::Absent => None,
        }
    }
}

/// Trim and upper-case a symbol. Returns `None` for blank input.
#[must_use]
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}
