//! Test fixtures for common test data

use chrono::{DateTime, Utc};
use rstest::*;
use services_common::Timeframe;
use std::sync::Arc;

use crate::mocks::{QuoteStep, RecordingStore, ScriptedQuoteClient};

/// Index symbol used across tests
#[fixture]
pub fn symbol() -> String {
    "NIFTY".to_string()
}

/// An instant aligned to every standard timeframe (a multiple of 900s)
#[fixture]
pub fn aligned_start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_067_200, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

/// The standard timeframe set
#[fixture]
pub fn timeframes() -> Vec<Timeframe> {
    vec![
        Timeframe::S5,
        Timeframe::S15,
        Timeframe::S30,
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
    ]
}

/// Empty recording store
#[fixture]
pub fn store() -> Arc<RecordingStore> {
    Arc::new(RecordingStore::new())
}

/// Client quoting a steady price
#[fixture]
pub fn steady_client() -> Arc<ScriptedQuoteClient> {
    Arc::new(ScriptedQuoteClient::constant(22_000.0))
}

/// Client that fails three times, then quotes a steady price
#[fixture]
pub fn flaky_client() -> Arc<ScriptedQuoteClient> {
    Arc::new(
        ScriptedQuoteClient::new([
            QuoteStep::fail("connection reset"),
            QuoteStep::fail("connection reset"),
            QuoteStep::fail("connection reset"),
        ])
        .with_fallback(QuoteStep::Price(22_000.0)),
    )
}
