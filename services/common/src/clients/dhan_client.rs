//! Dhan market feed LTP client
//!
//! Blocking HTTP client for index last-traded prices. The underlying
//! `reqwest::blocking::Client` is built lazily on the first call so it is
//! created on the blocking worker that runs the fetch, not on an async
//! executor thread.

use super::QuoteClient;
use crate::config::{env_lookup, non_empty, parse_or, required};
use crate::constants::dhan::{
    BANKNIFTY_SECURITY_ID, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS, FINNIFTY_SECURITY_ID,
    INDEX_SEGMENT, LTP_PATH, MIDCPNIFTY_SECURITY_ID, NIFTY_SECURITY_ID, SENSEX_SECURITY_ID,
};
use crate::errors::ServiceError;
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace};

/// Dhan API credentials and endpoint
#[derive(Clone)]
pub struct DhanConfig {
    /// API base URL
    pub base_url: String,
    /// Dhan client id
    pub client_id: String,
    /// Access token
    pub access_token: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl fmt::Debug for DhanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DhanConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("access_token", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl DhanConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(env_lookup)
    }

    /// Load from `DHAN_CLIENT_ID`, `DHAN_ACCESS_TOKEN` and optional
    /// `DHAN_BASE_URL` / `DHAN_TIMEOUT_SECS`
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ServiceError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let timeout_secs = parse_or(&lookup, "DHAN_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        Ok(Self {
            base_url: non_empty(&lookup, "DHAN_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client_id: required(&lookup, "DHAN_CLIENT_ID")?,
            access_token: required(&lookup, "DHAN_ACCESS_TOKEN")?,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Exchange segment and security id for an index symbol
#[must_use]
pub fn index_security(symbol: &str) -> Option<(&'static str, u32)> {
    let id = match symbol {
        "NIFTY" | "NIFTY50" => NIFTY_SECURITY_ID,
        "BANKNIFTY" => BANKNIFTY_SECURITY_ID,
        "FINNIFTY" => FINNIFTY_SECURITY_ID,
        "MIDCPNIFTY" => MIDCPNIFTY_SECURITY_ID,
        "SENSEX" => SENSEX_SECURITY_ID,
        _ => return None,
    };
    Some((INDEX_SEGMENT, id))
}

#[derive(Debug, Deserialize)]
struct LtpResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: HashMap<String, HashMap<String, LtpQuote>>,
}

#[derive(Debug, Deserialize)]
struct LtpQuote {
    last_price: Option<f64>,
}

/// Extract the last price for `(segment, security_id)` from an LTP body
pub fn parse_ltp_response(body: &str, segment: &str, security_id: u32) -> Result<Option<f64>> {
    let response: LtpResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::InvalidResponse(format!("LTP body: {e}")))?;

    if let Some(status) = response.status.as_deref() {
        if !status.eq_ignore_ascii_case("success") {
            return Err(ServiceError::ServiceUnavailable(format!("LTP status '{status}'")).into());
        }
    }

    Ok(response
        .data
        .get(segment)
        .and_then(|quotes| quotes.get(&security_id.to_string()))
        .and_then(|quote| quote.last_price))
}

/// Blocking Dhan LTP client
pub struct DhanQuoteClient {
    config: DhanConfig,
    http: OnceCell<reqwest::blocking::Client>,
}

impl fmt::Debug for DhanQuoteClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DhanQuoteClient")
            .field("config", &self.config)
            .field("connected", &self.http.get().is_some())
            .finish()
    }
}

impl DhanQuoteClient {
    /// Create new client, no connection is made until the first fetch
    #[must_use]
    pub const fn new(config: DhanConfig) -> Self {
        Self {
            config,
            http: OnceCell::new(),
        }
    }

    fn http(&self) -> Result<&reqwest::blocking::Client> {
        self.http.get_or_try_init(|| {
            debug!("Building Dhan HTTP client for {}", self.config.base_url);
            reqwest::blocking::Client::builder()
                .timeout(self.config.request_timeout)
                .build()
                .context("Failed to build Dhan HTTP client")
        })
    }
}

impl QuoteClient for DhanQuoteClient {
    fn latest_price(&self, symbol: &str) -> Result<Option<f64>> {
        let (segment, security_id) = index_security(symbol)
            .ok_or_else(|| ServiceError::UnknownInstrument(symbol.to_string()))?;

        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), LTP_PATH);
        let body = HashMap::from([(segment, [security_id])]);

        let response = self
            .http()?
            .post(&url)
            .header("access-token", &self.config.access_token)
            .header("client-id", &self.config.client_id)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .map_err(ServiceError::from)?
            .error_for_status()
            .map_err(ServiceError::from)?;
        let text = response.text().map_err(ServiceError::from)?;

        let price = parse_ltp_response(&text, segment, security_id)?;
        trace!("Dhan LTP {} = {:?}", symbol, price);
        Ok(price)
    }
}
