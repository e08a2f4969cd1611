//! NSE option-chain spot: the tertiary, live-spot-only provider.
//!
//! NSE rejects API calls that arrive without the cookies its home page sets,
//! so every attempt opens a fresh session through a [`SessionTransport`]:
//! warm-up GET on the home page, a short pause, then the option-chain request.
//! The session is dropped at the end of the attempt.

use super::clock::Sleeper;
use super::headers::HeaderRotator;
use super::http::{CookieSessions, SessionTransport};
use super::provider::DataError;
use super::ticker::is_usable_price;
use crate::domain::Symbol;
use rand::rngs::StdRng;
use rand::SeedableRng;
use reqwest::header::{HeaderValue, REFERER};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const NSE_HOME_URL: &str = "https://www.nseindia.com";
pub const NSE_OPTION_CHAIN_URL: &str =
    "https://www.nseindia.com/api/option-chain-indices?symbol=NIFTY";

#[derive(Debug, Deserialize)]
struct OptionChainResponse {
    records: OptionChainRecords,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptionChainRecords {
    underlying_value: Option<f64>,
}

/// Extract `records.underlyingValue`; non-positive or missing is an error.
pub(crate) fn parse_underlying(body: &str) -> Result<f64, DataError> {
    let resp: OptionChainResponse = serde_json::from_str(body)
        .map_err(|e| DataError::MalformedResponse(format!("option chain: {e}")))?;
    match resp.records.underlying_value {
        Some(v) if is_usable_price(v) => Ok(v),
        other => Err(DataError::MalformedResponse(format!(
            "invalid underlying value: {other:?}"
        ))),
    }
}

/// Session-based spot fetcher for one index.
pub struct NseSpotProvider {
    index: Symbol,
    sessions: Arc<dyn SessionTransport>,
    rotator: HeaderRotator,
    rng: Mutex<StdRng>,
    home_url: String,
    chain_url: String,
    timeout: Duration,
    warmup_delay: Duration,
    retry_pause: Duration,
    max_attempts: u32,
    sleeper: Arc<dyn Sleeper>,
}

impl NseSpotProvider {
    /// Provider that answers only for `index` (the option chain is NIFTY's).
    pub fn new(index: Symbol, timeout: Duration, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            index,
            sessions: Arc::new(CookieSessions),
            rotator: HeaderRotator::default(),
            rng: Mutex::new(StdRng::from_entropy()),
            home_url: NSE_HOME_URL.to_string(),
            chain_url: NSE_OPTION_CHAIN_URL.to_string(),
            timeout,
            warmup_delay: Duration::from_millis(500),
            retry_pause: Duration::from_secs(1),
            max_attempts: 2,
            sleeper,
        }
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionTransport>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Deterministic header rotation.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn index(&self) -> &Symbol {
        &self.index
    }

    /// Current underlying value, retrying once on any failure.
    pub fn spot(&self) -> Result<f64, DataError> {
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            debug!(attempt, max = self.max_attempts, "fetching NSE option chain");
            match self.attempt() {
                Ok(spot) => {
                    info!(spot, "fetched live NSE spot");
                    return Ok(spot);
                }
                Err(e) => {
                    warn!(attempt, "NSE fetch failed: {e}");
                    last_error = Some(e);
                    if attempt < self.max_attempts {
                        self.sleeper.sleep(self.retry_pause);
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| DataError::Session("no attempts made".into())))
    }

    fn attempt(&self) -> Result<f64, DataError> {
        let identity = {
            let mut rng = self.rng.lock().unwrap();
            self.rotator.pick(&mut *rng).with_accept("application/json")
        };
        let mut headers = identity.header_map();
        headers.insert(REFERER, HeaderValue::from_static("https://www.nseindia.com/"));

        let session = self.sessions.open(&self.home_url, headers, self.timeout)?;
        self.sleeper.sleep(self.warmup_delay);

        let reply = session.get(&self.chain_url)?;
        if reply.status == 429 {
            return Err(DataError::RateLimited {
                status: reply.status,
            });
        }
        if !reply.is_success() {
            return Err(DataError::HttpStatus {
                status: reply.status,
            });
        }
        parse_underlying(&reply.body)
    }
}
