//! Acquisition configuration, loadable from TOML.
//!
//! Every field has a default, so a config file only needs the keys it wants
//! to change:
//!
//! ```toml
//! cache_dir = "/var/lib/aegismatrix/cache"
//! lookback_years = 3
//!
//! [retry]
//! max_attempts = 4
//! ```

use crate::data::retry::RetryPolicy;
use crate::domain::Symbol;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Everything the acquisition layer needs to know.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Index whose spot is tracked.
    pub index_symbol: Symbol,

    /// Volatility index paired with it.
    pub volatility_symbol: Symbol,

    /// Daily history lookback.
    pub lookback_years: u32,

    /// Default intraday range and bar size.
    pub intraday_period: String,
    pub intraday_interval: String,

    /// Shorter range tried once when the ticker returns nothing for
    /// `intraday_period`.
    pub intraday_fallback_period: String,

    pub cache_dir: PathBuf,

    /// Intraday cache entries younger than this are served without fetching.
    pub intraday_freshness_minutes: u32,

    /// Try the exchange option-chain spot as the last live-price tier.
    pub exchange_spot: bool,

    pub retry: RetryConfig,

    pub http: HttpConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            index_symbol: Symbol::new("^NSEI"),
            volatility_symbol: Symbol::new("^INDIAVIX"),
            lookback_years: 5,
            intraday_period: "5d".to_string(),
            intraday_interval: "5m".to_string(),
            intraday_fallback_period: "1d".to_string(),
            cache_dir: PathBuf::from("data"),
            intraday_freshness_minutes: 15,
            exchange_spot: true,
            retry: RetryConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl AcquisitionConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            rate_limit_base_delay: Duration::from_millis(self.retry.rate_limit_base_delay_ms),
            transport_delay: Duration::from_millis(self.retry.transport_delay_ms),
        }
    }

    pub fn intraday_freshness(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.intraday_freshness_minutes))
    }
}

/// Primary-provider retry budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub rate_limit_base_delay_ms: u64,
    pub transport_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_base_delay_ms: 2_000,
            transport_delay_ms: 1_000,
        }
    }
}

/// Socket timeouts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub request_timeout_secs: u64,
    pub session_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            session_timeout_secs: 15,
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}
