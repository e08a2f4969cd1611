//! History provider trait, request parameters and structured error types.
//!
//! The [`HistoryProvider`] trait abstracts over the chart endpoint and the
//! ticker abstraction so the orchestrator can chain them and tests can mock
//! them. Providers don't know about the cache.

use super::retry::AttemptOutcome;
use crate::domain::{Series, Symbol};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited by provider (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("provider returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("no usable rows for {symbol}")]
    Empty { symbol: String },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("session error: {0}")]
    Session(String),
}

impl DataError {
    /// Classification used by the retry state machine.
    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            DataError::Transport(_) | DataError::Session(_) => AttemptOutcome::Transport,
            DataError::RateLimited { .. } => AttemptOutcome::RateLimited,
            DataError::HttpStatus { .. } => AttemptOutcome::HttpStatus,
            DataError::MalformedResponse(_) | DataError::Cache(_) => AttemptOutcome::Malformed,
            DataError::Empty { .. } => AttemptOutcome::Empty,
        }
    }
}

/// Time span of a history request.
///
/// Intraday endpoints commonly accept only relative ranges, so intraday
/// requests carry a `Relative` period while daily requests carry explicit
/// dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryRange {
    Dates {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Relative {
        period: String,
    },
}

/// Parameters for one history fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub range: HistoryRange,
    pub interval: String,
}

impl HistoryRequest {
    /// Daily bars covering `years × 365` days up to `now`.
    pub fn daily(years: u32, now: DateTime<Utc>) -> Self {
        Self {
            range: HistoryRange::Dates {
                start: now - Duration::days(365 * i64::from(years)),
                end: now,
            },
            interval: "1d".to_string(),
        }
    }

    pub fn intraday(period: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            range: HistoryRange::Relative {
                period: period.into(),
            },
            interval: interval.into(),
        }
    }

    /// Build a request from loosely specified parts.
    ///
    /// A period wins over dates. Without a period, a missing start defaults to
    /// `default_years` before `now` and a missing end defaults to `now`.
    pub fn resolve(
        period: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        interval: &str,
        default_years: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let range = match period {
            Some(period) => HistoryRange::Relative {
                period: period.to_string(),
            },
            None => HistoryRange::Dates {
                start: start
                    .unwrap_or_else(|| now - Duration::days(365 * i64::from(default_years))),
                end: end.unwrap_or(now),
            },
        };
        Self {
            range,
            interval: interval.to_string(),
        }
    }

    /// Same interval over a different relative period.
    pub fn with_period(&self, period: impl Into<String>) -> Self {
        Self {
            range: HistoryRange::Relative {
                period: period.into(),
            },
            interval: self.interval.clone(),
        }
    }

    pub fn period(&self) -> Option<&str> {
        match &self.range {
            HistoryRange::Relative { period } => Some(period),
            HistoryRange::Dates { .. } => None,
        }
    }

    /// Query-string parameters for a chart-style endpoint.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("interval", self.interval.clone())];
        match &self.range {
            HistoryRange::Relative { period } => params.push(("range", period.clone())),
            HistoryRange::Dates { start, end } => {
                params.push(("period1", start.timestamp().to_string()));
                params.push(("period2", end.timestamp().to_string()));
            }
        }
        params
    }
}

/// Where a series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Fresh cache entry, no network.
    Cache,
    /// Direct chart endpoint.
    Primary,
    /// Ticker abstraction.
    Secondary,
    /// Outdated cache entry served because every provider failed.
    StaleCache,
    /// Nothing available; the series is empty.
    Unavailable,
}

impl DataSource {
    /// False for degraded outcomes.
    pub fn is_live_or_fresh(&self) -> bool {
        matches!(
            self,
            DataSource::Cache | DataSource::Primary | DataSource::Secondary
        )
    }
}

/// Trait for OHLCV history providers.
///
/// `Ok` with an empty series means the provider answered but had no usable
/// rows; the orchestrator treats that like a failure for fallback purposes.
pub trait HistoryProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    fn fetch(&self, symbol: &Symbol, request: &HistoryRequest) -> Result<Series, DataError>;
}
