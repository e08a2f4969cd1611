//! Symbol and granularity: the two halves of every cache and request key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange ticker, e.g. `^NSEI` or `^INDIAVIX`.
///
/// Opaque to the acquisition layer: it is only ever passed through to
/// providers and used to derive cache file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self(ticker.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-system safe form: every non-alphanumeric character becomes `_`.
    ///
    /// `^NSEI` → `_NSEI`, `BRK-B` → `BRK_B`.
    pub fn sanitized(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Sampling resolution of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    Intraday,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Intraday => "intraday",
        }
    }

    /// Suffix appended to the sanitized symbol in cache file names.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            Granularity::Daily => "_daily",
            Granularity::Intraday => "_intraday",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
