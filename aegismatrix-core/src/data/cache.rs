//! CSV cache: one human-inspectable file per (symbol, granularity).
//!
//! Layout: `{cache_dir}/{sanitized_symbol}_{daily|intraday}.csv`
//!
//! Features:
//! - Atomic writes (write to a unique .tmp, rename into place)
//! - Loads never fail: missing or corrupt files read as "no cache"
//! - Freshness: daily by last row's date, intraday by file mtime

use super::clock::Clock;
use super::provider::DataError;
use crate::domain::{Bar, Granularity, Series, Symbol};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Default intraday freshness window.
pub const INTRADAY_FRESHNESS_MINUTES: i64 = 15;

/// The CSV cache.
pub struct CsvCache {
    cache_dir: PathBuf,
    clock: Arc<dyn Clock>,
    intraday_freshness: Duration,
}

impl CsvCache {
    pub fn new(cache_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            clock,
            intraday_freshness: Duration::minutes(INTRADAY_FRESHNESS_MINUTES),
        }
    }

    pub fn with_intraday_freshness(mut self, window: Duration) -> Self {
        self.intraday_freshness = window;
        self
    }

    /// Root directory of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// `{cache_dir}/{sanitized}_{granularity}.csv`
    pub fn path_for(&self, symbol: &Symbol, granularity: Granularity) -> PathBuf {
        self.cache_dir.join(format!(
            "{}{}.csv",
            symbol.sanitized(),
            granularity.file_suffix()
        ))
    }

    /// Load the cached series. `None` means no usable cache entry.
    pub fn load(&self, symbol: &Symbol, granularity: Granularity) -> Option<Series> {
        let path = self.path_for(symbol, granularity);
        if !path.exists() {
            debug!(%symbol, %granularity, "no cache file");
            return None;
        }
        match read_csv(&path) {
            Ok(series) if series.is_empty() => {
                warn!(%symbol, %granularity, path = %path.display(), "cache file has no valid rows");
                None
            }
            Ok(series) => Some(series),
            Err(e) => {
                warn!(%symbol, %granularity, path = %path.display(), "unreadable cache file: {e}");
                None
            }
        }
    }

    /// Overwrite the entry for (symbol, granularity).
    ///
    /// Rows go to a unique temp file in the cache dir which is then renamed
    /// over the target, so readers see either the old or the new snapshot.
    pub fn save(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        series: &Series,
    ) -> Result<(), DataError> {
        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| DataError::Cache(format!("failed to create dir: {e}")))?;

        let path = self.path_for(symbol, granularity);
        let id = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_path = path.with_extension(format!("csv.{}.{id}.tmp", std::process::id()));

        if let Err(e) = write_csv(&tmp_path, series) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        // Atomic rename
        fs::rename(&tmp_path, &path).map_err(|e| {
            // Clean up temp file on rename failure
            let _ = fs::remove_file(&tmp_path);
            DataError::Cache(format!("atomic rename failed: {e}"))
        })?;

        debug!(%symbol, %granularity, rows = series.len(), "cache written");
        Ok(())
    }

    /// Last-write time of the cache file, if it exists.
    pub fn modified_at(&self, symbol: &Symbol, granularity: Granularity) -> Option<DateTime<Utc>> {
        let meta = fs::metadata(self.path_for(symbol, granularity)).ok()?;
        meta.modified().ok().map(DateTime::<Utc>::from)
    }

    /// Whether the entry may be served without re-fetching.
    pub fn is_fresh(&self, symbol: &Symbol, granularity: Granularity) -> bool {
        match granularity {
            Granularity::Daily => self
                .load(symbol, granularity)
                .is_some_and(|series| self.is_fresh_series(symbol, granularity, &series)),
            Granularity::Intraday => self.intraday_file_is_fresh(symbol),
        }
    }

    /// Freshness of an already-loaded entry, avoiding a second read.
    pub fn is_fresh_series(&self, symbol: &Symbol, granularity: Granularity, series: &Series) -> bool {
        match granularity {
            // Any row dated today counts, even an incomplete same-day bar
            Granularity::Daily => series
                .last()
                .is_some_and(|bar| bar.date() >= self.clock.now().date_naive()),
            Granularity::Intraday => self.intraday_file_is_fresh(symbol),
        }
    }

    fn intraday_file_is_fresh(&self, symbol: &Symbol) -> bool {
        self.modified_at(symbol, Granularity::Intraday)
            .is_some_and(|modified| self.clock.now() - modified <= self.intraday_freshness)
    }

    /// Cache status for a set of symbols at one granularity.
    pub fn status(&self, symbols: &[Symbol], granularity: Granularity) -> Vec<CacheStatus> {
        symbols
            .iter()
            .map(|symbol| {
                let series = self.load(symbol, granularity);
                CacheStatus {
                    symbol: symbol.clone(),
                    granularity,
                    cached: series.is_some(),
                    rows: series.as_ref().map_or(0, Series::len),
                    first: series.as_ref().and_then(|s| s.first().map(|b| b.timestamp)),
                    last: series.as_ref().and_then(|s| s.last().map(|b| b.timestamp)),
                    modified: self.modified_at(symbol, granularity),
                    fresh: series
                        .as_ref()
                        .is_some_and(|s| self.is_fresh_series(symbol, granularity, s)),
                }
            })
            .collect()
    }
}

/// Cache status for a single entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub symbol: Symbol,
    pub granularity: Granularity,
    pub cached: bool,
    pub rows: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub fresh: bool,
}

// ── CSV I/O helpers ─────────────────────────────────────────────────

fn write_csv(path: &Path, series: &Series) -> Result<(), DataError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| DataError::Cache(format!("create {}: {e}", path.display())))?;
    for bar in series {
        writer
            .serialize(bar)
            .map_err(|e| DataError::Cache(format!("write row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| DataError::Cache(format!("flush: {e}")))?;
    Ok(())
}

fn read_csv(path: &Path) -> Result<Series, DataError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| DataError::Cache(format!("open {}: {e}", path.display())))?;
    let bars = reader
        .deserialize::<Bar>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DataError::Cache(format!("read row: {e}")))?;
    Ok(Series::from_bars(bars))
}
