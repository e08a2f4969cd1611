//! Integration tests for market snapshot assembly over the orchestrator.

use aegismatrix_core::data::{
    CsvCache, DataError, FetchOrchestrator, HistoryProvider, HistoryRequest, ManualClock,
};
use aegismatrix_core::domain::{Bar, Series, Symbol};
use aegismatrix_core::snapshot::{LatestValues, MarketSnapshot, SnapshotError};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 10, 0, 0).unwrap()
}

fn closes(values: &[f64]) -> Series {
    let n = values.len();
    let bars = values
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            timestamp: now() - Duration::days((n - 1 - i) as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        })
        .collect();
    Series::from_bars(bars)
}

/// Fixed series per symbol; unknown symbols fail.
struct TableProvider(HashMap<String, Series>);

impl HistoryProvider for TableProvider {
    fn name(&self) -> &str {
        "table"
    }

    fn fetch(&self, symbol: &Symbol, _request: &HistoryRequest) -> Result<Series, DataError> {
        self.0
            .get(symbol.as_str())
            .cloned()
            .ok_or_else(|| DataError::Empty {
                symbol: symbol.to_string(),
            })
    }
}

struct NoData;

impl HistoryProvider for NoData {
    fn name(&self) -> &str {
        "none"
    }

    fn fetch(&self, symbol: &Symbol, _request: &HistoryRequest) -> Result<Series, DataError> {
        Err(DataError::Empty {
            symbol: symbol.to_string(),
        })
    }
}

fn snapshot(dir: &TempDir, table: &[(&str, Series)]) -> MarketSnapshot {
    let clock = Arc::new(ManualClock::new(now()));
    let primary = TableProvider(
        table
            .iter()
            .map(|(s, series)| (s.to_string(), series.clone()))
            .collect(),
    );
    let orch = FetchOrchestrator::new(
        CsvCache::new(dir.path(), clock.clone()),
        Arc::new(primary),
        Arc::new(NoData),
        clock,
    );
    MarketSnapshot::new(
        Arc::new(orch),
        Symbol::new("^NSEI"),
        Symbol::new("^INDIAVIX"),
        5,
    )
}

#[test]
fn market_snapshots_fetch_both_series() {
    let dir = TempDir::new().unwrap();
    let snap = snapshot(
        &dir,
        &[
            ("^NSEI", closes(&[100.0, 105.0, 110.0])),
            ("^INDIAVIX", closes(&[14.0, 15.0, 16.0])),
        ],
    );

    let (index, vix) = snap.get_market_snapshots();
    assert_eq!(index.len(), 3);
    assert_eq!(vix.len(), 3);
    assert_eq!(index.last().map(|b| b.close), Some(110.0));
    assert_eq!(vix.last().map(|b| b.close), Some(16.0));
}

#[test]
fn latest_values_are_last_two_closes() {
    let dir = TempDir::new().unwrap();
    let snap = snapshot(
        &dir,
        &[
            ("^NSEI", closes(&[100.0, 105.0, 110.0])),
            ("^INDIAVIX", closes(&[14.0, 15.0, 16.0])),
        ],
    );

    let values = snap.get_latest_values().unwrap();
    assert_eq!(
        values,
        LatestValues {
            latest_spot: 110.0,
            prev_spot: 105.0,
            latest_vix: 16.0,
            prev_vix: 15.0,
        }
    );

    let mut block = values.spot_block();
    assert_eq!(block.spot_change, 5.0);
    assert!(block.apply_live_price(Some(112.0)));
    assert_eq!(block.spot_change, 7.0);
    assert!((block.spot_change_pct - 7.0 / 105.0).abs() < 1e-12);
}

#[test]
fn single_row_series_is_a_hard_error() {
    let dir = TempDir::new().unwrap();
    let snap = snapshot(
        &dir,
        &[
            ("^NSEI", closes(&[110.0])),
            ("^INDIAVIX", closes(&[14.0, 15.0, 16.0])),
        ],
    );

    assert_eq!(
        snap.get_latest_values().unwrap_err(),
        SnapshotError::InsufficientHistory {
            symbol: "^NSEI".into(),
            rows: 1,
        }
    );
}

#[test]
fn missing_series_is_a_hard_error() {
    let dir = TempDir::new().unwrap();
    let snap = snapshot(&dir, &[("^NSEI", closes(&[100.0, 101.0]))]);

    let err = snap.get_latest_values().unwrap_err();
    assert!(matches!(
        err,
        SnapshotError::InsufficientHistory { rows: 0, .. }
    ));
}
