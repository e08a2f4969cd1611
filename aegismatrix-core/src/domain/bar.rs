//! Bar and Series: the normalized OHLCV table handed to downstream analytics.

use crate::data::canonicalize::Canonicalizer;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One time-bucketed OHLCV row.
///
/// Volume is carried as `f64` because index and volatility-index feeds often
/// report it as zero or omit it, and it goes through the same finiteness
/// check as the prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// True if every numeric field is finite (no NaN, no ±inf).
    pub fn is_finite(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite()
    }

    /// Calendar date of the bar in UTC.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Ordered OHLCV series.
///
/// Invariant: strictly increasing timestamps, all fields finite. The only way
/// to build a `Series` from arbitrary rows is [`Series::from_bars`], which
/// runs the canonicalizer. An empty series means "no data".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Series {
    bars: Vec<Bar>,
}

impl Series {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a series from raw rows: drops non-finite rows, sorts, dedupes.
    pub fn from_bars(bars: Vec<Bar>) -> Self {
        Self {
            bars: Canonicalizer::canonicalize(bars),
        }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bar> {
        self.bars.iter()
    }

    /// Close of the bar `n` positions from the end (`0` = latest).
    pub fn close_from_end(&self, n: usize) -> Option<f64> {
        self.bars
            .len()
            .checked_sub(n + 1)
            .map(|i| self.bars[i].close)
    }
}

impl<'de> Deserialize<'de> for Series {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Vec::<Bar>::deserialize(deserializer).map(Series::from_bars)
    }
}

impl<'a> IntoIterator for &'a Series {
    type Item = &'a Bar;
    type IntoIter = std::slice::Iter<'a, Bar>;

    fn into_iter(self) -> Self::IntoIter {
        self.bars.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 3, 45, 0).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn bar_detects_non_finite() {
        let mut b = bar(2, 100.0);
        assert!(b.is_finite());
        b.volume = f64::NAN;
        assert!(!b.is_finite());
        b.volume = 0.0;
        b.high = f64::INFINITY;
        assert!(!b.is_finite());
    }

    #[test]
    fn from_bars_sorts_and_cleans() {
        let mut bad = bar(4, 103.0);
        bad.close = f64::NAN;
        let series = Series::from_bars(vec![bar(3, 102.0), bad, bar(2, 101.0)]);

        assert_eq!(series.len(), 2);
        assert_eq!(series.first().unwrap().close, 101.0);
        assert_eq!(series.last().unwrap().close, 102.0);
    }

    #[test]
    fn close_from_end_indexes_backwards() {
        let series = Series::from_bars(vec![bar(2, 100.0), bar(3, 105.0), bar(4, 110.0)]);
        assert_eq!(series.close_from_end(0), Some(110.0));
        assert_eq!(series.close_from_end(1), Some(105.0));
        assert_eq!(series.close_from_end(3), None);
    }

    #[test]
    fn deserialize_reapplies_invariant() {
        let json = r#"[
            {"timestamp":"2024-01-03T03:45:00Z","open":1.0,"high":2.0,"low":0.5,"close":1.5,"volume":10.0},
            {"timestamp":"2024-01-02T03:45:00Z","open":1.0,"high":2.0,"low":0.5,"close":1.2,"volume":10.0}
        ]"#;
        let series: Series = serde_json::from_str(json).unwrap();
        assert_eq!(series.first().unwrap().close, 1.2);
    }
}
