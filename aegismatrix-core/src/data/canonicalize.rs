//! Row cleaning applied to every series before it is considered valid.

use crate::domain::Bar;

/// Canonicalizer for bar data
pub struct Canonicalizer;

impl Canonicalizer {
    /// Canonicalize rows: drop non-finite, sort by timestamp, dedupe.
    ///
    /// The sort is stable, so when two rows share a timestamp the one that
    /// appeared first in the input is kept.
    pub fn canonicalize(bars: Vec<Bar>) -> Vec<Bar> {
        let mut bars = Self::validate(bars);
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by(|later, earlier| later.timestamp == earlier.timestamp);
        bars
    }

    /// Keep only rows whose numeric fields are all finite.
    pub fn validate(bars: Vec<Bar>) -> Vec<Bar> {
        bars.into_iter().filter(Bar::is_finite).collect()
    }

    /// True if timestamps are strictly increasing and every row is finite.
    pub fn is_canonical(bars: &[Bar]) -> bool {
        bars.iter().all(Bar::is_finite)
            && bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(minute: u32, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 4, minute, 0).unwrap(),
            open: 100.0,
            high: 105.0,
            low: 99.0,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_canonicalize_sorts_data() {
        let sorted = Canonicalizer::canonicalize(vec![bar(3, 3.0), bar(1, 1.0), bar(2, 2.0)]);
        let closes: Vec<f64> = sorted.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_canonicalize_removes_duplicates() {
        let deduped = Canonicalizer::canonicalize(vec![bar(1, 103.0), bar(1, 104.0), bar(2, 105.0)]);

        assert_eq!(deduped.len(), 2);
        // First occurrence should be kept
        assert_eq!(deduped[0].close, 103.0);
    }

    #[test]
    fn test_validate_drops_nan_rows() {
        let mut nan = bar(2, 1.0);
        nan.low = f64::NAN;
        let valid = Canonicalizer::validate(vec![bar(1, 1.0), nan]);
        assert_eq!(valid.len(), 1);
    }

    #[test]
    fn test_is_canonical() {
        assert!(Canonicalizer::is_canonical(&[bar(1, 1.0), bar(2, 1.0)]));
        assert!(!Canonicalizer::is_canonical(&[bar(2, 1.0), bar(1, 1.0)]));
        assert!(!Canonicalizer::is_canonical(&[bar(1, 1.0), bar(1, 1.0)]));
        assert!(Canonicalizer::is_canonical(&[]));
    }
}
