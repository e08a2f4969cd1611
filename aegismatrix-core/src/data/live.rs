//! Live price resolver.
//!
//! Tries live signal sources in a fixed priority order and keeps the first
//! positive, finite price. Each tier is isolated: an error or an empty answer
//! is logged and the next tier is tried. The resolver is independent of the
//! orchestrator and never touches the cache.

use super::clock::{Clock, Sleeper};
use super::nse::NseSpotProvider;
use super::provider::{DataError, HistoryRequest};
use super::ticker::{is_usable_price, Ticker};
use crate::domain::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One live signal source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveTier {
    /// Latest 1-minute intraday close.
    OneMinuteBar,
    /// Consolidated quote: regular-market, current, previous close.
    QuoteInfo,
    /// Fast quote: last price, regular-market.
    FastQuote,
    /// Latest 5-minute intraday close.
    FiveMinuteBar,
    /// Exchange option-chain underlying value.
    ExchangeSpot,
}

impl LiveTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveTier::OneMinuteBar => "one_minute_bar",
            LiveTier::QuoteInfo => "quote_info",
            LiveTier::FastQuote => "fast_quote",
            LiveTier::FiveMinuteBar => "five_minute_bar",
            LiveTier::ExchangeSpot => "exchange_spot",
        }
    }
}

impl fmt::Display for LiveTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First valid price of one resolver call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LivePriceSample {
    pub price: f64,
    pub tier: LiveTier,
    pub observed_at: DateTime<Utc>,
}

/// Spot price source outside the ticker, e.g. an exchange API.
///
/// `Ok(None)` means the source does not cover this symbol.
pub trait SpotSource: Send + Sync {
    fn spot(&self, symbol: &Symbol) -> Result<Option<f64>, DataError>;
}

impl SpotSource for NseSpotProvider {
    fn spot(&self, symbol: &Symbol) -> Result<Option<f64>, DataError> {
        if symbol != self.index() {
            return Ok(None);
        }
        NseSpotProvider::spot(self).map(Some)
    }
}

/// Ordered live-price lookup.
pub struct LivePriceResolver {
    ticker: Arc<dyn Ticker>,
    exchange: Option<Arc<dyn SpotSource>>,
    clock: Arc<dyn Clock>,
}

impl LivePriceResolver {
    pub fn new(ticker: Arc<dyn Ticker>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ticker,
            exchange: None,
            clock,
        }
    }

    /// Add the exchange spot as the last tier.
    pub fn with_exchange_spot(mut self, source: Arc<dyn SpotSource>) -> Self {
        self.exchange = Some(source);
        self
    }

    /// NSE option-chain spot for `index` as the last tier.
    pub fn with_nse_spot(self, index: Symbol, timeout: Duration, sleeper: Arc<dyn Sleeper>) -> Self {
        self.with_exchange_spot(Arc::new(NseSpotProvider::new(index, timeout, sleeper)))
    }

    /// Tiers in the order they are tried.
    pub fn tiers(&self) -> Vec<LiveTier> {
        let mut tiers = vec![
            LiveTier::OneMinuteBar,
            LiveTier::QuoteInfo,
            LiveTier::FastQuote,
            LiveTier::FiveMinuteBar,
        ];
        if self.exchange.is_some() {
            tiers.push(LiveTier::ExchangeSpot);
        }
        tiers
    }

    /// First positive, finite price across the tiers, or `None`.
    ///
    /// Callers must keep whatever price they already had on `None`.
    pub fn get_live_price(&self, symbol: &Symbol) -> Option<LivePriceSample> {
        for tier in self.tiers() {
            match self.probe(tier, symbol) {
                Ok(Some(price)) if is_usable_price(price) => {
                    info!(%symbol, %tier, price, "live price resolved");
                    return Some(LivePriceSample {
                        price,
                        tier,
                        observed_at: self.clock.now(),
                    });
                }
                Ok(Some(price)) => debug!(%symbol, %tier, price, "unusable live price"),
                Ok(None) => debug!(%symbol, %tier, "no live price from tier"),
                Err(e) => debug!(%symbol, %tier, "live price tier failed: {e}"),
            }
        }
        warn!(%symbol, "could not get live price");
        None
    }

    fn probe(&self, tier: LiveTier, symbol: &Symbol) -> Result<Option<f64>, DataError> {
        match tier {
            LiveTier::OneMinuteBar => self.last_close(symbol, "1m"),
            LiveTier::QuoteInfo => Ok(self.ticker.info(symbol)?.best_price()),
            LiveTier::FastQuote => Ok(self.ticker.fast_info(symbol)?.best_price()),
            LiveTier::FiveMinuteBar => self.last_close(symbol, "5m"),
            LiveTier::ExchangeSpot => match &self.exchange {
                Some(source) => source.spot(symbol),
                None => Ok(None),
            },
        }
    }

    fn last_close(&self, symbol: &Symbol, interval: &str) -> Result<Option<f64>, DataError> {
        let series = self
            .ticker
            .history(symbol, &HistoryRequest::intraday("1d", interval))?;
        Ok(series.last().map(|bar| bar.close))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::clock::ManualClock;
    use crate::data::ticker::{FastQuote, QuoteInfo};
    use crate::domain::{Bar, Series};
    use chrono::TimeZone;
    use std::sync::Mutex;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    fn one_bar(close: f64) -> Series {
        Series::from_bars(vec![Bar {
            timestamp: now(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }])
    }

    /// Answers per tier; records every call.
    #[derive(Default)]
    struct ScriptedTicker {
        one_minute: Option<Series>,
        five_minute: Option<Series>,
        info: Option<QuoteInfo>,
        fast: Option<FastQuote>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedTicker {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Ticker for ScriptedTicker {
        fn history(&self, _symbol: &Symbol, request: &HistoryRequest) -> Result<Series, DataError> {
            let key = format!("history:{}", request.interval);
            self.calls.lock().unwrap().push(key);
            let answer = if request.interval == "1m" {
                &self.one_minute
            } else {
                &self.five_minute
            };
            answer
                .clone()
                .ok_or_else(|| DataError::Transport("down".into()))
        }

        fn info(&self, _symbol: &Symbol) -> Result<QuoteInfo, DataError> {
            self.calls.lock().unwrap().push("info".into());
            self.info
                .clone()
                .ok_or_else(|| DataError::Transport("down".into()))
        }

        fn fast_info(&self, _symbol: &Symbol) -> Result<FastQuote, DataError> {
            self.calls.lock().unwrap().push("fast_info".into());
            self.fast
                .clone()
                .ok_or_else(|| DataError::Transport("down".into()))
        }
    }

    struct FixedSpot(Option<f64>);

    impl SpotSource for FixedSpot {
        fn spot(&self, _symbol: &Symbol) -> Result<Option<f64>, DataError> {
            Ok(self.0)
        }
    }

    fn resolver(ticker: Arc<ScriptedTicker>) -> LivePriceResolver {
        LivePriceResolver::new(ticker, Arc::new(ManualClock::new(now())))
    }

    #[test]
    fn one_minute_bar_wins_first() {
        let ticker = Arc::new(ScriptedTicker {
            one_minute: Some(one_bar(22_150.5)),
            info: Some(QuoteInfo {
                regular_market_price: Some(1.0),
                ..Default::default()
            }),
            ..Default::default()
        });
        let sample = resolver(ticker.clone())
            .get_live_price(&Symbol::from("^NSEI"))
            .unwrap();
        assert_eq!(sample.price, 22_150.5);
        assert_eq!(sample.tier, LiveTier::OneMinuteBar);
        assert_eq!(sample.observed_at, now());
        assert_eq!(ticker.calls(), vec!["history:1m"]);
    }

    #[test]
    fn failed_tier_falls_through_and_later_tiers_are_skipped() {
        let ticker = Arc::new(ScriptedTicker {
            info: Some(QuoteInfo {
                regular_market_price: Some(100.0),
                ..Default::default()
            }),
            fast: Some(FastQuote {
                last_price: Some(200.0),
                ..Default::default()
            }),
            ..Default::default()
        });
        let sample = resolver(ticker.clone())
            .get_live_price(&Symbol::from("^NSEI"))
            .unwrap();
        assert_eq!(sample.price, 100.0);
        assert_eq!(sample.tier, LiveTier::QuoteInfo);
        assert_eq!(ticker.calls(), vec!["history:1m", "info"]);
    }

    #[test]
    fn non_positive_prices_are_skipped() {
        let ticker = Arc::new(ScriptedTicker {
            one_minute: Some(one_bar(0.0)),
            info: Some(QuoteInfo {
                regular_market_price: Some(f64::NAN),
                current_price: Some(-3.0),
                previous_close: None,
            }),
            fast: Some(FastQuote::default()),
            five_minute: Some(one_bar(99.5)),
            ..Default::default()
        });
        let sample = resolver(ticker)
            .get_live_price(&Symbol::from("^NSEI"))
            .unwrap();
        assert_eq!(sample.price, 99.5);
        assert_eq!(sample.tier, LiveTier::FiveMinuteBar);
    }

    #[test]
    fn empty_intraday_history_is_not_a_price() {
        let ticker = Arc::new(ScriptedTicker {
            one_minute: Some(Series::empty()),
            fast: Some(FastQuote {
                last_price: None,
                regular_market_price: Some(15.2),
            }),
            ..Default::default()
        });
        let sample = resolver(ticker)
            .get_live_price(&Symbol::from("^INDIAVIX"))
            .unwrap();
        assert_eq!(sample.tier, LiveTier::FastQuote);
        assert_eq!(sample.price, 15.2);
    }

    #[test]
    fn exchange_spot_is_last_resort() {
        let ticker = Arc::new(ScriptedTicker::default());
        let resolver = resolver(ticker.clone()).with_exchange_spot(Arc::new(FixedSpot(Some(22_000.0))));
        assert_eq!(resolver.tiers().last(), Some(&LiveTier::ExchangeSpot));

        let sample = resolver.get_live_price(&Symbol::from("^NSEI")).unwrap();
        assert_eq!(sample.tier, LiveTier::ExchangeSpot);
        assert_eq!(sample.price, 22_000.0);
        assert_eq!(
            ticker.calls(),
            vec!["history:1m", "info", "fast_info", "history:5m"]
        );
    }

    #[test]
    fn all_tiers_failing_gives_none() {
        let ticker = Arc::new(ScriptedTicker::default());
        let resolver = resolver(ticker).with_exchange_spot(Arc::new(FixedSpot(None)));
        assert!(resolver.get_live_price(&Symbol::from("^NSEI")).is_none());
    }

    #[test]
    fn nse_spot_ignores_other_symbols() {
        let nse = NseSpotProvider::new(
            Symbol::from("^NSEI"),
            Duration::from_secs(1),
            Arc::new(crate::data::clock::RecordingSleeper::new()),
        );
        assert_eq!(SpotSource::spot(&nse, &Symbol::from("^INDIAVIX")).unwrap(), None);
    }
}
