//! Fetch orchestrator: cache check, provider chain, persist or stale-serve.
//!
//! For one (symbol, granularity) request:
//! 1. Fresh cache entry and no force refresh → serve it
//! 2. Primary provider → persist and return on rows
//! 3. Secondary provider (intraday retries once with a shorter period)
//!    → persist and return on rows
//! 4. Every provider failed → serve the stale cache entry if one was loaded,
//!    otherwise an empty series
//!
//! The orchestrator never returns an error: an empty series means "no data
//! available" and the caller decides what that means.

use super::cache::CsvCache;
use super::clock::{Clock, SystemClock, ThreadSleeper};
use super::http::BlockingTransport;
use super::provider::{DataError, DataSource, HistoryProvider, HistoryRequest};
use super::ticker::YahooTicker;
use super::yahoo::YahooChartProvider;
use crate::config::AcquisitionConfig;
use crate::domain::{Granularity, Series, Symbol};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Series plus where it came from.
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub symbol: Symbol,
    pub granularity: Granularity,
    pub series: Series,
    pub source: DataSource,
}

/// Coordinates the cache and the provider tiers.
pub struct FetchOrchestrator {
    cache: CsvCache,
    primary: Arc<dyn HistoryProvider>,
    secondary: Arc<dyn HistoryProvider>,
    clock: Arc<dyn Clock>,
    intraday_fallback_period: String,
}

impl FetchOrchestrator {
    pub fn new(
        cache: CsvCache,
        primary: Arc<dyn HistoryProvider>,
        secondary: Arc<dyn HistoryProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            primary,
            secondary,
            clock,
            intraday_fallback_period: "1d".to_string(),
        }
    }

    pub fn with_intraday_fallback_period(mut self, period: impl Into<String>) -> Self {
        self.intraday_fallback_period = period.into();
        self
    }

    /// Production wiring: Yahoo chart → Yahoo ticker, CSV cache, real time.
    pub fn from_config(config: &AcquisitionConfig) -> Result<Self, DataError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let transport = Arc::new(BlockingTransport::new(config.http.request_timeout())?);

        let primary = YahooChartProvider::new(
            transport.clone(),
            config.retry_policy(),
            Arc::new(ThreadSleeper),
        );
        let secondary = YahooTicker::new(transport, config.http.request_timeout());
        let cache = CsvCache::new(&config.cache_dir, clock.clone())
            .with_intraday_freshness(config.intraday_freshness());

        Ok(Self::new(cache, Arc::new(primary), Arc::new(secondary), clock)
            .with_intraday_fallback_period(config.intraday_fallback_period.clone()))
    }

    pub fn cache(&self) -> &CsvCache {
        &self.cache
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Daily OHLCV covering `years` up to now.
    pub fn fetch_daily_history(&self, symbol: &Symbol, years: u32, force_refresh: bool) -> Series {
        let request = HistoryRequest::daily(years, self.clock.now());
        info!(
            %symbol,
            years,
            "fetching daily history"
        );
        self.fetch(symbol, Granularity::Daily, &request, force_refresh)
            .series
    }

    /// Intraday OHLCV over a relative period.
    pub fn fetch_intraday_history(
        &self,
        symbol: &Symbol,
        period: &str,
        interval: &str,
        force_refresh: bool,
    ) -> Series {
        info!(%symbol, period, interval, "fetching intraday history");
        let request = HistoryRequest::intraday(period, interval);
        self.fetch(symbol, Granularity::Intraday, &request, force_refresh)
            .series
    }

    /// Run the full state machine for one request.
    pub fn fetch(
        &self,
        symbol: &Symbol,
        granularity: Granularity,
        request: &HistoryRequest,
        force_refresh: bool,
    ) -> FetchReport {
        let report = |series: Series, source: DataSource| FetchReport {
            symbol: symbol.clone(),
            granularity,
            series,
            source,
        };

        // CheckCache
        let cached = self.cache.load(symbol, granularity);
        if let Some(series) = &cached {
            if !force_refresh && self.cache.is_fresh_series(symbol, granularity, series) {
                info!(%symbol, %granularity, rows = series.len(), "cache hit");
                return report(series.clone(), DataSource::Cache);
            }
            debug!(%symbol, %granularity, force_refresh, "cache present but not served");
        }

        // FetchPrimary
        if let Some(series) = self.try_provider(self.primary.as_ref(), symbol, granularity, request) {
            self.persist(symbol, granularity, &series);
            return report(series, DataSource::Primary);
        }

        // FetchSecondary
        info!(%symbol, %granularity, provider = self.secondary.name(), "falling back to secondary provider");
        let mut secondary = self.try_provider(self.secondary.as_ref(), symbol, granularity, request);
        if secondary.is_none() && granularity == Granularity::Intraday {
            if let Some(period) = request.period() {
                if period != self.intraday_fallback_period {
                    warn!(
                        %symbol,
                        period,
                        fallback = %self.intraday_fallback_period,
                        "no intraday data, trying shorter period"
                    );
                    let shorter = request.with_period(self.intraday_fallback_period.clone());
                    secondary =
                        self.try_provider(self.secondary.as_ref(), symbol, granularity, &shorter);
                }
            }
        }
        if let Some(series) = secondary {
            self.persist(symbol, granularity, &series);
            return report(series, DataSource::Secondary);
        }

        // FallbackStale
        match cached {
            Some(series) => {
                warn!(
                    %symbol,
                    %granularity,
                    rows = series.len(),
                    last = ?series.last().map(|b| b.timestamp),
                    "all providers failed; serving stale cache"
                );
                report(series, DataSource::StaleCache)
            }
            None => {
                error!(%symbol, %granularity, "all providers failed and no cache available");
                report(Series::empty(), DataSource::Unavailable)
            }
        }
    }

    /// `Some` only for a non-empty result; errors and empties are logged.
    fn try_provider(
        &self,
        provider: &dyn HistoryProvider,
        symbol: &Symbol,
        granularity: Granularity,
        request: &HistoryRequest,
    ) -> Option<Series> {
        debug!(%symbol, %granularity, provider = provider.name(), "provider attempt");
        match provider.fetch(symbol, request) {
            Ok(series) if !series.is_empty() => {
                info!(
                    %symbol,
                    %granularity,
                    provider = provider.name(),
                    rows = series.len(),
                    "provider returned rows"
                );
                Some(series)
            }
            Ok(_) => {
                info!(%symbol, %granularity, provider = provider.name(), "provider returned no rows");
                None
            }
            Err(e) => {
                warn!(%symbol, %granularity, provider = provider.name(), "provider failed: {e}");
                None
            }
        }
    }

    fn persist(&self, symbol: &Symbol, granularity: Granularity, series: &Series) {
        if let Err(e) = self.cache.save(symbol, granularity, series) {
            warn!(%symbol, %granularity, "failed to write cache: {e}");
        }
    }
}
