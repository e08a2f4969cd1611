//! Ticker abstraction: the secondary history provider and the quote source
//! for live prices.
//!
//! A [`Ticker`] exposes three views of one instrument: bar history, the
//! consolidated quote (`quoteSummary`, which needs a cookie + crumb
//! handshake), and a lighter fast quote taken from chart metadata.
//! [`YahooTicker`] implements it against Yahoo's `query2` host so that it
//! fails independently of the primary chart provider on `query1`.

use super::headers::{HeaderRotator, RequestIdentity};
use super::http::{CookieSessions, HttpTransport, SessionTransport};
use super::provider::{DataError, HistoryProvider, HistoryRequest};
use super::yahoo::{chart_url, parse_chart, ChartPayload, YAHOO_QUERY1, YAHOO_QUERY2};
use crate::domain::{Series, Symbol};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

const YAHOO_COOKIE_URL: &str = "https://fc.yahoo.com";

/// Consolidated quote fields, in the order they are trusted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteInfo {
    pub regular_market_price: Option<f64>,
    pub current_price: Option<f64>,
    pub previous_close: Option<f64>,
}

impl QuoteInfo {
    /// First positive, finite field: regular-market, current, previous close.
    pub fn best_price(&self) -> Option<f64> {
        [
            self.regular_market_price,
            self.current_price,
            self.previous_close,
        ]
        .into_iter()
        .flatten()
        .find(|p| is_usable_price(*p))
    }
}

/// Lightweight quote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FastQuote {
    pub last_price: Option<f64>,
    pub regular_market_price: Option<f64>,
}

impl FastQuote {
    /// First positive, finite field: last price, then regular-market price.
    pub fn best_price(&self) -> Option<f64> {
        [self.last_price, self.regular_market_price]
            .into_iter()
            .flatten()
            .find(|p| is_usable_price(*p))
    }
}

/// Positive and finite.
pub fn is_usable_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// High-level view of one instrument.
pub trait Ticker: Send + Sync {
    fn history(&self, symbol: &Symbol, request: &HistoryRequest) -> Result<Series, DataError>;

    fn info(&self, symbol: &Symbol) -> Result<QuoteInfo, DataError>;

    fn fast_info(&self, symbol: &Symbol) -> Result<FastQuote, DataError>;
}

// ── quoteSummary models ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResponse {
    quote_summary: QuoteSummary,
}

#[derive(Debug, Deserialize)]
struct QuoteSummary {
    result: Option<Vec<QuoteSummaryResult>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    price: Option<PriceModule>,
    summary_detail: Option<SummaryDetailModule>,
    financial_data: Option<FinancialDataModule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    regular_market_price: Option<RawValue>,
    regular_market_previous_close: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetailModule {
    previous_close: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinancialDataModule {
    current_price: Option<RawValue>,
}

/// Yahoo wraps numbers as `{"raw": 1.0, "fmt": "1.00"}` or `{}`.
#[derive(Debug, Deserialize)]
struct RawValue {
    raw: Option<f64>,
}

fn raw(v: &Option<RawValue>) -> Option<f64> {
    v.as_ref().and_then(|v| v.raw)
}

pub(crate) fn parse_quote_summary(symbol: &Symbol, body: &str) -> Result<QuoteInfo, DataError> {
    let resp: QuoteSummaryResponse = serde_json::from_str(body).map_err(|e| {
        DataError::MalformedResponse(format!("failed to parse quoteSummary for {symbol}: {e}"))
    })?;
    let result = resp
        .quote_summary
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| DataError::Empty {
            symbol: symbol.to_string(),
        })?;

    let regular_market_price = result.price.as_ref().and_then(|p| raw(&p.regular_market_price));
    let current_price = result.financial_data.as_ref().and_then(|f| raw(&f.current_price));
    let previous_close = result
        .summary_detail
        .as_ref()
        .and_then(|s| raw(&s.previous_close))
        .or_else(|| {
            result
                .price
                .as_ref()
                .and_then(|p| raw(&p.regular_market_previous_close))
        });

    Ok(QuoteInfo {
        regular_market_price,
        current_price,
        previous_close,
    })
}

/// Yahoo Finance ticker.
pub struct YahooTicker {
    transport: Arc<dyn HttpTransport>,
    sessions: Arc<dyn SessionTransport>,
    chart_base: String,
    quote_base: String,
    cookie_url: String,
    crumb_url: String,
    timeout: Duration,
    rotator: HeaderRotator,
    rng: Mutex<StdRng>,
}

impl YahooTicker {
    pub fn new(transport: Arc<dyn HttpTransport>, timeout: Duration) -> Self {
        Self {
            transport,
            sessions: Arc::new(CookieSessions),
            chart_base: YAHOO_QUERY2.to_string(),
            quote_base: YAHOO_QUERY2.to_string(),
            cookie_url: YAHOO_COOKIE_URL.to_string(),
            crumb_url: format!("{YAHOO_QUERY1}/v1/test/getcrumb"),
            timeout,
            rotator: HeaderRotator::default(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Sessions used for the cookie + crumb handshake.
    pub fn with_sessions(mut self, sessions: Arc<dyn SessionTransport>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_chart_base(mut self, base: impl Into<String>) -> Self {
        self.chart_base = base.into();
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    fn next_identity(&self) -> RequestIdentity {
        let mut rng = self.rng.lock().unwrap();
        self.rotator.pick(&mut *rng)
    }

    fn chart(&self, symbol: &Symbol, request: &HistoryRequest) -> Result<ChartPayload, DataError> {
        let url = chart_url(&self.chart_base, symbol, request);
        let reply = self.transport.get(&url, &self.next_identity())?;
        match reply.status {
            200 => parse_chart(symbol, &reply.body),
            429 => Err(DataError::RateLimited {
                status: reply.status,
            }),
            status => Err(DataError::HttpStatus { status }),
        }
    }

    /// Cookie + crumb handshake, then one quoteSummary request.
    ///
    /// The session is dropped when this returns.
    fn quote_summary(&self, symbol: &Symbol) -> Result<QuoteInfo, DataError> {
        let identity = self.next_identity();
        let session = self
            .sessions
            .open(&self.cookie_url, identity.header_map(), self.timeout)?;

        let crumb = session.get(&self.crumb_url)?;
        let crumb_value = crumb.body.trim();
        if !crumb.is_success() || crumb_value.is_empty() || crumb_value.contains('<') {
            return Err(DataError::Session(format!(
                "crumb request returned HTTP {}",
                crumb.status
            )));
        }

        let url = reqwest::Url::parse_with_params(
            &format!("{}/v10/finance/quoteSummary/{symbol}", self.quote_base),
            &[
                ("modules", "price,summaryDetail,financialData"),
                ("crumb", crumb_value),
            ],
        )
        .map_err(|e| DataError::Session(format!("invalid quoteSummary url: {e}")))?;

        let reply = session.get(url.as_str())?;
        match reply.status {
            200 => parse_quote_summary(symbol, &reply.body),
            429 => Err(DataError::RateLimited {
                status: reply.status,
            }),
            status => Err(DataError::HttpStatus { status }),
        }
    }
}

impl Ticker for YahooTicker {
    fn history(&self, symbol: &Symbol, request: &HistoryRequest) -> Result<Series, DataError> {
        let payload = self.chart(symbol, request)?;
        debug!(%symbol, rows = payload.series.len(), "ticker history");
        Ok(payload.series)
    }

    fn info(&self, symbol: &Symbol) -> Result<QuoteInfo, DataError> {
        self.quote_summary(symbol)
    }

    fn fast_info(&self, symbol: &Symbol) -> Result<FastQuote, DataError> {
        let payload = self.chart(symbol, &HistoryRequest::intraday("1d", "1d"))?;
        Ok(FastQuote {
            last_price: payload.series.last().map(|b| b.close),
            regular_market_price: payload.meta.regular_market_price,
        })
    }
}

impl HistoryProvider for YahooTicker {
    fn name(&self) -> &str {
        "yahoo_ticker"
    }

    fn fetch(&self, symbol: &Symbol, request: &HistoryRequest) -> Result<Series, DataError> {
        self.history(symbol, request)
    }
}
