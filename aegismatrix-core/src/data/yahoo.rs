//! Yahoo Finance chart endpoint: the primary history provider.
//!
//! Fetches OHLCV bars from the v8 chart API. Handles rate limiting, retries
//! with backoff (see [`super::retry`]), per-attempt header rotation and
//! response parsing.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes. The ticker provider is the fallback when this one yields nothing.

use super::clock::Sleeper;
use super::headers::{HeaderRotator, RequestIdentity};
use super::http::HttpTransport;
use super::provider::{DataError, HistoryProvider, HistoryRequest};
use super::retry::{AttemptOutcome, RetryDecision, RetryPolicy, RetryState};
use crate::domain::{Bar, Series, Symbol};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

pub const YAHOO_QUERY1: &str = "https://query1.finance.yahoo.com";
pub const YAHOO_QUERY2: &str = "https://query2.finance.yahoo.com";

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
    #[serde(default)]
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteData>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Quote fields Yahoo attaches to every chart result.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    pub regular_market_price: Option<f64>,
    pub chart_previous_close: Option<f64>,
    pub previous_close: Option<f64>,
}

/// Parsed chart body: cleaned rows plus the quote metadata.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChartPayload {
    pub series: Series,
    pub meta: ChartMeta,
}

/// Parse a chart body.
///
/// Bad JSON, missing `chart`/`indicators` keys, or a close column not aligned
/// with the timestamps is a [`DataError::MalformedResponse`]. A well-formed
/// body with no result, no timestamps or no complete rows parses to an empty
/// series.
pub(crate) fn parse_chart(symbol: &Symbol, body: &str) -> Result<ChartPayload, DataError> {
    let resp: ChartResponse = serde_json::from_str(body).map_err(|e| {
        DataError::MalformedResponse(format!("failed to parse chart for {symbol}: {e}"))
    })?;

    let data = match resp.chart.result.and_then(|r| r.into_iter().next()) {
        Some(data) => data,
        None => {
            if let Some(err) = resp.chart.error {
                warn!(%symbol, code = %err.code, "chart error: {}", err.description);
            } else {
                warn!(%symbol, "no data in chart response");
            }
            return Ok(ChartPayload::default());
        }
    };

    let timestamps = data.timestamp.unwrap_or_default();
    let quote = data.indicators.quote.into_iter().next();
    let quote = match quote {
        Some(q) if !timestamps.is_empty() => q,
        _ => {
            warn!(%symbol, "empty timestamps or quotes");
            return Ok(ChartPayload {
                series: Series::empty(),
                meta: data.meta,
            });
        }
    };

    if quote.close.len() != timestamps.len() {
        return Err(DataError::MalformedResponse(format!(
            "{symbol}: {} timestamps but {} closes",
            timestamps.len(),
            quote.close.len()
        )));
    }

    let field = |col: &[Option<f64>], i: usize| col.get(i).copied().flatten();
    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let Some(timestamp) = chrono::DateTime::from_timestamp(ts, 0) else {
            continue;
        };
        // Rows with any missing field are dropped
        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
            field(&quote.open, i),
            field(&quote.high, i),
            field(&quote.low, i),
            field(&quote.close, i),
            field(&quote.volume, i),
        ) else {
            continue;
        };
        bars.push(Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    Ok(ChartPayload {
        series: Series::from_bars(bars),
        meta: data.meta,
    })
}

/// Chart URL for a symbol and request against `base`.
pub(crate) fn chart_url(base: &str, symbol: &Symbol, request: &HistoryRequest) -> String {
    let query = request
        .query_params()
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{base}/v8/finance/chart/{symbol}?{query}")
}

/// Yahoo Finance chart provider.
pub struct YahooChartProvider {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    rotator: HeaderRotator,
    rng: Mutex<StdRng>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl YahooChartProvider {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            transport,
            base_url: YAHOO_QUERY1.to_string(),
            rotator: HeaderRotator::default(),
            rng: Mutex::new(StdRng::from_entropy()),
            policy,
            sleeper,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Deterministic header rotation.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn chart_url(&self, symbol: &Symbol, request: &HistoryRequest) -> String {
        chart_url(&self.base_url, symbol, request)
    }

    fn next_identity(&self) -> RequestIdentity {
        let mut rng = self.rng.lock().unwrap();
        self.rotator.pick(&mut *rng)
    }

    /// One GET + parse. Status codes are mapped onto the error taxonomy.
    fn attempt(&self, symbol: &Symbol, url: &str) -> Result<Series, DataError> {
        let identity = self.next_identity();
        let reply = self.transport.get(url, &identity)?;
        if reply.status == 429 {
            return Err(DataError::RateLimited {
                status: reply.status,
            });
        }
        if reply.status != 200 {
            return Err(DataError::HttpStatus {
                status: reply.status,
            });
        }
        parse_chart(symbol, &reply.body).map(|payload| payload.series)
    }

    /// Execute the request with the retry state machine driving the loop.
    fn fetch_with_retry(
        &self,
        symbol: &Symbol,
        request: &HistoryRequest,
    ) -> Result<Series, DataError> {
        let url = self.chart_url(symbol, request);
        let mut state = RetryState::new(self.policy);

        loop {
            let attempt = state.attempt();
            let result = self.attempt(symbol, &url);
            let outcome = match &result {
                Ok(series) if series.is_empty() => AttemptOutcome::Empty,
                Ok(_) => AttemptOutcome::Rows,
                Err(e) => e.outcome(),
            };

            match state.record(outcome) {
                RetryDecision::Done => {
                    let rows = result.as_ref().map(Series::len).unwrap_or(0);
                    info!(%symbol, rows, attempt, "fetched rows from chart API");
                    return result;
                }
                RetryDecision::RetryAfter(delay) => {
                    if let Err(e) = &result {
                        match outcome {
                            AttemptOutcome::RateLimited => warn!(
                                %symbol,
                                attempt,
                                max = state.max_attempts(),
                                delay_ms = delay.as_millis() as u64,
                                "rate limited by Yahoo; backing off"
                            ),
                            _ => debug!(%symbol, attempt, "attempt failed: {e}"),
                        }
                    }
                    if !delay.is_zero() {
                        self.sleeper.sleep(delay);
                    }
                }
                RetryDecision::GiveUp => {
                    match &result {
                        Ok(_) => info!(%symbol, attempt, "chart API returned no usable rows"),
                        Err(e) if outcome == AttemptOutcome::Malformed => {
                            warn!(%symbol, attempt, "malformed chart response, not retrying: {e}")
                        }
                        Err(e) => {
                            error!(%symbol, attempts = attempt, "chart fetch failed after retries: {e}")
                        }
                    }
                    return result;
                }
            }
        }
    }
}

impl HistoryProvider for YahooChartProvider {
    fn name(&self) -> &str {
        "yahoo_chart"
    }

    fn fetch(&self, symbol: &Symbol, request: &HistoryRequest) -> Result<Series, DataError> {
        self.fetch_with_retry(symbol, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::clock::RecordingSleeper;
    use crate::data::http::HttpReply;
    use std::collections::VecDeque;
    use std::time::Duration;

    const CHART_OK: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"regularMarketPrice": 22150.5, "chartPreviousClose": 22010.0},
                "timestamp": [1718000000, 1718086400, 1718172800],
                "indicators": {"quote": [{
                    "open":   [22000.0, 22100.0, null],
                    "high":   [22200.0, 22250.0, 22300.0],
                    "low":    [21950.0, 22050.0, 22100.0],
                    "close":  [22100.0, 22150.5, 22200.0],
                    "volume": [0, 0, 0]
                }]}
            }],
            "error": null
        }
    }"#;

    /// Transport that replays a fixed script and records what it was asked.
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<HttpReply, DataError>>>,
        calls: Mutex<Vec<(String, &'static str)>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<HttpReply, DataError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn get(&self, url: &str, identity: &RequestIdentity) -> Result<HttpReply, DataError> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), identity.user_agent));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(DataError::Transport("script exhausted".into())))
        }
    }

    fn reply(status: u16, body: &str) -> Result<HttpReply, DataError> {
        Ok(HttpReply {
            status,
            body: body.to_string(),
        })
    }

    fn provider(
        transport: Arc<ScriptedTransport>,
        sleeper: Arc<RecordingSleeper>,
    ) -> YahooChartProvider {
        YahooChartProvider::new(transport, RetryPolicy::default(), sleeper).with_rng_seed(9)
    }

    fn nifty() -> Symbol {
        Symbol::new("^NSEI")
    }

    #[test]
    fn parse_drops_incomplete_rows() {
        let payload = parse_chart(&nifty(), CHART_OK).unwrap();
        assert_eq!(payload.series.len(), 2);
        assert_eq!(payload.series.last().unwrap().close, 22150.5);
        assert_eq!(payload.meta.regular_market_price, Some(22150.5));
    }

    #[test]
    fn parse_bad_json_is_malformed() {
        let err = parse_chart(&nifty(), "<html>blocked</html>").unwrap_err();
        assert!(matches!(err, DataError::MalformedResponse(_)));
    }

    #[test]
    fn parse_missing_indicators_is_malformed() {
        let body = r#"{"chart":{"result":[{"timestamp":[1]}],"error":null}}"#;
        assert!(matches!(
            parse_chart(&nifty(), body),
            Err(DataError::MalformedResponse(_))
        ));
    }

    #[test]
    fn parse_misaligned_quote_is_malformed() {
        let body = r#"{"chart":{"result":[{"timestamp":[1,2],
            "indicators":{"quote":[{"open":[1.0],"high":[1.0],"low":[1.0],"close":[1.0],"volume":[1]}]}}],
            "error":null}}"#;
        assert!(matches!(
            parse_chart(&nifty(), body),
            Err(DataError::MalformedResponse(_))
        ));
    }

    #[test]
    fn parse_not_found_is_empty() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let payload = parse_chart(&nifty(), body).unwrap();
        assert!(payload.series.is_empty());
    }

    #[test]
    fn url_uses_range_for_intraday_and_dates_for_daily() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let p = provider(transport, Arc::new(RecordingSleeper::new()));

        let intraday = p.chart_url(&nifty(), &HistoryRequest::intraday("5d", "5m"));
        assert_eq!(
            intraday,
            "https://query1.finance.yahoo.com/v8/finance/chart/^NSEI?interval=5m&range=5d"
        );

        let now = chrono::DateTime::from_timestamp(1_718_000_000, 0).unwrap();
        let daily = p.chart_url(&nifty(), &HistoryRequest::daily(1, now));
        assert!(daily.contains("interval=1d"));
        assert!(daily.contains("period2=1718000000"));
        assert!(!daily.contains("range="));
    }

    #[test]
    fn three_rate_limits_back_off_then_give_up() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            reply(429, ""),
            reply(429, ""),
            reply(429, ""),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let p = provider(transport.clone(), sleeper.clone());

        let err = p
            .fetch(&nifty(), &HistoryRequest::intraday("5d", "5m"))
            .unwrap_err();

        assert!(matches!(err, DataError::RateLimited { status: 429 }));
        assert_eq!(transport.calls(), 3);
        let sleeps = sleeper.sleeps();
        assert!(sleeps.len() >= 2);
        assert!(sleeps.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sleeps, vec![Duration::from_secs(2), Duration::from_secs(4)]);
    }

    #[test]
    fn recovers_after_transport_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(DataError::Transport("connection refused".into())),
            reply(200, CHART_OK),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let p = provider(transport.clone(), sleeper.clone());

        let series = p
            .fetch(&nifty(), &HistoryRequest::intraday("5d", "5m"))
            .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn malformed_body_is_attempted_once() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            reply(200, "not json"),
            reply(200, CHART_OK),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let p = provider(transport.clone(), sleeper.clone());

        let result = p.fetch(&nifty(), &HistoryRequest::intraday("5d", "5m"));
        assert!(matches!(result, Err(DataError::MalformedResponse(_))));
        assert_eq!(transport.calls(), 1);
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn empty_result_is_ok_and_not_retried() {
        let body = r#"{"chart":{"result":[{"timestamp":[],"indicators":{"quote":[{}]}}],"error":null}}"#;
        let transport = Arc::new(ScriptedTransport::new(vec![reply(200, body)]));
        let p = provider(transport.clone(), Arc::new(RecordingSleeper::new()));

        let series = p
            .fetch(&nifty(), &HistoryRequest::intraday("5d", "5m"))
            .unwrap();
        assert!(series.is_empty());
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn server_error_retries_without_sleep() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            reply(503, ""),
            reply(200, CHART_OK),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let p = provider(transport.clone(), sleeper.clone());

        assert!(p
            .fetch(&nifty(), &HistoryRequest::intraday("5d", "5m"))
            .is_ok());
        assert_eq!(transport.calls(), 2);
        assert!(sleeper.sleeps().is_empty());
    }
}
