//! Market-data acquisition: providers, retry, cache, orchestration, live price

pub mod cache;
pub mod canonicalize;
pub mod clock;
pub mod headers;
pub mod http;
pub mod live;
pub mod nse;
pub mod orchestrator;
pub mod provider;
pub mod retry;
pub mod ticker;
pub mod yahoo;

pub use cache::{CacheStatus, CsvCache};
pub use canonicalize::Canonicalizer;
pub use clock::{Clock, ManualClock, RecordingSleeper, Sleeper, SystemClock, ThreadSleeper};
pub use headers::{HeaderRotator, RequestIdentity};
pub use http::{
    BlockingTransport, CookieSessions, HttpReply, HttpSession, HttpTransport, ScopedSession,
    SessionTransport,
};
pub use live::{LivePriceResolver, LivePriceSample, LiveTier, SpotSource};
pub use nse::NseSpotProvider;
pub use orchestrator::{FetchOrchestrator, FetchReport};
pub use provider::{DataError, DataSource, HistoryProvider, HistoryRange, HistoryRequest};
pub use retry::{AttemptOutcome, RetryDecision, RetryPolicy, RetryState};
pub use ticker::{FastQuote, QuoteInfo, Ticker, YahooTicker};
pub use yahoo::{ChartMeta, YahooChartProvider};
