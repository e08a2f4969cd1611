//! AegisMatrix Core: market-data acquisition for the daily snapshot.
//!
//! This crate fetches and caches the time series the downstream models need:
//! - Domain types (symbols, bars, canonical series)
//! - Yahoo chart provider with rate-limit backoff
//! - Ticker fallback (history, consolidated quote, fast quote)
//! - NSE option-chain spot through a scoped cookie session
//! - Per-symbol CSV cache with freshness rules
//! - Fetch orchestration with stale-cache serving
//! - Tiered live-price resolution
//! - Market snapshot assembly

pub mod config;
pub mod data;
pub mod domain;
pub mod snapshot;

pub use config::{AcquisitionConfig, ConfigError};
pub use data::{DataError, DataSource, FetchOrchestrator, FetchReport, LivePriceResolver};
pub use domain::{Bar, Granularity, Series, Symbol};
pub use snapshot::{LatestValues, MarketBlock, MarketSnapshot, SnapshotError};
