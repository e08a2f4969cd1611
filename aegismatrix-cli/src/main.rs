//! AegisMatrix CLI: fetch, live price, latest values and cache commands.
//!
//! Commands:
//! - `daily`: daily history for a symbol through cache → primary → secondary
//! - `intraday`: intraday history over a relative period
//! - `live`: tiered live price for a symbol
//! - `latest`: latest/previous closes of the index and volatility index
//! - `cache status`: cached rows, date range and freshness per symbol

use aegismatrix_core::data::{
    BlockingTransport, CacheStatus, Clock, CsvCache, FetchOrchestrator, FetchReport,
    HistoryRequest, LivePriceResolver, SystemClock, ThreadSleeper, YahooTicker,
};
use aegismatrix_core::{AcquisitionConfig, Granularity, MarketSnapshot, Symbol};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "aegismatrix",
    about = "AegisMatrix CLI: market-data acquisition for the daily snapshot"
)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory, overriding the config file.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch daily history.
    Daily {
        /// Symbol (e.g., ^NSEI). Defaults to the configured index.
        symbol: Option<String>,

        /// Years of history. Defaults to the configured lookback.
        #[arg(long)]
        years: Option<u32>,

        /// Ignore a fresh cache entry.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Fetch intraday history.
    Intraday {
        /// Symbol (e.g., ^NSEI). Defaults to the configured index.
        symbol: Option<String>,

        /// Relative period (e.g., 1d, 5d). Defaults to the configured period.
        #[arg(long)]
        period: Option<String>,

        /// Bar interval (e.g., 1m, 5m). Defaults to the configured interval.
        #[arg(long)]
        interval: Option<String>,

        /// Ignore a fresh cache entry.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Resolve the current price of a symbol.
    Live {
        /// Symbol (e.g., ^NSEI). Defaults to the configured index.
        symbol: Option<String>,
    },
    /// Latest and previous closes of the index and volatility index.
    Latest {
        /// Re-base the spot block on the live price.
        #[arg(long, default_value_t = false)]
        live: bool,

        /// Ignore fresh cache entries.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached rows, date range and freshness.
    Status {
        /// Symbols to report. Defaults to the index and volatility index.
        symbols: Vec<String>,

        /// Report intraday entries instead of daily ones.
        #[arg(long, default_value_t = false)]
        intraday: bool,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.cache_dir)?;

    match cli.command {
        Commands::Daily {
            symbol,
            years,
            force,
        } => run_daily(&config, symbol, years, force),
        Commands::Intraday {
            symbol,
            period,
            interval,
            force,
        } => run_intraday(&config, symbol, period, interval, force),
        Commands::Live { symbol } => run_live(&config, symbol),
        Commands::Latest { live, force } => run_latest(&config, live, force),
        Commands::Cache { action } => match action {
            CacheAction::Status { symbols, intraday } => {
                run_cache_status(&config, symbols, intraday)
            }
        },
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        // Filter messages based on the INFO level
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        // Keep stdout for command output
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions))
        .init()
}

fn load_config(path: Option<&Path>, cache_dir: Option<PathBuf>) -> Result<AcquisitionConfig> {
    let mut config = match path {
        Some(path) => AcquisitionConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AcquisitionConfig::default(),
    };
    if let Some(dir) = cache_dir {
        config.cache_dir = dir;
    }
    Ok(config)
}

fn symbol_or_index(config: &AcquisitionConfig, symbol: Option<String>) -> Symbol {
    symbol
        .map(Symbol::new)
        .unwrap_or_else(|| config.index_symbol.clone())
}

fn run_daily(
    config: &AcquisitionConfig,
    symbol: Option<String>,
    years: Option<u32>,
    force: bool,
) -> Result<()> {
    let symbol = symbol_or_index(config, symbol);
    let years = years.unwrap_or(config.lookback_years);
    let orchestrator = FetchOrchestrator::from_config(config)?;
    let request = HistoryRequest::daily(years, orchestrator.clock().now());

    let report = orchestrator.fetch(&symbol, Granularity::Daily, &request, force);
    print_report(&report)
}

fn run_intraday(
    config: &AcquisitionConfig,
    symbol: Option<String>,
    period: Option<String>,
    interval: Option<String>,
    force: bool,
) -> Result<()> {
    let symbol = symbol_or_index(config, symbol);
    let period = period.unwrap_or_else(|| config.intraday_period.clone());
    let interval = interval.unwrap_or_else(|| config.intraday_interval.clone());
    let orchestrator = FetchOrchestrator::from_config(config)?;
    let request = HistoryRequest::intraday(period, interval);

    let report = orchestrator.fetch(&symbol, Granularity::Intraday, &request, force);
    print_report(&report)
}

fn print_report(report: &FetchReport) -> Result<()> {
    let series = &report.series;
    let summary = json!({
        "symbol": report.symbol,
        "granularity": report.granularity,
        "source": report.source,
        "rows": series.len(),
        "first": series.first().map(|b| b.timestamp),
        "last": series.last().map(|b| b.timestamp),
        "last_close": series.last().map(|b| b.close),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if series.is_empty() {
        bail!("no data available for {}", report.symbol);
    }
    Ok(())
}

fn live_resolver(config: &AcquisitionConfig) -> Result<LivePriceResolver> {
    let timeout = config.http.request_timeout();
    let transport = Arc::new(BlockingTransport::new(timeout)?);
    let ticker = Arc::new(YahooTicker::new(transport, timeout));
    let resolver = LivePriceResolver::new(ticker, Arc::new(SystemClock));
    if config.exchange_spot {
        return Ok(resolver.with_nse_spot(
            config.index_symbol.clone(),
            config.http.session_timeout(),
            Arc::new(ThreadSleeper),
        ));
    }
    Ok(resolver)
}

fn run_live(config: &AcquisitionConfig, symbol: Option<String>) -> Result<()> {
    let symbol = symbol_or_index(config, symbol);
    let resolver = live_resolver(config)?;

    let Some(sample) = resolver.get_live_price(&symbol) else {
        bail!("could not resolve a live price for {symbol}");
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "symbol": symbol, "live": sample }))?
    );
    Ok(())
}

fn run_latest(config: &AcquisitionConfig, live: bool, force: bool) -> Result<()> {
    let orchestrator = Arc::new(FetchOrchestrator::from_config(config)?);
    let snapshot = MarketSnapshot::from_config(orchestrator, config).with_force_refresh(force);
    let values = snapshot.get_latest_values()?;

    let mut spot = values.spot_block();
    if live {
        let price = live_resolver(config)?
            .get_live_price(snapshot.index())
            .map(|sample| sample.price);
        if spot.apply_live_price(price) {
            info!(spot = spot.spot, "spot re-based on live price");
        }
    }

    let out = json!({
        "index": snapshot.index(),
        "volatility": snapshot.volatility(),
        "values": values,
        "spot": spot,
        "vix": values.vix_block(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run_cache_status(
    config: &AcquisitionConfig,
    symbols: Vec<String>,
    intraday: bool,
) -> Result<()> {
    let symbols: Vec<Symbol> = if symbols.is_empty() {
        vec![
            config.index_symbol.clone(),
            config.volatility_symbol.clone(),
        ]
    } else {
        symbols.into_iter().map(Symbol::new).collect()
    };
    let granularity = if intraday {
        Granularity::Intraday
    } else {
        Granularity::Daily
    };

    let cache = CsvCache::new(&config.cache_dir, Arc::new(SystemClock))
        .with_intraday_freshness(config.intraday_freshness());
    let statuses = cache.status(&symbols, granularity);

    println!("Cache directory: {}", config.cache_dir.display());
    for status in &statuses {
        print_status(status);
    }
    Ok(())
}

fn print_status(status: &CacheStatus) {
    if !status.cached {
        println!(
            "  {:<12} {:<9} not cached",
            status.symbol.as_str(),
            status.granularity.as_str()
        );
        return;
    }
    let date = |d: Option<chrono::DateTime<chrono::Utc>>| {
        d.map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into())
    };
    println!(
        "  {:<12} {:<9} {:>6} rows  {} → {}  modified {}  {}",
        status.symbol.as_str(),
        status.granularity.as_str(),
        status.rows,
        date(status.first),
        date(status.last),
        date(status.modified),
        if status.fresh { "fresh" } else { "stale" },
    );
}
