//! Market snapshot assembly: the two daily series the downstream models
//! consume, and the latest/previous closes pulled from them.

use crate::config::AcquisitionConfig;
use crate::data::FetchOrchestrator;
use crate::domain::{Series, Symbol};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    #[error("insufficient history for {symbol}: need at least 2 rows, got {rows}")]
    InsufficientHistory { symbol: String, rows: usize },
}

/// Last two closes of the index and the volatility index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatestValues {
    pub latest_spot: f64,
    pub prev_spot: f64,
    pub latest_vix: f64,
    pub prev_vix: f64,
}

impl LatestValues {
    /// Both series need at least two rows.
    pub fn from_series(
        index_symbol: &Symbol,
        index: &Series,
        volatility_symbol: &Symbol,
        volatility: &Series,
    ) -> Result<Self, SnapshotError> {
        let (latest_spot, prev_spot) = last_two_closes(index_symbol, index)?;
        let (latest_vix, prev_vix) = last_two_closes(volatility_symbol, volatility)?;
        Ok(Self {
            latest_spot,
            prev_spot,
            latest_vix,
            prev_vix,
        })
    }

    pub fn spot_block(&self) -> MarketBlock {
        MarketBlock::from_closes(self.latest_spot, self.prev_spot)
    }

    pub fn vix_block(&self) -> MarketBlock {
        MarketBlock::from_closes(self.latest_vix, self.prev_vix)
    }
}

fn last_two_closes(symbol: &Symbol, series: &Series) -> Result<(f64, f64), SnapshotError> {
    match (series.close_from_end(0), series.close_from_end(1)) {
        (Some(latest), Some(prev)) => Ok((latest, prev)),
        _ => Err(SnapshotError::InsufficientHistory {
            symbol: symbol.to_string(),
            rows: series.len(),
        }),
    }
}

/// Spot level and its change against the previous close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketBlock {
    pub spot: f64,
    pub spot_change: f64,
    /// Fractional change, `spot_change / prev_close` (0.01 is one percent).
    pub spot_change_pct: f64,
}

impl MarketBlock {
    pub fn from_closes(latest: f64, prev: f64) -> Self {
        let spot_change = latest - prev;
        Self {
            spot: latest,
            spot_change,
            spot_change_pct: pct_change(spot_change, prev),
        }
    }

    /// Previous close implied by the block.
    pub fn prev_close(&self) -> f64 {
        self.spot - self.spot_change
    }

    /// Re-base the block on a live price. Missing, non-positive or non-finite
    /// prices leave it untouched; returns whether it changed.
    pub fn apply_live_price(&mut self, price: Option<f64>) -> bool {
        let Some(price) = price.filter(|p| p.is_finite() && *p > 0.0) else {
            return false;
        };
        *self = Self::from_closes(price, self.prev_close());
        true
    }
}

/// Zero unless the base is positive.
fn pct_change(change: f64, base: f64) -> f64 {
    if base > 0.0 {
        change / base
    } else {
        0.0
    }
}

/// Daily index and volatility series for one run.
pub struct MarketSnapshot {
    orchestrator: Arc<FetchOrchestrator>,
    index: Symbol,
    volatility: Symbol,
    lookback_years: u32,
    force_refresh: bool,
}

impl MarketSnapshot {
    pub fn new(
        orchestrator: Arc<FetchOrchestrator>,
        index: Symbol,
        volatility: Symbol,
        lookback_years: u32,
    ) -> Self {
        Self {
            orchestrator,
            index,
            volatility,
            lookback_years,
            force_refresh: false,
        }
    }

    pub fn from_config(orchestrator: Arc<FetchOrchestrator>, config: &AcquisitionConfig) -> Self {
        Self::new(
            orchestrator,
            config.index_symbol.clone(),
            config.volatility_symbol.clone(),
            config.lookback_years,
        )
    }

    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn index(&self) -> &Symbol {
        &self.index
    }

    pub fn volatility(&self) -> &Symbol {
        &self.volatility
    }

    /// Daily series for the index and the volatility index, fetched in
    /// parallel. Either may be empty.
    pub fn get_market_snapshots(&self) -> (Series, Series) {
        let (index, volatility) = rayon::join(
            || {
                self.orchestrator
                    .fetch_daily_history(&self.index, self.lookback_years, self.force_refresh)
            },
            || {
                self.orchestrator.fetch_daily_history(
                    &self.volatility,
                    self.lookback_years,
                    self.force_refresh,
                )
            },
        );
        debug!(
            index_rows = index.len(),
            volatility_rows = volatility.len(),
            "market snapshots fetched"
        );
        (index, volatility)
    }

    /// Latest and previous closes of both series.
    pub fn get_latest_values(&self) -> Result<LatestValues, SnapshotError> {
        let (index, volatility) = self.get_market_snapshots();
        let values = LatestValues::from_series(&self.index, &index, &self.volatility, &volatility)?;
        info!(
            latest_spot = values.latest_spot,
            prev_spot = values.prev_spot,
            latest_vix = values.latest_vix,
            prev_vix = values.prev_vix,
            "latest values"
        );
        Ok(values)
    }
}
