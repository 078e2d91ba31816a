// src/portfolio/models.rs
use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{ExchangeAssets, ExchangeId, PortfolioSummary, Snapshot, SnapshotOrigin};

/// Which price an asset is valued at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingMode {
    /// Current ticker price.
    Live,
    /// Close of the given day-aligned timestamp.
    DailyClose { day: i64 },
}

/// An account or symbol left out of a valuation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationFailure {
    pub exchange: ExchangeId,
    /// `None` when the whole account failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub reason: String,
}

/// Outcome of valuing every account, before any filtering.
#[derive(Debug, Clone, Default)]
pub struct Valuation {
    /// Epoch milliseconds at which the pass started.
    pub update_time: i64,
    pub exchanges: ExchangeAssets,
    pub summary: PortfolioSummary,
    pub failures: Vec<ValuationFailure>,
}

impl Valuation {
    pub fn asset_count(&self) -> usize {
        self.exchanges.values().map(BTreeMap::len).sum()
    }

    pub fn into_snapshot(self, timestamp: i64, origin: SnapshotOrigin) -> Snapshot {
        Snapshot {
            timestamp,
            summary: self.summary,
            exchanges: self.exchanges,
            update_time: self.update_time,
            origin,
        }
    }
}

/// Current portfolio as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioReport {
    /// Day-aligned timestamp of the snapshot this report belongs to.
    pub timestamp: i64,
    pub update_time: i64,
    /// Breakdown filtered by the requested minimum value.
    pub exchanges: ExchangeAssets,
    /// Totals over every valued asset, filtered or not.
    pub summary: PortfolioSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ValuationFailure>,
    /// True when served from a stored snapshot without contacting exchanges.
    pub cached: bool,
}

impl PortfolioReport {
    pub fn from_snapshot(
        snapshot: &Snapshot,
        min_value: Decimal,
        pegged: &BTreeSet<String>,
        cached: bool,
    ) -> Self {
        Self {
            timestamp: snapshot.timestamp,
            update_time: snapshot.update_time,
            exchanges: filter_breakdown(&snapshot.exchanges, min_value, pegged),
            summary: snapshot.summary.clone(),
            failures: Vec::new(),
            cached,
        }
    }
}

/// Drop assets worth less than `min_value`, keeping pegged holdings and
/// exchanges left with no assets.
pub fn filter_breakdown(
    exchanges: &ExchangeAssets,
    min_value: Decimal,
    pegged: &BTreeSet<String>,
) -> ExchangeAssets {
    exchanges
        .iter()
        .map(|(exchange, assets)| {
            let kept = assets
                .iter()
                .filter(|(symbol, asset)| pegged.contains(*symbol) || asset.value >= min_value)
                .map(|(symbol, asset)| (symbol.clone(), asset.clone()))
                .collect();
            (exchange.clone(), kept)
        })
        .collect()
}
