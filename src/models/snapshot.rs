use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Asset, ExchangeId};

/// Per-exchange breakdown: exchange -> symbol -> priced asset.
pub type ExchangeAssets = BTreeMap<ExchangeId, BTreeMap<String, Asset>>;

/// Portfolio-wide totals in quote currency.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total: Decimal,
    pub profit: Decimal,
    pub initial: Decimal,
    /// `profit / initial * 100`, or zero when nothing was invested.
    pub roi: Decimal,
}

impl PortfolioSummary {
    pub fn from_totals(total: Decimal, profit: Decimal, initial: Decimal) -> Self {
        let roi = if initial.is_zero() {
            Decimal::ZERO
        } else {
            profit
                .checked_div(initial)
                .map(|ratio| (ratio * Decimal::ONE_HUNDRED).normalize())
                .unwrap_or(Decimal::ZERO)
        };
        Self {
            total,
            profit,
            initial,
            roi,
        }
    }
}

/// Running sums used while rolling assets into a [`PortfolioSummary`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryTotals {
    total: Decimal,
    profit: Decimal,
    initial: Decimal,
}

impl SummaryTotals {
    pub fn add(&mut self, value: Decimal, profit: Decimal, initial: Decimal) {
        self.total += value;
        self.profit += profit;
        self.initial += initial;
    }

    pub fn add_asset(&mut self, asset: &Asset) {
        self.add(asset.value, asset.profit, asset.initial_cost());
    }

    pub fn finish(self) -> PortfolioSummary {
        PortfolioSummary::from_totals(self.total, self.profit, self.initial)
    }
}

/// How a snapshot came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOrigin {
    /// Written by a live valuation pass.
    #[default]
    Live,
    /// Written by the scheduled end-of-day job from daily closes.
    EndOfDay,
    /// Reconstructed from historical closes applied to current holdings.
    Backfill,
}

/// One persisted, day-aligned portfolio valuation.
///
/// At most one snapshot exists per `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// UTC day start, epoch milliseconds.
    pub timestamp: i64,
    pub summary: PortfolioSummary,
    /// Unfiltered breakdown of the valuation; empty for synthetic snapshots.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exchanges: ExchangeAssets,
    /// Epoch milliseconds of the last write.
    pub update_time: i64,
    #[serde(default)]
    pub origin: SnapshotOrigin,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn test_summary_roi_is_zero_without_initial() {
        let summary = PortfolioSummary::from_totals(dec("100"), dec("0"), Decimal::ZERO);
        assert_eq!(summary.roi, Decimal::ZERO);
    }

    #[test]
    fn test_summary_roi_percent() {
        let summary = PortfolioSummary::from_totals(dec("22500"), dec("12500"), dec("10000"));
        assert_eq!(summary.roi, dec("125"));
    }

    #[test]
    fn test_snapshot_document_shape() {
        let snapshot = Snapshot {
            timestamp: 1_733_529_600_000,
            summary: PortfolioSummary::from_totals(dec("150.5"), dec("50.5"), dec("100")),
            exchanges: ExchangeAssets::new(),
            update_time: 1_733_530_000_000,
            origin: SnapshotOrigin::Backfill,
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["timestamp"], 1_733_529_600_000_i64);
        assert_eq!(json["summary"]["total"], "150.5");
        assert_eq!(json["summary"]["roi"], "50.5");
        assert_eq!(json["origin"], "backfill");
        assert!(json.get("exchanges").is_none());
    }

    #[test]
    fn test_snapshot_without_origin_defaults_to_live() {
        let json = r#"{
            "timestamp": 0,
            "summary": {"total": "1", "profit": "0", "initial": "1", "roi": "0"},
            "update_time": 5
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.origin, SnapshotOrigin::Live);
        assert!(snapshot.exchanges.is_empty());
    }
}
