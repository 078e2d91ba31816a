// src/portfolio/history.rs
//! Reconstruction of missing daily snapshots.
//!
//! Historical balances are not available, so missing days are valued by
//! applying each day's close to the *current* holdings. Holdings bought after
//! a reconstructed day therefore show up on it, and holdings sold before now
//! are invisible.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::exchange::{bounded, ExchangeClient};
use crate::models::{
    days_between, Asset, ExchangeAssets, ExchangeId, Snapshot, SnapshotOrigin, SummaryTotals,
    DAY_MS,
};
use crate::storage::Storage;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Day-aligned `(start, end)` covering `period_days` days that end today.
pub fn history_window(today_start: i64, period_days: u32) -> (i64, i64) {
    let span = i64::from(period_days.saturating_sub(1)) * DAY_MS;
    (today_start - span, today_start)
}

/// Days in `start..=end` with no stored snapshot, ascending.
pub fn missing_days(start: i64, end: i64, stored: &[Snapshot]) -> Vec<i64> {
    let present: BTreeSet<i64> = stored.iter().map(|s| s.timestamp).collect();
    days_between(start, end)
        .filter(|day| !present.contains(day))
        .collect()
}

/// Union of stored and synthetic snapshots, ascending and one per day.
/// Stored snapshots win over synthetic ones for the same day.
pub fn merge_history(stored: Vec<Snapshot>, synthetic: Vec<Snapshot>) -> Vec<Snapshot> {
    let mut merged = stored;
    merged.extend(synthetic);
    merged.sort_by_key(|s| s.timestamp);
    merged.dedup_by_key(|s| s.timestamp);
    merged
}

pub struct HistoryBackfill {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl HistoryBackfill {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn window(&self, period_days: u32) -> (i64, i64) {
        history_window(self.clock.today_start_ms(), period_days)
    }

    /// Stored snapshots in the window. A failed read yields none.
    pub async fn stored(&self, start: i64, end: i64) -> Vec<Snapshot> {
        match self.storage.snapshots_in_range(start, end).await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!(start, end, error = %e, "snapshot range read failed; treating as empty");
                Vec::new()
            }
        }
    }

    /// Build a synthetic snapshot for every day in `missing`. Nothing is
    /// stored; see [`persist`](Self::persist).
    ///
    /// One price-history request is made per non-pegged holding, all
    /// concurrently. A holding without a close for some day is left out of
    /// that day's totals; pegged holdings always count at 1:1.
    pub async fn reconstruct(
        &self,
        accounts: &[Arc<dyn ExchangeClient>],
        holdings: &ExchangeAssets,
        pegged: &BTreeSet<String>,
        missing: &[i64],
    ) -> Vec<Snapshot> {
        let (Some(&since), Some(&until)) = (missing.iter().min(), missing.iter().max()) else {
            return Vec::new();
        };

        let clients: HashMap<&ExchangeId, &dyn ExchangeClient> = accounts
            .iter()
            .map(|client| (client.id(), client.as_ref()))
            .collect();

        let (fixed, priced): (Vec<&Asset>, Vec<&Asset>) = holdings
            .values()
            .flat_map(BTreeMap::values)
            .partition(|asset| pegged.contains(&asset.symbol));

        let histories = join_all(priced.into_iter().map(|asset| {
            let client = clients.get(&asset.exchange).copied();
            async move { (asset, self.daily_closes(client, asset, since, until).await) }
        }))
        .await;

        let update_time = self.clock.now_ms();
        let mut synthetic = Vec::with_capacity(missing.len());

        for &day in missing {
            let mut totals = SummaryTotals::default();
            for asset in &fixed {
                let initial = asset.initial_cost();
                totals.add(asset.total, asset.total - initial, initial);
            }
            for (asset, closes) in &histories {
                if let Some(close) = closes.get(&day) {
                    let value = asset.total * *close;
                    let initial = asset.initial_cost();
                    totals.add(value, value - initial, initial);
                }
            }

            synthetic.push(Snapshot {
                timestamp: day,
                summary: totals.finish(),
                exchanges: ExchangeAssets::new(),
                update_time,
                origin: SnapshotOrigin::Backfill,
            });
        }

        debug!(days = synthetic.len(), "reconstructed snapshots");
        synthetic
    }

    /// Store synthetic snapshots in one batch. A failed write is logged.
    pub async fn persist(&self, synthetic: &[Snapshot]) {
        if synthetic.is_empty() {
            return;
        }
        match self.storage.upsert_snapshots(synthetic).await {
            Ok(()) => debug!(days = synthetic.len(), "backfilled snapshots stored"),
            Err(e) => warn!(
                days = synthetic.len(),
                error = %e,
                "failed to persist backfilled snapshots"
            ),
        }
    }

    async fn daily_closes(
        &self,
        client: Option<&dyn ExchangeClient>,
        asset: &Asset,
        since: i64,
        until: i64,
    ) -> BTreeMap<i64, Decimal> {
        let Some(client) = client else {
            warn!(holding = %asset.key(), "no configured account for holding; skipping history");
            return BTreeMap::new();
        };

        match bounded(
            client.id(),
            self.timeout,
            "fetch_price_history",
            client.fetch_price_history(&asset.symbol, since, until),
        )
        .await
        {
            Ok(closes) => closes,
            Err(e) => {
                warn!(holding = %asset.key(), error = %e, "price history unavailable");
                BTreeMap::new()
            }
        }
    }
}
