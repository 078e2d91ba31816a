// src/portfolio/snapshots.rs
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::PortfolioError;
use crate::models::{Snapshot, SnapshotOrigin};
use crate::storage::Storage;

use super::{PortfolioAggregator, PortfolioReport};

/// Read-through cache over today's live snapshot.
pub struct SnapshotCache {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SnapshotCache {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            storage,
            clock,
            ttl,
        }
    }

    /// Serve the stored live snapshot if it is fresh, otherwise run a live
    /// valuation through `aggregator`.
    ///
    /// Concurrent misses may both recompute; both write the same day's
    /// snapshot, so the result converges.
    pub async fn get_current(
        &self,
        aggregator: &PortfolioAggregator,
        min_value: Decimal,
    ) -> Result<PortfolioReport, PortfolioError> {
        if let Some(snapshot) = self.fresh_snapshot().await {
            debug!(update_time = snapshot.update_time, "serving cached portfolio");
            return Ok(PortfolioReport::from_snapshot(
                &snapshot,
                min_value,
                aggregator.pegged_symbols(),
                true,
            ));
        }
        aggregator.aggregate(min_value).await
    }

    /// Latest snapshot if it is today's live one and younger than the TTL.
    /// Read failures count as a miss.
    pub async fn fresh_snapshot(&self) -> Option<Snapshot> {
        let snapshot = match self.storage.latest_snapshot().await {
            Ok(snapshot) => snapshot?,
            Err(e) => {
                warn!(error = %e, "snapshot lookup failed; treating as cache miss");
                return None;
            }
        };

        let now = self.clock.now_ms();
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let fresh = snapshot.origin == SnapshotOrigin::Live
            && snapshot.timestamp == self.clock.today_start_ms()
            && now.saturating_sub(snapshot.update_time) <= ttl_ms;

        fresh.then_some(snapshot)
    }
}
