mod json_file;
mod memory;

pub use json_file::JsonFileStorage;
pub use memory::MemoryStorage;

use anyhow::Result;

use crate::models::{Asset, CostRecord, HoldingKey, Snapshot};

/// Document store for valuation state.
///
/// Every write is an atomic single-document upsert: costs and assets are
/// unique per [`HoldingKey`], snapshots are unique per day-aligned timestamp.
/// Concurrent writers to the same key converge on the last write.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    // Cost basis
    async fn get_cost(&self, key: &HoldingKey) -> Result<Option<CostRecord>>;
    async fn upsert_cost(&self, record: &CostRecord) -> Result<()>;

    // Current assets
    async fn get_asset(&self, key: &HoldingKey) -> Result<Option<Asset>>;
    async fn list_assets(&self) -> Result<Vec<Asset>>;
    async fn upsert_asset(&self, asset: &Asset) -> Result<()>;

    // Snapshots
    async fn upsert_snapshot(&self, snapshot: &Snapshot) -> Result<()>;
    /// Upsert several snapshots. Stops at the first failed write.
    async fn upsert_snapshots(&self, snapshots: &[Snapshot]) -> Result<()> {
        for snapshot in snapshots {
            self.upsert_snapshot(snapshot).await?;
        }
        Ok(())
    }
    /// Snapshot with the greatest timestamp, if any.
    async fn latest_snapshot(&self) -> Result<Option<Snapshot>>;
    /// Snapshots with `start <= timestamp <= end`, ascending by timestamp.
    async fn snapshots_in_range(&self, start: i64, end: i64) -> Result<Vec<Snapshot>>;
}
