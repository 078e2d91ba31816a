//! In-memory storage implementation for tests and embedding.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use tokio::sync::Mutex;

use crate::models::{Asset, CostRecord, HoldingKey, Snapshot};

use super::Storage;

/// In-memory document store.
#[derive(Default)]
pub struct MemoryStorage {
    costs: Mutex<HashMap<HoldingKey, CostRecord>>,
    assets: Mutex<HashMap<HoldingKey, Asset>>,
    snapshots: Mutex<BTreeMap<i64, Snapshot>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshot documents.
    pub async fn snapshot_count(&self) -> usize {
        self.snapshots.lock().await.len()
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn get_cost(&self, key: &HoldingKey) -> Result<Option<CostRecord>> {
        let costs = self.costs.lock().await;
        Ok(costs.get(key).cloned())
    }

    async fn upsert_cost(&self, record: &CostRecord) -> Result<()> {
        let mut costs = self.costs.lock().await;
        costs.insert(record.key(), record.clone());
        Ok(())
    }

    async fn get_asset(&self, key: &HoldingKey) -> Result<Option<Asset>> {
        let assets = self.assets.lock().await;
        Ok(assets.get(key).cloned())
    }

    async fn list_assets(&self) -> Result<Vec<Asset>> {
        let assets = self.assets.lock().await;
        let mut list: Vec<Asset> = assets.values().cloned().collect();
        list.sort_by_key(Asset::key);
        Ok(list)
    }

    async fn upsert_asset(&self, asset: &Asset) -> Result<()> {
        let mut assets = self.assets.lock().await;
        assets.insert(asset.key(), asset.clone());
        Ok(())
    }

    async fn upsert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let mut snapshots = self.snapshots.lock().await;
        snapshots.insert(snapshot.timestamp, snapshot.clone());
        Ok(())
    }

    async fn upsert_snapshots(&self, batch: &[Snapshot]) -> Result<()> {
        let mut snapshots = self.snapshots.lock().await;
        for snapshot in batch {
            snapshots.insert(snapshot.timestamp, snapshot.clone());
        }
        Ok(())
    }

    async fn latest_snapshot(&self) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.lock().await;
        Ok(snapshots.values().next_back().cloned())
    }

    async fn snapshots_in_range(&self, start: i64, end: i64) -> Result<Vec<Snapshot>> {
        if end < start {
            return Ok(Vec::new());
        }
        let snapshots = self.snapshots.lock().await;
        Ok(snapshots.range(start..=end).map(|(_, s)| s.clone()).collect())
    }
}
