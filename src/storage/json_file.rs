use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::warn;

use crate::models::{Asset, CostRecord, HoldingKey, Snapshot};

use super::Storage;

/// JSON file-based storage implementation.
///
/// Directory structure:
/// ```text
/// data/
///   costs.json        # one CostRecord per (exchange, symbol)
///   assets.json       # one Asset per (exchange, symbol)
///   snapshots.jsonl   # one Snapshot per day, ascending by timestamp
/// ```
///
/// Each upsert rewrites its collection through a temporary file and a rename,
/// serialized per collection, so readers never observe a partial file.
pub struct JsonFileStorage {
    base_path: PathBuf,
    costs_lock: Mutex<()>,
    assets_lock: Mutex<()>,
    snapshots_lock: Mutex<()>,
}

impl JsonFileStorage {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            costs_lock: Mutex::new(()),
            assets_lock: Mutex::new(()),
            snapshots_lock: Mutex::new(()),
        }
    }

    fn costs_file(&self) -> PathBuf {
        self.base_path.join("costs.json")
    }

    fn assets_file(&self) -> PathBuf {
        self.base_path.join("assets.json")
    }

    fn snapshots_file(&self) -> PathBuf {
        self.base_path.join("snapshots.jsonl")
    }

    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create directory")?;
        }
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        match fs::read_to_string(path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON from {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).context("Failed to read file"),
        }
    }

    /// Parse a JSONL file. Unparseable lines are skipped with a warning, or
    /// rejected when `strict`.
    async fn read_jsonl<T: DeserializeOwned>(&self, path: &Path, strict: bool) -> Result<Vec<T>> {
        let file = match fs::File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("Failed to open file"),
        };

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut items = Vec::new();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await.context("Failed to read line")? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(item) => items.push(item),
                Err(e) if strict => {
                    return Err(e).with_context(|| {
                        format!(
                            "{} line {line_no} is not a valid snapshot; refusing to rewrite",
                            path.display()
                        )
                    });
                }
                Err(e) => warn!(
                    path = %path.display(),
                    line = line_no,
                    error = %e,
                    "skipping unparseable snapshot line"
                ),
            }
        }

        Ok(items)
    }

    /// Write `content` to `path` via a sibling temp file and rename.
    async fn replace_file(&self, path: &Path, content: String) -> Result<()> {
        self.ensure_dir(path).await?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    async fn write_json<T: Serialize>(&self, path: &Path, items: &[T]) -> Result<()> {
        let content = serde_json::to_string_pretty(items).context("Failed to serialize JSON")?;
        self.replace_file(path, content).await
    }

    async fn write_jsonl<T: Serialize>(&self, path: &Path, items: &[T]) -> Result<()> {
        let mut content = String::new();
        for item in items {
            let line = serde_json::to_string(item).context("Failed to serialize item")?;
            content.push_str(&line);
            content.push('\n');
        }
        self.replace_file(path, content).await
    }

    /// Stored snapshots by timestamp. Writers load `strict` so a rewrite never
    /// drops a line it could not parse.
    async fn load_snapshots(&self, strict: bool) -> Result<BTreeMap<i64, Snapshot>> {
        let items: Vec<Snapshot> = self.read_jsonl(&self.snapshots_file(), strict).await?;
        // Later lines win if a file was ever written with duplicates.
        Ok(items.into_iter().map(|s| (s.timestamp, s)).collect())
    }
}

#[async_trait::async_trait]
impl Storage for JsonFileStorage {
    async fn get_cost(&self, key: &HoldingKey) -> Result<Option<CostRecord>> {
        let costs: Vec<CostRecord> = self.read_json(&self.costs_file()).await?;
        Ok(costs.into_iter().find(|c| c.key() == *key))
    }

    async fn upsert_cost(&self, record: &CostRecord) -> Result<()> {
        let _guard = self.costs_lock.lock().await;
        let path = self.costs_file();
        let mut costs: Vec<CostRecord> = self.read_json(&path).await?;
        let key = record.key();
        match costs.iter_mut().find(|c| c.key() == key) {
            Some(existing) => *existing = record.clone(),
            None => costs.push(record.clone()),
        }
        costs.sort_by_key(CostRecord::key);
        self.write_json(&path, &costs).await
    }

    async fn get_asset(&self, key: &HoldingKey) -> Result<Option<Asset>> {
        let assets: Vec<Asset> = self.read_json(&self.assets_file()).await?;
        Ok(assets.into_iter().find(|a| a.key() == *key))
    }

    async fn list_assets(&self) -> Result<Vec<Asset>> {
        self.read_json(&self.assets_file()).await
    }

    async fn upsert_asset(&self, asset: &Asset) -> Result<()> {
        let _guard = self.assets_lock.lock().await;
        let path = self.assets_file();
        let mut assets: Vec<Asset> = self.read_json(&path).await?;
        let key = asset.key();
        match assets.iter_mut().find(|a| a.key() == key) {
            Some(existing) => *existing = asset.clone(),
            None => assets.push(asset.clone()),
        }
        assets.sort_by_key(Asset::key);
        self.write_json(&path, &assets).await
    }

    async fn upsert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.upsert_snapshots(std::slice::from_ref(snapshot)).await
    }

    async fn upsert_snapshots(&self, batch: &[Snapshot]) -> Result<()> {
        let _guard = self.snapshots_lock.lock().await;
        let mut snapshots = self.load_snapshots(true).await?;
        for snapshot in batch {
            snapshots.insert(snapshot.timestamp, snapshot.clone());
        }
        let ordered: Vec<&Snapshot> = snapshots.values().collect();
        self.write_jsonl(&self.snapshots_file(), &ordered).await
    }

    async fn latest_snapshot(&self) -> Result<Option<Snapshot>> {
        let snapshots = self.load_snapshots(false).await?;
        Ok(snapshots.into_values().next_back())
    }

    async fn snapshots_in_range(&self, start: i64, end: i64) -> Result<Vec<Snapshot>> {
        if end < start {
            return Ok(Vec::new());
        }
        let snapshots = self.load_snapshots(false).await?;
        Ok(snapshots
            .range(start..=end)
            .map(|(_, s)| s.clone())
            .collect())
    }
}
