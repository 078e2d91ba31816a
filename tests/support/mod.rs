#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use hodlbook::clock::FixedClock;
use hodlbook::error::ExchangeError;
use hodlbook::exchange::ExchangeClient;
use hodlbook::models::{
    Asset, BalanceSheet, CostRecord, ExchangeId, HoldingKey, RawBalance, Snapshot, Trade,
};
use hodlbook::portfolio::{PortfolioService, ServiceSettings};
use hodlbook::storage::{MemoryStorage, Storage};
use rust_decimal::Decimal;

pub const DAY_MS: i64 = hodlbook::models::DAY_MS;

/// 2024-06-03T12:00:00Z
pub const NOW: i64 = 1_717_416_000_000;

/// 2024-06-03T00:00:00Z
pub const TODAY: i64 = 1_717_372_800_000;

pub fn clock_at(ms: i64) -> Arc<FixedClock> {
    Arc::new(FixedClock::from_millis(ms).expect("valid timestamp"))
}

pub fn clients(exchanges: &[Arc<MockExchange>]) -> Vec<Arc<dyn ExchangeClient>> {
    exchanges
        .iter()
        .map(|e| e.clone() as Arc<dyn ExchangeClient>)
        .collect()
}

pub fn service_at(
    now: i64,
    exchanges: &[Arc<MockExchange>],
    storage: Arc<dyn Storage>,
) -> PortfolioService {
    PortfolioService::new(
        ServiceSettings::default(),
        clients(exchanges),
        storage,
        clock_at(now),
    )
}

pub fn service(exchanges: &[Arc<MockExchange>], storage: Arc<dyn Storage>) -> PortfolioService {
    service_at(NOW, exchanges, storage)
}

#[derive(Debug, Clone, Default)]
pub struct CallCounts {
    pub balance: usize,
    pub price: usize,
    pub trades: usize,
    pub history: usize,
    pub trade_symbols: Vec<String>,
    pub price_symbols: Vec<String>,
}

/// Scriptable exchange account.
pub struct MockExchange {
    id: ExchangeId,
    balances: BalanceSheet,
    prices: HashMap<String, Decimal>,
    trades: HashMap<String, Vec<Trade>>,
    closes: HashMap<String, BTreeMap<i64, Decimal>>,
    fail_balance: bool,
    failing_symbols: HashSet<String>,
    fail_trades: bool,
    calls: Mutex<CallCounts>,
}

impl MockExchange {
    pub fn new(id: &str) -> Self {
        Self {
            id: ExchangeId::from(id),
            balances: BalanceSheet::new(),
            prices: HashMap::new(),
            trades: HashMap::new(),
            closes: HashMap::new(),
            fail_balance: false,
            failing_symbols: HashSet::new(),
            fail_trades: false,
            calls: Mutex::new(CallCounts::default()),
        }
    }

    pub fn with_balance(mut self, symbol: &str, free: Decimal, used: Decimal) -> Self {
        self.balances
            .insert(symbol.to_string(), RawBalance::new(free, used));
        self
    }

    pub fn with_raw_balance(mut self, symbol: &str, balance: RawBalance) -> Self {
        self.balances.insert(symbol.to_string(), balance);
        self
    }

    pub fn with_price(mut self, symbol: &str, price: Decimal) -> Self {
        self.prices.insert(symbol.to_string(), price);
        self
    }

    pub fn with_trades(mut self, symbol: &str, trades: Vec<Trade>) -> Self {
        self.trades.insert(symbol.to_string(), trades);
        self
    }

    pub fn with_closes(
        mut self,
        symbol: &str,
        closes: impl IntoIterator<Item = (i64, Decimal)>,
    ) -> Self {
        self.closes
            .entry(symbol.to_string())
            .or_default()
            .extend(closes);
        self
    }

    pub fn failing_balance(mut self) -> Self {
        self.fail_balance = true;
        self
    }

    pub fn failing_symbol(mut self, symbol: &str) -> Self {
        self.failing_symbols.insert(symbol.to_string());
        self
    }

    pub fn failing_trades(mut self) -> Self {
        self.fail_trades = true;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> CallCounts {
        self.calls.lock().unwrap().clone()
    }

    fn check_symbol(&self, symbol: &str) -> Result<(), ExchangeError> {
        if self.failing_symbols.contains(symbol) {
            return Err(ExchangeError::connectivity(&self.id, format!("{symbol} request refused")));
        }
        Ok(())
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    fn id(&self) -> &ExchangeId {
        &self.id
    }

    async fn fetch_balance(&self) -> Result<BalanceSheet, ExchangeError> {
        self.calls.lock().unwrap().balance += 1;
        if self.fail_balance {
            return Err(ExchangeError::connectivity(&self.id, "invalid api key"));
        }
        Ok(self.balances.clone())
    }

    async fn fetch_trade_history(&self, symbol: &str) -> Result<Vec<Trade>, ExchangeError> {
        {
            let mut calls = self.calls.lock().unwrap();
            calls.trades += 1;
            calls.trade_symbols.push(symbol.to_string());
        }
        if self.fail_trades {
            return Err(ExchangeError::connectivity(&self.id, "trade endpoint down"));
        }
        self.check_symbol(symbol)?;
        Ok(self.trades.get(symbol).cloned().unwrap_or_default())
    }

    async fn fetch_current_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        {
            let mut calls = self.calls.lock().unwrap();
            calls.price += 1;
            calls.price_symbols.push(symbol.to_string());
        }
        self.check_symbol(symbol)?;
        self.prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::unavailable(&self.id, symbol))
    }

    async fn fetch_price_history(
        &self,
        symbol: &str,
        since: i64,
        until: i64,
    ) -> Result<BTreeMap<i64, Decimal>, ExchangeError> {
        self.calls.lock().unwrap().history += 1;
        self.check_symbol(symbol)?;
        Ok(self
            .closes
            .get(symbol)
            .map(|closes| {
                closes
                    .range(since..=until)
                    .map(|(day, close)| (*day, *close))
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Memory store whose reads or writes can be made to fail.
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: MemoryStorage,
    pub fail_reads: AtomicBool,
    pub fail_cost_writes: AtomicBool,
    pub fail_snapshot_writes: AtomicBool,
    pub snapshot_batches: AtomicUsize,
}

impl FlakyStorage {
    fn check(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            anyhow::bail!("{what} failed: disk unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn get_cost(&self, key: &HoldingKey) -> Result<Option<CostRecord>> {
        Self::check(&self.fail_reads, "read")?;
        self.inner.get_cost(key).await
    }

    async fn upsert_cost(&self, record: &CostRecord) -> Result<()> {
        Self::check(&self.fail_cost_writes, "cost write")?;
        self.inner.upsert_cost(record).await
    }

    async fn get_asset(&self, key: &HoldingKey) -> Result<Option<Asset>> {
        Self::check(&self.fail_reads, "read")?;
        self.inner.get_asset(key).await
    }

    async fn list_assets(&self) -> Result<Vec<Asset>> {
        Self::check(&self.fail_reads, "read")?;
        self.inner.list_assets().await
    }

    async fn upsert_asset(&self, asset: &Asset) -> Result<()> {
        self.inner.upsert_asset(asset).await
    }

    async fn upsert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        Self::check(&self.fail_snapshot_writes, "snapshot write")?;
        self.inner.upsert_snapshot(snapshot).await
    }

    async fn upsert_snapshots(&self, snapshots: &[Snapshot]) -> Result<()> {
        Self::check(&self.fail_snapshot_writes, "snapshot write")?;
        self.snapshot_batches.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_snapshots(snapshots).await
    }

    async fn latest_snapshot(&self) -> Result<Option<Snapshot>> {
        Self::check(&self.fail_reads, "read")?;
        self.inner.latest_snapshot().await
    }

    async fn snapshots_in_range(&self, start: i64, end: i64) -> Result<Vec<Snapshot>> {
        Self::check(&self.fail_reads, "read")?;
        self.inner.snapshots_in_range(start, end).await
    }
}
