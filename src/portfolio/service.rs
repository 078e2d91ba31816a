// src/portfolio/service.rs
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::ResolvedConfig;
use crate::error::PortfolioError;
use crate::exchange::ExchangeClient;
use crate::models::{
    normalize_symbol, Asset, CostRecord, ExchangeId, HoldingKey, RawBalance, Snapshot,
};
use crate::storage::Storage;

use super::{
    merge_history, missing_days, value_asset, CostBasisResolver, HistoryBackfill,
    PortfolioAggregator, PortfolioReport, SnapshotCache,
};

/// Tunables of the valuation engine.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Upper-case symbols valued at 1:1.
    pub pegged_symbols: BTreeSet<String>,
    pub cache_ttl: Duration,
    pub exchange_timeout: Duration,
    pub max_period_days: u32,
    pub symbol_aliases: BTreeMap<String, String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            pegged_symbols: BTreeSet::from(["USDT".to_string(), "USDC".to_string()]),
            cache_ttl: Duration::from_secs(60),
            exchange_timeout: Duration::from_secs(15),
            max_period_days: 730,
            symbol_aliases: BTreeMap::new(),
        }
    }
}

impl ServiceSettings {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            pegged_symbols: config.pegged_symbols.clone(),
            cache_ttl: config.cache.ttl,
            exchange_timeout: config.exchange.timeout,
            max_period_days: config.history.max_period_days,
            symbol_aliases: config.symbol_aliases.clone(),
        }
    }
}

/// Entry point for portfolio reads and writes.
pub struct PortfolioService {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    resolver: Arc<CostBasisResolver>,
    aggregator: PortfolioAggregator,
    cache: SnapshotCache,
    backfill: HistoryBackfill,
    max_period_days: u32,
}

impl PortfolioService {
    pub fn new(
        settings: ServiceSettings,
        accounts: Vec<Arc<dyn ExchangeClient>>,
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let resolver = Arc::new(
            CostBasisResolver::new(storage.clone(), clock.clone())
                .with_symbol_aliases(settings.symbol_aliases)
                .with_timeout(settings.exchange_timeout),
        );
        let aggregator = PortfolioAggregator::new(
            accounts,
            resolver.clone(),
            storage.clone(),
            clock.clone(),
            settings.pegged_symbols,
        )
        .with_timeout(settings.exchange_timeout);
        let cache = SnapshotCache::new(storage.clone(), clock.clone(), settings.cache_ttl);
        let backfill = HistoryBackfill::new(storage.clone(), clock.clone())
            .with_timeout(settings.exchange_timeout);

        Self {
            storage,
            clock,
            resolver,
            aggregator,
            cache,
            backfill,
            max_period_days: settings.max_period_days,
        }
    }

    pub fn from_config(
        config: &ResolvedConfig,
        accounts: Vec<Arc<dyn ExchangeClient>>,
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(ServiceSettings::from_config(config), accounts, storage, clock)
    }

    /// Current portfolio, from the cache when fresh.
    pub async fn get_current_portfolio(
        &self,
        min_value: Decimal,
    ) -> Result<PortfolioReport, PortfolioError> {
        if min_value < Decimal::ZERO {
            return Err(PortfolioError::validation(format!(
                "min_value must not be negative: {min_value}"
            )));
        }
        self.cache.get_current(&self.aggregator, min_value).await
    }

    /// One snapshot per day for the `period_days` days ending today,
    /// ascending. Missing days are reconstructed and, when every account and
    /// symbol was valued, stored.
    pub async fn get_history(&self, period_days: u32) -> Result<Vec<Snapshot>, PortfolioError> {
        if period_days == 0 || period_days > self.max_period_days {
            return Err(PortfolioError::validation(format!(
                "period must be between 1 and {} days, got {period_days}",
                self.max_period_days
            )));
        }

        let (start, end) = self.backfill.window(period_days);
        let stored = self.backfill.stored(start, end).await;
        if stored.len() == period_days as usize {
            return Ok(stored);
        }

        // Holdings come from a live pass whose failure list decides whether
        // backfilled days may be stored. The pass may store today's live
        // snapshot, so stored days are read again after.
        let current = self.aggregator.aggregate(Decimal::ZERO).await?;
        let stored = self.backfill.stored(start, end).await;
        let missing = missing_days(start, end, &stored);

        if !current.failures.is_empty() && current.exchanges.is_empty() {
            warn!(
                period_days,
                stored = stored.len(),
                "no holdings could be valued; returning stored history only"
            );
            return Ok(stored);
        }

        let synthetic = self
            .backfill
            .reconstruct(
                self.aggregator.accounts(),
                &current.exchanges,
                self.aggregator.pegged_symbols(),
                &missing,
            )
            .await;

        // Days rebuilt from incomplete holdings are returned but not stored,
        // so a later request rebuilds them once every account answers.
        if current.failures.is_empty() {
            self.backfill.persist(&synthetic).await;
        } else {
            warn!(
                failures = current.failures.len(),
                days = synthetic.len(),
                "holdings incomplete; backfilled days not stored"
            );
        }
        info!(
            period_days,
            stored = stored.len(),
            backfilled = synthetic.len(),
            "history assembled"
        );

        Ok(merge_history(stored, synthetic))
    }

    /// Replace the cost basis of a holding with a client-supplied price.
    ///
    /// A stored asset document for the holding is re-valued with the new
    /// price right away.
    pub async fn set_cost_override(
        &self,
        exchange: &str,
        symbol: &str,
        avg_price: Decimal,
    ) -> Result<CostRecord, PortfolioError> {
        let exchange =
            ExchangeId::parse(exchange).map_err(|e| PortfolioError::validation(e.to_string()))?;
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(PortfolioError::validation("symbol must not be empty"));
        }
        if self.aggregator.pegged_symbols().contains(&symbol) {
            return Err(PortfolioError::validation(format!(
                "{symbol} is pegged to the quote currency; its cost is fixed at 1"
            )));
        }

        let key = HoldingKey::new(exchange, &symbol);
        let record = self.resolver.set_override(&key, avg_price).await?;
        info!(holding = %key, avg_price = %avg_price, "cost override stored");

        match self.storage.get_asset(&key).await {
            Ok(Some(asset)) => self.revalue_asset(&asset, avg_price).await?,
            Ok(None) => {}
            Err(e) => warn!(holding = %key, error = %e, "could not load asset to re-value"),
        }

        Ok(record)
    }

    async fn revalue_asset(&self, asset: &Asset, avg_price: Decimal) -> Result<(), PortfolioError> {
        let balance = RawBalance {
            free: asset.free,
            used: asset.used,
            total: asset.total,
        };
        let Some(updated) = value_asset(
            &asset.exchange,
            &asset.symbol,
            &balance,
            avg_price,
            asset.current_price,
            self.clock.now_ms(),
        ) else {
            return Ok(());
        };

        self.storage
            .upsert_asset(&updated)
            .await
            .map_err(PortfolioError::Persistence)
    }

    /// Value all accounts at the close of the day containing `day` and store
    /// the result as that day's snapshot.
    pub async fn record_daily_snapshot(&self, day: i64) -> Result<Snapshot, PortfolioError> {
        self.aggregator.record_close(day).await
    }

    /// Every stored asset document.
    pub async fn list_assets(&self) -> Result<Vec<Asset>, PortfolioError> {
        self.storage
            .list_assets()
            .await
            .map_err(PortfolioError::Persistence)
    }
}
