// src/portfolio/aggregator.rs
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{ExchangeError, PortfolioError};
use crate::exchange::{bounded, ExchangeClient};
use crate::models::{
    day_start, normalize_symbol, Asset, ExchangeId, RawBalance, Snapshot, SnapshotOrigin,
    SummaryTotals,
};
use crate::storage::Storage;

use super::{
    value_asset, value_pegged, CostBasisResolver, PortfolioReport, PricingMode, Valuation,
    ValuationFailure,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

type AccountAssets = (BTreeMap<String, Asset>, Vec<ValuationFailure>);

/// Values every configured account concurrently and rolls the results up.
pub struct PortfolioAggregator {
    accounts: Vec<Arc<dyn ExchangeClient>>,
    resolver: Arc<CostBasisResolver>,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    pegged: BTreeSet<String>,
    timeout: Duration,
}

impl PortfolioAggregator {
    pub fn new(
        accounts: Vec<Arc<dyn ExchangeClient>>,
        resolver: Arc<CostBasisResolver>,
        storage: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        pegged: BTreeSet<String>,
    ) -> Self {
        Self {
            accounts,
            resolver,
            storage,
            clock,
            pegged,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Upper bound applied to each exchange call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn accounts(&self) -> &[Arc<dyn ExchangeClient>] {
        &self.accounts
    }

    pub fn pegged_symbols(&self) -> &BTreeSet<String> {
        &self.pegged
    }

    /// Live valuation pass.
    ///
    /// Every valued asset is stored and the unfiltered result becomes today's
    /// snapshot. The returned breakdown drops assets worth less than
    /// `min_value` (pegged holdings excepted) while the summary still covers
    /// all of them.
    pub async fn aggregate(&self, min_value: Decimal) -> Result<PortfolioReport, PortfolioError> {
        let valuation = self.value_all(PricingMode::Live).await;
        self.persist_assets(&valuation).await;

        let failures = valuation.failures.clone();
        let nothing_valued = !self.accounts.is_empty() && valuation.exchanges.is_empty();
        let snapshot =
            valuation.into_snapshot(day_start(self.clock.now_ms()), SnapshotOrigin::Live);

        if nothing_valued {
            warn!("every account failed; today's snapshot left untouched");
        } else {
            self.storage
                .upsert_snapshot(&snapshot)
                .await
                .map_err(PortfolioError::Persistence)?;
            info!(
                timestamp = snapshot.timestamp,
                total = %snapshot.summary.total,
                failures = failures.len(),
                "live snapshot stored"
            );
        }

        let mut report = PortfolioReport::from_snapshot(&snapshot, min_value, &self.pegged, false);
        report.failures = failures;
        Ok(report)
    }

    /// Value all accounts at the close of `day` and store the result as that
    /// day's end-of-day snapshot. Asset documents are left alone.
    ///
    /// Fails with [`PortfolioError::Unavailable`] without writing when every
    /// account failed, so a stored snapshot for the day survives an outage.
    pub async fn record_close(&self, day: i64) -> Result<Snapshot, PortfolioError> {
        let day = day_start(day);
        let valuation = self.value_all(PricingMode::DailyClose { day }).await;
        if !self.accounts.is_empty() && valuation.exchanges.is_empty() {
            let reasons: Vec<&str> = valuation.failures.iter().map(|f| f.reason.as_str()).collect();
            warn!(timestamp = day, "every account failed; end-of-day snapshot not stored");
            return Err(PortfolioError::Unavailable(reasons.join("; ")));
        }
        let snapshot = valuation.into_snapshot(day, SnapshotOrigin::EndOfDay);

        self.storage
            .upsert_snapshot(&snapshot)
            .await
            .map_err(PortfolioError::Persistence)?;
        info!(timestamp = day, total = %snapshot.summary.total, "end-of-day snapshot stored");
        Ok(snapshot)
    }

    /// Value every account without persisting anything but cost records.
    pub async fn value_all(&self, mode: PricingMode) -> Valuation {
        let update_time = self.clock.now_ms();
        let results = join_all(
            self.accounts
                .iter()
                .map(|client| self.value_account(client.as_ref(), mode, update_time)),
        )
        .await;

        let mut valuation = Valuation {
            update_time,
            ..Default::default()
        };
        let mut totals = SummaryTotals::default();

        for (exchange, outcome) in results {
            match outcome {
                Ok((assets, failures)) => {
                    assets.values().for_each(|asset| totals.add_asset(asset));
                    valuation.failures.extend(failures);
                    valuation.exchanges.insert(exchange, assets);
                }
                Err(e) => {
                    warn!(exchange = %exchange, error = %e, "account excluded from valuation");
                    valuation.failures.push(ValuationFailure {
                        exchange,
                        symbol: None,
                        reason: e.to_string(),
                    });
                }
            }
        }

        valuation.summary = totals.finish();
        debug!(
            assets = valuation.asset_count(),
            failures = valuation.failures.len(),
            "valuation pass complete"
        );
        valuation
    }

    async fn value_account(
        &self,
        client: &dyn ExchangeClient,
        mode: PricingMode,
        update_time: i64,
    ) -> (ExchangeId, Result<AccountAssets, ExchangeError>) {
        let exchange = client.id().clone();
        let balance =
            match bounded(&exchange, self.timeout, "fetch_balance", client.fetch_balance()).await {
                Ok(balance) => balance,
                Err(e) => return (exchange, Err(e)),
            };

        let results = join_all(
            balance
                .iter()
                .filter(|(_, raw)| raw.total > Decimal::ZERO)
                .map(|(symbol, raw)| async move {
                    let symbol = normalize_symbol(symbol);
                    let outcome = self.value_symbol(client, &symbol, raw, mode, update_time).await;
                    (symbol, outcome)
                }),
        )
        .await;

        let mut assets = BTreeMap::new();
        let mut failures = Vec::new();
        for (symbol, outcome) in results {
            match outcome {
                Ok(Some(asset)) => {
                    assets.insert(symbol, asset);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        exchange = %exchange,
                        symbol = %symbol,
                        error = %e,
                        "symbol excluded from valuation"
                    );
                    failures.push(ValuationFailure {
                        exchange: exchange.clone(),
                        symbol: Some(symbol),
                        reason: e.to_string(),
                    });
                }
            }
        }

        (exchange, Ok((assets, failures)))
    }

    async fn value_symbol(
        &self,
        client: &dyn ExchangeClient,
        symbol: &str,
        balance: &RawBalance,
        mode: PricingMode,
        update_time: i64,
    ) -> Result<Option<Asset>, ExchangeError> {
        if self.pegged.contains(symbol) {
            return Ok(value_pegged(client.id(), symbol, balance, update_time));
        }

        let price = self.price(client, symbol, mode).await?;
        let avg_price = match mode {
            PricingMode::Live => self.resolver.resolve(client, symbol, price).await,
            PricingMode::DailyClose { .. } => {
                self.resolver.resolve_historical(client, symbol, price).await
            }
        };
        Ok(value_asset(client.id(), symbol, balance, avg_price, price, update_time))
    }

    async fn price(
        &self,
        client: &dyn ExchangeClient,
        symbol: &str,
        mode: PricingMode,
    ) -> Result<Decimal, ExchangeError> {
        match mode {
            PricingMode::Live => {
                bounded(
                    client.id(),
                    self.timeout,
                    "fetch_current_price",
                    client.fetch_current_price(symbol),
                )
                .await
            }
            PricingMode::DailyClose { day } => {
                let closes = bounded(
                    client.id(),
                    self.timeout,
                    "fetch_price_history",
                    client.fetch_price_history(symbol, day, day),
                )
                .await?;
                closes
                    .range(..=day)
                    .next_back()
                    .map(|(_, close)| *close)
                    .ok_or_else(|| ExchangeError::unavailable(client.id(), symbol))
            }
        }
    }

    async fn persist_assets(&self, valuation: &Valuation) {
        let writes = join_all(
            valuation
                .exchanges
                .values()
                .flat_map(BTreeMap::values)
                .map(|asset| async move { (asset, self.storage.upsert_asset(asset).await) }),
        )
        .await;

        for (asset, result) in writes {
            if let Err(e) = result {
                warn!(holding = %asset.key(), error = %e, "failed to persist asset");
            }
        }
    }
}
