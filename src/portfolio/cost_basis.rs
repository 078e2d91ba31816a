// src/portfolio/cost_basis.rs
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{ExchangeError, PortfolioError};
use crate::exchange::{bounded, ExchangeClient};
use crate::models::{CostRecord, CostSource, HoldingKey, Trade, TradeSide};
use crate::storage::Storage;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Average acquisition price implied by a trade history.
///
/// Buys add their cost and amount, sells subtract them. Returns `None` when
/// the net amount is zero, which includes an empty history.
pub fn reconstruct_avg_price(trades: &[Trade]) -> Option<Decimal> {
    let (net_cost, net_amount) =
        trades
            .iter()
            .fold((Decimal::ZERO, Decimal::ZERO), |(cost, amount), trade| match trade.side {
                TradeSide::Buy => (cost + trade.cost, amount + trade.amount),
                TradeSide::Sell => (cost - trade.cost, amount - trade.amount),
            });

    if net_amount.is_zero() {
        return None;
    }
    net_cost.checked_div(net_amount)
}

/// Determines and remembers the average acquisition price of holdings.
pub struct CostBasisResolver {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    symbol_aliases: BTreeMap<String, String>,
    timeout: Duration,
}

impl CostBasisResolver {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            symbol_aliases: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Alternative tickers to try when a symbol has no trade history.
    pub fn with_symbol_aliases(mut self, aliases: BTreeMap<String, String>) -> Self {
        self.symbol_aliases = aliases;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Average price for `symbol` held on `client`.
    ///
    /// A stored record always wins. Otherwise the price is reconstructed from
    /// trade history (or `current_price` when that is inconclusive) and stored
    /// as a server record. Never fails: lookup errors fall back to
    /// `current_price` without storing anything.
    pub async fn resolve(
        &self,
        client: &dyn ExchangeClient,
        symbol: &str,
        current_price: Decimal,
    ) -> Decimal {
        self.resolve_with(client, symbol, current_price, true).await
    }

    /// Like [`resolve`](Self::resolve) for a valuation at a past close.
    ///
    /// `close` is used when the trade history is inconclusive but is never
    /// stored, since it is not the current market price.
    pub async fn resolve_historical(
        &self,
        client: &dyn ExchangeClient,
        symbol: &str,
        close: Decimal,
    ) -> Decimal {
        self.resolve_with(client, symbol, close, false).await
    }

    async fn resolve_with(
        &self,
        client: &dyn ExchangeClient,
        symbol: &str,
        fallback: Decimal,
        store_fallback: bool,
    ) -> Decimal {
        let key = HoldingKey::new(client.id().clone(), symbol);

        match self.storage.get_cost(&key).await {
            Ok(Some(record)) => return record.avg_price,
            Ok(None) => {}
            Err(e) => {
                warn!(holding = %key, error = %e, "cost lookup failed; using fallback price");
                return fallback;
            }
        }

        let trades = match self.fetch_trades(client, &key.symbol).await {
            Ok(trades) => trades,
            Err(e) => {
                warn!(holding = %key, error = %e, "no trade history; using fallback price");
                return fallback;
            }
        };

        let avg_price = match reconstruct_avg_price(&trades) {
            Some(avg_price) => avg_price,
            None if store_fallback => fallback,
            None => {
                debug!(holding = %key, "inconclusive trade history; fallback not stored");
                return fallback;
            }
        };
        debug!(
            holding = %key,
            trades = trades.len(),
            avg_price = %avg_price,
            "cost basis reconstructed"
        );

        let record = CostRecord::new(&key, avg_price, self.clock.now_ms(), CostSource::Server);
        if let Err(e) = self.storage.upsert_cost(&record).await {
            warn!(holding = %key, error = %e, "failed to persist cost basis");
        }

        avg_price
    }

    async fn fetch_trades(
        &self,
        client: &dyn ExchangeClient,
        symbol: &str,
    ) -> Result<Vec<Trade>, ExchangeError> {
        let trades = bounded(
            client.id(),
            self.timeout,
            "fetch_trade_history",
            client.fetch_trade_history(symbol),
        )
        .await?;
        if !trades.is_empty() {
            return Ok(trades);
        }

        match self.symbol_aliases.get(symbol) {
            Some(alias) => {
                debug!(
                    exchange = %client.id(),
                    symbol,
                    alias = %alias,
                    "retrying trade history under alias"
                );
                bounded(
                    client.id(),
                    self.timeout,
                    "fetch_trade_history",
                    client.fetch_trade_history(alias),
                )
                .await
            }
            None => Ok(trades),
        }
    }

    /// Store a client-supplied average price, replacing any existing record.
    pub async fn set_override(
        &self,
        key: &HoldingKey,
        avg_price: Decimal,
    ) -> Result<CostRecord, PortfolioError> {
        if avg_price < Decimal::ZERO {
            return Err(PortfolioError::validation(format!(
                "average price must not be negative: {avg_price}"
            )));
        }

        let record = CostRecord::new(key, avg_price, self.clock.now_ms(), CostSource::Client);
        self.storage
            .upsert_cost(&record)
            .await
            .map_err(PortfolioError::Persistence)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn reconstructs_from_buys_and_sells() {
        let trades = [
            Trade::buy(dec!(10000), dec!(1.0)),
            Trade::sell(dec!(6000), dec!(0.5)),
        ];
        assert_eq!(reconstruct_avg_price(&trades), Some(dec!(8000)));
    }

    #[test]
    fn reconstruction_ignores_trade_order() {
        let trades = [
            Trade::buy(dec!(300), dec!(3)),
            Trade::sell(dec!(50), dec!(2)),
            Trade::buy(dec!(150), dec!(1)),
        ];
        let mut reversed = trades.clone();
        reversed.reverse();
        assert_eq!(reconstruct_avg_price(&trades), reconstruct_avg_price(&reversed));
        assert_eq!(reconstruct_avg_price(&trades), Some(dec!(200)));
    }

    #[test]
    fn flat_or_empty_history_is_inconclusive() {
        assert_eq!(reconstruct_avg_price(&[]), None);
        let round_trip = [Trade::buy(dec!(100), dec!(2)), Trade::sell(dec!(150), dec!(2))];
        assert_eq!(reconstruct_avg_price(&round_trip), None);
    }
}
