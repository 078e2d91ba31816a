use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;

use crate::config::AccountConfig;
use crate::error::ExchangeError;
use crate::models::{normalize_symbol, BalanceSheet, ExchangeId, RawBalance, Trade};

use super::{ExchangeClient, PriceFeed};

/// Watch-only account: holdings and trades are declared up front, prices
/// come from a [`PriceFeed`].
pub struct ManualAccount {
    id: ExchangeId,
    quote_currency: String,
    holdings: BalanceSheet,
    trades: HashMap<String, Vec<Trade>>,
    feed: Arc<dyn PriceFeed>,
}

impl ManualAccount {
    pub fn new(id: ExchangeId, quote_currency: impl AsRef<str>, feed: Arc<dyn PriceFeed>) -> Self {
        Self {
            id,
            quote_currency: normalize_symbol(quote_currency.as_ref()),
            holdings: BalanceSheet::new(),
            trades: HashMap::new(),
            feed,
        }
    }

    pub fn with_holding(mut self, symbol: &str, balance: RawBalance) -> Self {
        self.holdings.insert(normalize_symbol(symbol), balance);
        self
    }

    pub fn with_trade(mut self, symbol: &str, trade: Trade) -> Self {
        self.trades
            .entry(normalize_symbol(symbol))
            .or_default()
            .push(trade);
        self
    }

    pub fn from_config(
        config: &AccountConfig,
        quote_currency: &str,
        feed: Arc<dyn PriceFeed>,
    ) -> Result<Self> {
        let id = ExchangeId::parse(&config.id)?;
        let mut account = Self::new(id, quote_currency, feed);
        for (symbol, holding) in &config.holdings {
            account = account.with_holding(symbol, RawBalance::new(holding.free, holding.used));
        }
        for trade in &config.trades {
            account = account.with_trade(
                &trade.symbol,
                Trade {
                    side: trade.side,
                    cost: trade.cost,
                    amount: trade.amount,
                },
            );
        }
        Ok(account)
    }

    fn feed_error(&self, error: anyhow::Error) -> ExchangeError {
        ExchangeError::connectivity(&self.id, format!("{} feed: {error:#}", self.feed.name()))
    }
}

#[async_trait::async_trait]
impl ExchangeClient for ManualAccount {
    fn id(&self) -> &ExchangeId {
        &self.id
    }

    async fn fetch_balance(&self) -> Result<BalanceSheet, ExchangeError> {
        Ok(self.holdings.clone())
    }

    async fn fetch_trade_history(&self, symbol: &str) -> Result<Vec<Trade>, ExchangeError> {
        Ok(self
            .trades
            .get(&normalize_symbol(symbol))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_current_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        match self.feed.last_price(symbol, &self.quote_currency).await {
            Ok(Some(price)) => Ok(price),
            Ok(None) => Err(ExchangeError::unavailable(&self.id, normalize_symbol(symbol))),
            Err(e) => Err(self.feed_error(e)),
        }
    }

    async fn fetch_price_history(
        &self,
        symbol: &str,
        since: i64,
        until: i64,
    ) -> Result<BTreeMap<i64, Decimal>, ExchangeError> {
        self.feed
            .daily_closes(symbol, &self.quote_currency, since, until)
            .await
            .map_err(|e| self.feed_error(e))
    }
}
