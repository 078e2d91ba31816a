//! Exchange capability interface and the integrations that implement it.

mod feed;
mod manual;
#[cfg(feature = "market_data")]
mod spot_feed;

pub use feed::PriceFeed;
pub use manual::ManualAccount;
#[cfg(feature = "market_data")]
pub use spot_feed::{SpotMarketFeed, DEFAULT_BASE_URL};

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rust_decimal::Decimal;

use crate::config::AccountConfig;
use crate::duration::format_duration;
use crate::error::ExchangeError;
use crate::models::{BalanceSheet, ExchangeId, Trade};

/// Everything the valuation engine needs from one exchange account.
///
/// Symbols are base assets (`BTC`); the client prices them against its quote
/// currency.
#[async_trait::async_trait]
pub trait ExchangeClient: Send + Sync {
    fn id(&self) -> &ExchangeId;

    async fn fetch_balance(&self) -> Result<BalanceSheet, ExchangeError>;

    /// Complete available trade history for `symbol`; may be empty.
    async fn fetch_trade_history(&self, symbol: &str) -> Result<Vec<Trade>, ExchangeError>;

    async fn fetch_current_price(&self, symbol: &str) -> Result<Decimal, ExchangeError>;

    /// Daily closes keyed by day-aligned timestamp for days in `since..=until`.
    async fn fetch_price_history(
        &self,
        symbol: &str,
        since: i64,
        until: i64,
    ) -> Result<BTreeMap<i64, Decimal>, ExchangeError>;
}

/// Run an exchange call with an upper bound on its duration.
///
/// An elapsed timeout becomes [`ExchangeError::Connectivity`].
pub async fn bounded<T, F>(
    exchange: &ExchangeId,
    timeout: Duration,
    operation: &str,
    call: F,
) -> Result<T, ExchangeError>
where
    F: Future<Output = Result<T, ExchangeError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ExchangeError::connectivity(
            exchange,
            format!("{operation} timed out after {}", format_duration(timeout)),
        )),
    }
}

/// Construct the configured accounts, all priced through `feed`.
pub fn build_accounts(
    accounts: &[AccountConfig],
    quote_currency: &str,
    feed: Arc<dyn PriceFeed>,
) -> Result<Vec<Arc<dyn ExchangeClient>>> {
    let mut seen = std::collections::HashSet::new();
    let mut clients: Vec<Arc<dyn ExchangeClient>> = Vec::with_capacity(accounts.len());

    for config in accounts {
        let account = ManualAccount::from_config(config, quote_currency, feed.clone())?;
        if !seen.insert(account.id().clone()) {
            anyhow::bail!("Duplicate account id: {}", account.id());
        }
        clients.push(Arc::new(account));
    }

    Ok(clients)
}
