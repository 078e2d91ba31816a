use std::collections::BTreeMap;

use anyhow::Result;
use rust_decimal::Decimal;

/// Source of spot prices for a `base/quote` pair.
#[async_trait::async_trait]
pub trait PriceFeed: Send + Sync {
    fn name(&self) -> &str;

    /// Latest traded price, or `None` if the pair is not listed.
    async fn last_price(&self, base: &str, quote: &str) -> Result<Option<Decimal>>;

    /// Daily closes keyed by day-aligned timestamp for days in `since..=until`.
    ///
    /// Unlisted pairs yield an empty map.
    async fn daily_closes(
        &self,
        base: &str,
        quote: &str,
        since: i64,
        until: i64,
    ) -> Result<BTreeMap<i64, Decimal>>;
}
