//! Public spot market data over a Binance-compatible REST API.
//!
//! Uses `/api/v3/ticker/price` for last prices and daily `/api/v3/klines`
//! for close history. No credentials are needed.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::models::{day_start, DAY_MS};

use super::PriceFeed;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Maximum candles returned per klines request.
const KLINES_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
struct TickerPrice {
    #[allow(dead_code)]
    symbol: String,
    price: String,
}

/// Klines rows are positional arrays: `[open_time, open, high, low, close, ...]`.
type KlineRow = Vec<serde_json::Value>;

pub struct SpotMarketFeed {
    client: Client,
    base_url: String,
}

impl SpotMarketFeed {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn pair(base: &str, quote: &str) -> String {
        format!("{}{}", base.trim().to_uppercase(), quote.trim().to_uppercase())
    }

    async fn fetch_klines_page(
        &self,
        pair: &str,
        start: i64,
        end: i64,
    ) -> Result<Option<Vec<KlineRow>>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", pair.to_string()),
                ("interval", "1d".to_string()),
                ("startTime", start.to_string()),
                ("endTime", end.to_string()),
                ("limit", KLINES_LIMIT.to_string()),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to request klines for {pair}"))?;

        // Unknown pairs are rejected with 400 "Invalid symbol".
        if response.status() == StatusCode::BAD_REQUEST {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Market data API error: {status} - {body}"));
        }

        let rows: Vec<KlineRow> = response
            .json()
            .await
            .context("Failed to parse klines response")?;
        Ok(Some(rows))
    }
}

impl Default for SpotMarketFeed {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_kline(row: &KlineRow) -> Result<(i64, Decimal)> {
    let open_time = row
        .first()
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| anyhow!("kline row missing open time"))?;
    let close = row
        .get(4)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| anyhow!("kline row missing close price"))?;
    let close: Decimal = close
        .parse()
        .with_context(|| format!("Invalid close price: {close}"))?;
    Ok((open_time, close))
}

#[async_trait::async_trait]
impl PriceFeed for SpotMarketFeed {
    fn name(&self) -> &str {
        "spot"
    }

    async fn last_price(&self, base: &str, quote: &str) -> Result<Option<Decimal>> {
        let pair = Self::pair(base, quote);
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", pair.as_str())])
            .send()
            .await
            .with_context(|| format!("Failed to request ticker for {pair}"))?;

        if response.status() == StatusCode::BAD_REQUEST {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Market data API error: {status} - {body}"));
        }

        let ticker: TickerPrice = response
            .json()
            .await
            .context("Failed to parse ticker response")?;
        let price: Decimal = ticker
            .price
            .parse()
            .with_context(|| format!("Invalid ticker price: {}", ticker.price))?;
        Ok(Some(price))
    }

    async fn daily_closes(
        &self,
        base: &str,
        quote: &str,
        since: i64,
        until: i64,
    ) -> Result<BTreeMap<i64, Decimal>> {
        let pair = Self::pair(base, quote);
        let end = day_start(until) + DAY_MS - 1;
        let mut start = day_start(since);
        let mut closes = BTreeMap::new();

        while start <= end {
            let Some(rows) = self.fetch_klines_page(&pair, start, end).await? else {
                debug!(pair = %pair, "pair not listed, no closes");
                return Ok(BTreeMap::new());
            };

            let mut last_open = None;
            for row in &rows {
                let (open_time, close) = parse_kline(row)?;
                closes.insert(day_start(open_time), close);
                last_open = Some(open_time);
            }

            match last_open {
                Some(open) if rows.len() >= KLINES_LIMIT => start = day_start(open) + DAY_MS,
                _ => break,
            }
        }

        Ok(closes)
    }
}
