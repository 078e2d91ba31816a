use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ExchangeId, HoldingKey};

/// Who produced a cost basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostSource {
    /// Explicit override supplied by the user.
    Client,
    /// Reconstructed from trade history (or current price fallback).
    Server,
}

/// Durable average acquisition price for one (exchange, symbol).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostRecord {
    pub exchange: ExchangeId,
    pub symbol: String,
    pub avg_price: Decimal,
    /// Epoch milliseconds.
    pub update_time: i64,
    pub source: CostSource,
}

impl CostRecord {
    pub fn new(key: &HoldingKey, avg_price: Decimal, update_time: i64, source: CostSource) -> Self {
        Self {
            exchange: key.exchange.clone(),
            symbol: key.symbol.clone(),
            avg_price,
            update_time,
            source,
        }
    }

    pub fn key(&self) -> HoldingKey {
        HoldingKey::new(self.exchange.clone(), &self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_record_serializes_decimal_as_string() {
        let key = HoldingKey::new("binance", "BTC");
        let record = CostRecord::new(
            &key,
            Decimal::new(80005, 1),
            1_700_000_000_000,
            CostSource::Server,
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["avg_price"], "8000.5");
        assert_eq!(json["source"], "server");

        let back: CostRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
