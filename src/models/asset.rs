use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ExchangeId;

/// Composite key identifying one holding: a symbol on a specific exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HoldingKey {
    pub exchange: ExchangeId,
    pub symbol: String,
}

impl HoldingKey {
    pub fn new(exchange: impl Into<ExchangeId>, symbol: impl AsRef<str>) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: normalize_symbol(symbol.as_ref()),
        }
    }
}

impl fmt::Display for HoldingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)
    }
}

pub(crate) fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Current, fully priced state of one holding.
///
/// All monetary fields are exact decimals and persist as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub exchange: ExchangeId,
    pub symbol: String,
    pub free: Decimal,
    pub used: Decimal,
    pub total: Decimal,
    pub avg_price: Decimal,
    pub current_price: Decimal,
    /// Return on investment in percent.
    pub roi: Decimal,
    /// Value in quote currency.
    pub value: Decimal,
    /// Unrealized profit in quote currency.
    pub profit: Decimal,
    /// Epoch milliseconds.
    pub update_time: i64,
}

impl Asset {
    pub fn key(&self) -> HoldingKey {
        HoldingKey::new(self.exchange.clone(), &self.symbol)
    }

    /// What the holding cost to acquire: `total * avg_price`.
    pub fn initial_cost(&self) -> Decimal {
        self.total * self.avg_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holding_key_normalizes_symbol() {
        let key = HoldingKey::new("binance", " btc ");
        assert_eq!(key.symbol, "BTC");
        assert_eq!(key.to_string(), "binance:BTC");
    }

    #[test]
    fn test_holding_keys_do_not_collide_on_separators() {
        let a = HoldingKey::new("a_b", "C");
        let b = HoldingKey::new("a", "B_C");
        assert_ne!(a, b);
    }
}
