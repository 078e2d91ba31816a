use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// One filled spot trade against the quote currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub side: TradeSide,
    /// Quote-currency amount paid (buy) or received (sell).
    pub cost: Decimal,
    /// Base-asset amount bought or sold.
    pub amount: Decimal,
}

impl Trade {
    pub fn buy(cost: Decimal, amount: Decimal) -> Self {
        Self {
            side: TradeSide::Buy,
            cost,
            amount,
        }
    }

    pub fn sell(cost: Decimal, amount: Decimal) -> Self {
        Self {
            side: TradeSide::Sell,
            cost,
            amount,
        }
    }
}
