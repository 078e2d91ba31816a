use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Raw per-symbol balance as reported by an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawBalance {
    pub free: Decimal,
    pub used: Decimal,
    pub total: Decimal,
}

impl RawBalance {
    /// Balance whose total is `free + used`.
    pub fn new(free: Decimal, used: Decimal) -> Self {
        Self {
            free,
            used,
            total: free + used,
        }
    }
}

/// Every symbol an account reports, keyed by upper-case symbol.
pub type BalanceSheet = BTreeMap<String, RawBalance>;
