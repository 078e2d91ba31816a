// src/portfolio/valuator.rs
//! Pure conversion of a raw balance into a priced [`Asset`].

use rust_decimal::Decimal;

use crate::models::{normalize_symbol, Asset, ExchangeId, RawBalance};

/// Return on investment in percent, zero when nothing was invested.
pub fn roi_percent(profit: Decimal, initial: Decimal) -> Decimal {
    if initial <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    profit
        .checked_div(initial)
        .map(|ratio| (ratio * Decimal::ONE_HUNDRED).normalize())
        .unwrap_or(Decimal::ZERO)
}

/// Price a holding. Returns `None` for balances with `total <= 0`, which are
/// not part of the portfolio.
///
/// The reported `total` is authoritative: `free` is clamped into
/// `0..=total` and `used` is whatever remains, so `total = free + used`
/// always holds on the result.
pub fn value_asset(
    exchange: &ExchangeId,
    symbol: &str,
    balance: &RawBalance,
    avg_price: Decimal,
    current_price: Decimal,
    update_time: i64,
) -> Option<Asset> {
    let total = balance.total;
    if total <= Decimal::ZERO {
        return None;
    }

    let free = balance.free.max(Decimal::ZERO).min(total);
    let used = total - free;
    let value = total * current_price;
    let profit = (current_price - avg_price) * total;
    let roi = roi_percent(profit, avg_price * total);

    Some(Asset {
        exchange: exchange.clone(),
        symbol: normalize_symbol(symbol),
        free,
        used,
        total,
        avg_price,
        current_price,
        roi,
        value,
        profit,
        update_time,
    })
}

/// Price a holding pegged 1:1 to the quote currency.
pub fn value_pegged(
    exchange: &ExchangeId,
    symbol: &str,
    balance: &RawBalance,
    update_time: i64,
) -> Option<Asset> {
    value_asset(exchange, symbol, balance, Decimal::ONE, Decimal::ONE, update_time)
}
