mod asset;
mod balance;
mod cost;
mod day;
mod id;
mod snapshot;
mod trade;

pub(crate) use asset::normalize_symbol;
pub use asset::{Asset, HoldingKey};
pub use balance::{BalanceSheet, RawBalance};
pub use cost::{CostRecord, CostSource};
pub use day::{day_start, days_between, DAY_MS};
pub use id::{ExchangeId, ExchangeIdError};
pub use snapshot::{ExchangeAssets, PortfolioSummary, Snapshot, SnapshotOrigin, SummaryTotals};
pub use trade::{Trade, TradeSide};
