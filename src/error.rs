use crate::models::ExchangeId;

/// Failure of a single exchange call.
///
/// These never reach callers of the read operations: the affected account or
/// symbol is logged and left out of the result.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// Transport, authentication or timeout failure.
    #[error("{exchange} unreachable: {message}")]
    Connectivity { exchange: ExchangeId, message: String },

    /// The exchange has no ticker, candles or trades for the instrument.
    #[error("no market data for {symbol} on {exchange}")]
    DataUnavailable { exchange: ExchangeId, symbol: String },
}

impl ExchangeError {
    pub fn connectivity(exchange: &ExchangeId, message: impl Into<String>) -> Self {
        Self::Connectivity {
            exchange: exchange.clone(),
            message: message.into(),
        }
    }

    pub fn unavailable(exchange: &ExchangeId, symbol: impl Into<String>) -> Self {
        Self::DataUnavailable {
            exchange: exchange.clone(),
            symbol: symbol.into(),
        }
    }
}

/// Errors surfaced by the portfolio operations.
#[derive(Debug, thiserror::Error)]
pub enum PortfolioError {
    /// Rejected input, detected before any I/O.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A write to the document store failed.
    #[error("persistence failure: {0:#}")]
    Persistence(anyhow::Error),

    /// No account could be valued, so there is nothing worth storing.
    #[error("no account could be valued: {0}")]
    Unavailable(String),
}

impl PortfolioError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
