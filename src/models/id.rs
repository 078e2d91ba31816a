use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid exchange id {value:?}: ids must be non-empty and contain no whitespace")]
pub struct ExchangeIdError {
    value: String,
}

/// Identifier of a configured exchange account (e.g. `binance`, `okx-sub1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(String);

impl ExchangeId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Create an id, rejecting empty values and embedded whitespace.
    pub fn parse(value: impl Into<String>) -> Result<Self, ExchangeIdError> {
        let value = value.into();
        if value.is_empty() || value.chars().any(char::is_whitespace) {
            Err(ExchangeIdError { value })
        } else {
            Ok(Self(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ExchangeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ExchangeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ExchangeId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
