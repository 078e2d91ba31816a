use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::duration::deserialize_duration;
use crate::models::{normalize_symbol, TradeSide};

fn default_quote_currency() -> String {
    "USDT".to_string()
}

fn default_pegged_symbols() -> Vec<String> {
    vec!["USDT".to_string(), "USDC".to_string()]
}

fn default_min_value() -> Decimal {
    Decimal::ONE
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(60)
}

fn default_max_period_days() -> u32 {
    730
}

fn default_exchange_timeout() -> Duration {
    Duration::from_secs(15)
}

/// Portfolio cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a live snapshot is served without contacting exchanges.
    #[serde(default = "default_cache_ttl", deserialize_with = "deserialize_duration")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
        }
    }
}

/// History request limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Largest accepted `period_days`.
    pub max_period_days: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_period_days: default_max_period_days(),
        }
    }
}

/// Settings applied to every exchange call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    #[serde(
        default = "default_exchange_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub timeout: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            timeout: default_exchange_timeout(),
        }
    }
}

/// Public market data endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    /// Base URL of a Binance-compatible REST API. Uses the public endpoint
    /// when unset.
    pub base_url: Option<String>,
}

/// Declared balance of one symbol in a manual account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HoldingConfig {
    pub free: Decimal,
    pub used: Decimal,
}

/// One historical fill in a manual account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeConfig {
    pub symbol: String,
    pub side: TradeSide,
    pub cost: Decimal,
    pub amount: Decimal,
}

/// A configured exchange account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub id: String,
    #[serde(default)]
    pub holdings: BTreeMap<String, HoldingConfig>,
    #[serde(default)]
    pub trades: Vec<TradeConfig>,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to data directory. If relative, resolved from config file location.
    /// If not specified, defaults to the config file's directory.
    pub data_dir: Option<PathBuf>,

    /// Currency every holding is valued in.
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,

    /// Symbols valued at a fixed price of 1. The quote currency is always
    /// treated as pegged.
    #[serde(default = "default_pegged_symbols")]
    pub pegged_symbols: Vec<String>,

    /// Breakdown threshold used when a caller gives none.
    #[serde(default = "default_min_value")]
    pub default_min_value: Decimal,

    pub cache: CacheConfig,
    pub history: HistoryConfig,
    pub exchange: ExchangeConfig,
    pub market_data: MarketDataConfig,

    /// Symbol -> legacy ticker tried when trade history is empty.
    pub symbol_aliases: BTreeMap<String, String>,

    pub accounts: Vec<AccountConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            quote_currency: default_quote_currency(),
            pegged_symbols: default_pegged_symbols(),
            default_min_value: default_min_value(),
            cache: CacheConfig::default(),
            history: HistoryConfig::default(),
            exchange: ExchangeConfig::default(),
            market_data: MarketDataConfig::default(),
            symbol_aliases: BTreeMap::new(),
            accounts: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the data directory path.
    ///
    /// If `data_dir` is set and relative, it's resolved relative to `config_dir`.
    /// If `data_dir` is not set, returns `config_dir`.
    pub fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.to_path_buf(),
        }
    }
}

/// Loaded configuration with resolved paths and normalized symbols.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The resolved data directory path.
    pub data_dir: PathBuf,
    pub quote_currency: String,
    /// Upper-case pegged symbols, quote currency included.
    pub pegged_symbols: BTreeSet<String>,
    pub default_min_value: Decimal,
    pub cache: CacheConfig,
    pub history: HistoryConfig,
    pub exchange: ExchangeConfig,
    pub market_data: MarketDataConfig,
    /// Upper-case symbol -> upper-case alias.
    pub symbol_aliases: BTreeMap<String, String>,
    pub accounts: Vec<AccountConfig>,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./hodlbook.toml` if it exists in current directory
/// 2. `~/.local/share/hodlbook/hodlbook.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("hodlbook.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("hodlbook").join("hodlbook.toml");
    }

    local_config
}

impl ResolvedConfig {
    pub fn from_config(config: Config, config_dir: &Path) -> Self {
        let data_dir = config.resolve_data_dir(config_dir);
        let quote_currency = normalize_symbol(&config.quote_currency);

        let mut pegged_symbols: BTreeSet<String> = config
            .pegged_symbols
            .iter()
            .map(|s| normalize_symbol(s))
            .collect();
        pegged_symbols.insert(quote_currency.clone());

        let symbol_aliases = config
            .symbol_aliases
            .iter()
            .map(|(symbol, alias)| (normalize_symbol(symbol), normalize_symbol(alias)))
            .collect();

        Self {
            data_dir,
            quote_currency,
            pegged_symbols,
            default_min_value: config.default_min_value,
            cache: config.cache,
            history: config.history,
            exchange: config.exchange,
            market_data: config.market_data,
            symbol_aliases,
            accounts: config.accounts,
        }
    }

    /// Load and resolve config from a file path.
    ///
    /// The data directory is resolved relative to the config file's parent directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        Ok(Self::from_config(config, config_dir))
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    ///
    /// If the config file doesn't exist, uses the config file's intended
    /// parent directory as the data directory.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };

        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Ok(Self::from_config(Config::default(), config_dir))
    }
}
