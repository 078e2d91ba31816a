use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use hodlbook::clock::{Clock, SystemClock};
use hodlbook::config::{default_config_path, ResolvedConfig};
use hodlbook::duration::format_duration;
use hodlbook::exchange::{build_accounts, SpotMarketFeed};
use hodlbook::models::{day_start, DAY_MS};
use hodlbook::portfolio::PortfolioService;
use hodlbook::storage::{JsonFileStorage, Storage};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "hodlbook")]
#[command(about = "Crypto portfolio valuation and history across exchange accounts")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show current configuration
    Config,
    /// Value every account (served from cache when fresh)
    Portfolio {
        /// Hide assets worth less than this from the breakdown
        #[arg(long)]
        min_value: Option<Decimal>,
    },
    /// Daily snapshots for the last N days, backfilling gaps
    History {
        #[arg(long)]
        period: u32,
    },
    /// Override the average acquisition price of a holding
    SetCost {
        exchange: String,
        symbol: String,
        price: Decimal,
    },
    /// List stored asset documents
    Assets,
    /// Store the end-of-day snapshot for a date (default: yesterday, UTC)
    RecordDaily {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Record the end-of-day snapshot after every UTC midnight
    Daemon,
}

#[derive(Serialize)]
struct ConfigOutput {
    config_file: String,
    data_dir: String,
    quote_currency: String,
    pegged_symbols: Vec<String>,
    default_min_value: Decimal,
    cache_ttl: String,
    exchange_timeout: String,
    max_period_days: u32,
    accounts: Vec<String>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_service(config: &ResolvedConfig) -> Result<PortfolioService> {
    let client = reqwest::Client::builder()
        .timeout(config.exchange.timeout)
        .build()
        .context("Failed to build HTTP client")?;
    let mut feed = SpotMarketFeed::new().with_client(client);
    if let Some(base_url) = &config.market_data.base_url {
        feed = feed.with_base_url(base_url);
    }

    let accounts = build_accounts(&config.accounts, &config.quote_currency, Arc::new(feed))?;
    let storage: Arc<dyn Storage> = Arc::new(JsonFileStorage::new(&config.data_dir));
    Ok(PortfolioService::from_config(
        config,
        accounts,
        storage,
        Arc::new(SystemClock),
    ))
}

fn date_to_day_ms(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Time left until the next UTC midnight.
fn delay_until_next_day(now: DateTime<Utc>) -> Duration {
    let now_ms = now.timestamp_millis();
    let next = day_start(now_ms) + DAY_MS;
    Duration::from_millis(u64::try_from(next - now_ms).unwrap_or(0))
}

async fn run_daemon(service: &PortfolioService) -> Result<()> {
    let clock = SystemClock;
    info!("daemon started");

    loop {
        let delay = delay_until_next_day(clock.now());
        info!(next_run_in = %format_duration(delay), "waiting for day close");
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        tokio::select! {
            _ = &mut sleep => {
                let day = clock.today_start_ms() - DAY_MS;
                match service.record_daily_snapshot(day).await {
                    Ok(snapshot) => info!(
                        timestamp = snapshot.timestamp,
                        total = %snapshot.summary.total,
                        "recorded daily snapshot"
                    ),
                    Err(e) => error!(timestamp = day, error = %e, "daily snapshot failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = ResolvedConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load hodlbook config: {}", config_path.display()))?;

    match cli.command {
        Command::Config => print_json(&ConfigOutput {
            config_file: config_path.display().to_string(),
            data_dir: config.data_dir.display().to_string(),
            quote_currency: config.quote_currency.clone(),
            pegged_symbols: config.pegged_symbols.iter().cloned().collect(),
            default_min_value: config.default_min_value,
            cache_ttl: format_duration(config.cache.ttl),
            exchange_timeout: format_duration(config.exchange.timeout),
            max_period_days: config.history.max_period_days,
            accounts: config.accounts.iter().map(|a| a.id.clone()).collect(),
        }),
        Command::Portfolio { min_value } => {
            let service = build_service(&config)?;
            let min_value = min_value.unwrap_or(config.default_min_value);
            print_json(&service.get_current_portfolio(min_value).await?)
        }
        Command::History { period } => {
            let service = build_service(&config)?;
            print_json(&service.get_history(period).await?)
        }
        Command::SetCost {
            exchange,
            symbol,
            price,
        } => {
            let service = build_service(&config)?;
            print_json(&service.set_cost_override(&exchange, &symbol, price).await?)
        }
        Command::Assets => {
            let service = build_service(&config)?;
            print_json(&service.list_assets().await?)
        }
        Command::RecordDaily { date } => {
            let service = build_service(&config)?;
            let day = date
                .map(date_to_day_ms)
                .unwrap_or_else(|| SystemClock.today_start_ms() - DAY_MS);
            print_json(&service.record_daily_snapshot(day).await?)
        }
        Command::Daemon => {
            let service = build_service(&config)?;
            run_daemon(&service).await
        }
    }
}
