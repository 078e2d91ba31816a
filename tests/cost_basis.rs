mod support;

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use hodlbook::error::PortfolioError;
use hodlbook::models::{CostSource, HoldingKey, Trade};
use hodlbook::portfolio::CostBasisResolver;
use hodlbook::storage::{MemoryStorage, Storage};
use rust_decimal_macros::dec;

use support::{clock_at, FlakyStorage, MockExchange, NOW};

fn resolver(storage: Arc<dyn Storage>) -> CostBasisResolver {
    CostBasisResolver::new(storage, clock_at(NOW))
}

fn btc_exchange() -> MockExchange {
    MockExchange::new("binance").with_trades(
        "BTC",
        vec![
            Trade::buy(dec!(10000), dec!(1.0)),
            Trade::sell(dec!(6000), dec!(0.5)),
        ],
    )
}

#[tokio::test]
async fn reconstructs_from_trades_and_persists_server_record() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let exchange = btc_exchange();

    let avg = resolver(storage.clone()).resolve(&exchange, "BTC", dec!(45000)).await;
    assert_eq!(avg, dec!(8000));

    let record = storage
        .get_cost(&HoldingKey::new("binance", "BTC"))
        .await?
        .expect("cost record stored");
    assert_eq!(record.avg_price, dec!(8000));
    assert_eq!(record.source, CostSource::Server);
    assert_eq!(record.update_time, NOW);
    Ok(())
}

#[tokio::test]
async fn second_resolve_is_served_from_store() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let exchange = btc_exchange();
    let resolver = resolver(storage);

    let first = resolver.resolve(&exchange, "BTC", dec!(45000)).await;
    let second = resolver.resolve(&exchange, "BTC", dec!(99999)).await;

    assert_eq!(first, second);
    assert_eq!(exchange.calls().trades, 1);
    Ok(())
}

#[tokio::test]
async fn client_override_wins_over_trade_history() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let exchange = btc_exchange();
    let resolver = resolver(storage.clone());
    let key = HoldingKey::new("binance", "BTC");

    let record = resolver.set_override(&key, dec!(31000)).await?;
    assert_eq!(record.source, CostSource::Client);

    let avg = resolver.resolve(&exchange, "BTC", dec!(45000)).await;
    assert_eq!(avg, dec!(31000));
    assert_eq!(exchange.calls().trades, 0);
    Ok(())
}

#[tokio::test]
async fn empty_history_falls_back_to_current_price() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let exchange = MockExchange::new("kraken");

    let avg = resolver(storage.clone()).resolve(&exchange, "ADA", dec!(0.45)).await;
    assert_eq!(avg, dec!(0.45));

    let record = storage
        .get_cost(&HoldingKey::new("kraken", "ADA"))
        .await?
        .expect("fallback stored");
    assert_eq!(record.avg_price, dec!(0.45));
    assert_eq!(record.source, CostSource::Server);
    Ok(())
}

#[tokio::test]
async fn alias_is_tried_when_history_is_empty() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let exchange = MockExchange::new("binance")
        .with_trades("RNDR", vec![Trade::buy(dec!(300), dec!(100))]);
    let resolver = resolver(storage).with_symbol_aliases(BTreeMap::from([(
        "RENDER".to_string(),
        "RNDR".to_string(),
    )]));

    let avg = resolver.resolve(&exchange, "RENDER", dec!(7)).await;
    assert_eq!(avg, dec!(3));
    assert_eq!(exchange.calls().trade_symbols, vec!["RENDER", "RNDR"]);
    Ok(())
}

#[tokio::test]
async fn trade_failure_returns_current_price_without_storing() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let exchange = btc_exchange().failing_trades();

    let avg = resolver(storage.clone()).resolve(&exchange, "BTC", dec!(45000)).await;
    assert_eq!(avg, dec!(45000));
    assert!(storage
        .get_cost(&HoldingKey::new("binance", "BTC"))
        .await?
        .is_none());
    Ok(())
}

#[tokio::test]
async fn unreadable_store_returns_current_price() -> Result<()> {
    let storage = Arc::new(FlakyStorage::default());
    storage.fail_reads.store(true, Ordering::SeqCst);
    let exchange = btc_exchange();

    let avg = resolver(storage).resolve(&exchange, "BTC", dec!(45000)).await;
    assert_eq!(avg, dec!(45000));
    assert_eq!(exchange.calls().trades, 0);
    Ok(())
}

#[tokio::test]
async fn unwritable_store_still_returns_reconstruction() -> Result<()> {
    let storage = Arc::new(FlakyStorage::default());
    storage.fail_cost_writes.store(true, Ordering::SeqCst);

    let avg = resolver(storage).resolve(&btc_exchange(), "BTC", dec!(45000)).await;
    assert_eq!(avg, dec!(8000));
    Ok(())
}

#[tokio::test]
async fn override_rejects_negative_price_and_surfaces_write_failure() -> Result<()> {
    let key = HoldingKey::new("binance", "ETH");

    let memory = resolver(Arc::new(MemoryStorage::new()));
    assert!(matches!(
        memory.set_override(&key, dec!(-1)).await,
        Err(PortfolioError::Validation(_))
    ));
    assert_eq!(memory.set_override(&key, dec!(0)).await?.avg_price, dec!(0));

    let flaky = Arc::new(FlakyStorage::default());
    flaky.fail_cost_writes.store(true, Ordering::SeqCst);
    assert!(matches!(
        resolver(flaky).set_override(&key, dec!(2000)).await,
        Err(PortfolioError::Persistence(_))
    ));
    Ok(())
}

#[tokio::test]
async fn historical_close_is_not_stored_as_cost_basis() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let exchange = MockExchange::new("binance");
    let resolver = resolver(storage.clone());

    let avg = resolver.resolve_historical(&exchange, "ETH", dec!(1200)).await;
    assert_eq!(avg, dec!(1200));
    assert!(storage
        .get_cost(&HoldingKey::new("binance", "ETH"))
        .await?
        .is_none());

    // A later live valuation still falls back to the current price.
    let live = resolver.resolve(&exchange, "ETH", dec!(3000)).await;
    assert_eq!(live, dec!(3000));
    Ok(())
}

#[tokio::test]
async fn historical_resolve_stores_trade_reconstruction() -> Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let exchange = btc_exchange();

    let avg = resolver(storage.clone())
        .resolve_historical(&exchange, "BTC", dec!(1200))
        .await;
    assert_eq!(avg, dec!(8000));

    let record = storage
        .get_cost(&HoldingKey::new("binance", "BTC"))
        .await?
        .expect("reconstructed cost stored");
    assert_eq!(record.avg_price, dec!(8000));
    Ok(())
}
