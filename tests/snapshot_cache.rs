mod support;

use std::sync::Arc;

use anyhow::Result;
use hodlbook::models::ExchangeId;
use hodlbook::storage::MemoryStorage;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use support::{service_at, MockExchange, NOW};

fn exchange() -> Arc<MockExchange> {
    MockExchange::new("binance")
        .with_balance("BTC", dec!(0.001), dec!(0))
        .with_price("BTC", dec!(50000))
        .with_balance("ETH", dec!(1), dec!(0))
        .with_price("ETH", dec!(2000))
        .shared()
}

#[tokio::test]
async fn fresh_snapshot_is_served_without_exchange_calls() -> Result<()> {
    let exchange = exchange();
    let storage = Arc::new(MemoryStorage::new());

    let first = service_at(NOW, &[exchange.clone()], storage.clone())
        .get_current_portfolio(Decimal::ZERO)
        .await?;
    assert!(!first.cached);
    let calls_after_first = exchange.calls();

    let second = service_at(NOW + 59_000, &[exchange.clone()], storage)
        .get_current_portfolio(dec!(100))
        .await?;

    assert!(second.cached);
    assert_eq!(exchange.calls().balance, calls_after_first.balance);
    assert_eq!(exchange.calls().price, calls_after_first.price);
    assert_eq!(second.summary, first.summary);

    // Re-filtered from the stored breakdown.
    let assets = &second.exchanges[&ExchangeId::from("binance")];
    assert!(!assets.contains_key("BTC"));
    assert!(assets.contains_key("ETH"));
    Ok(())
}

#[tokio::test]
async fn expired_snapshot_triggers_recompute() -> Result<()> {
    let exchange = exchange();
    let storage = Arc::new(MemoryStorage::new());

    service_at(NOW, &[exchange.clone()], storage.clone())
        .get_current_portfolio(Decimal::ZERO)
        .await?;
    let report = service_at(NOW + 61_000, &[exchange.clone()], storage.clone())
        .get_current_portfolio(Decimal::ZERO)
        .await?;

    assert!(!report.cached);
    assert_eq!(exchange.calls().balance, 2);
    assert_eq!(storage.snapshot_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_misses_converge_to_one_snapshot() -> Result<()> {
    let exchange = exchange();
    let storage = Arc::new(MemoryStorage::new());
    let service = service_at(NOW, &[exchange], storage.clone());

    let (a, b) = tokio::join!(
        service.get_current_portfolio(Decimal::ZERO),
        service.get_current_portfolio(Decimal::ZERO)
    );

    assert_eq!(a?.summary, b?.summary);
    assert_eq!(storage.snapshot_count().await, 1);
    Ok(())
}
