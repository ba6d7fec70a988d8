//! Integration tests for the execution router over a scripted chain.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Bytes, U256};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use signalbook::application::execution::{ExecutionConfig, ExecutionRouter};
use signalbook::domain::{Network, TradeDirection};
use signalbook::error::{ExecutionError, ExecutionFailureReason};
use signalbook::port::{ExecutionIntent, TradeExecutor, TxStatus};
use signalbook::testkit::dex::{ScriptedDex, QUOTE_TOKEN, ROUTER};
use signalbook::testkit::domain::{self, NETWORK};

fn fast_config() -> ExecutionConfig {
    ExecutionConfig {
        confirmation_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(1),
        ..ExecutionConfig::default()
    }
}

fn router(dex: &Arc<ScriptedDex>, config: ExecutionConfig) -> ExecutionRouter {
    ExecutionRouter::new(config).with_route(Network::new(NETWORK), dex.route(&[]))
}

fn intent(ticker: &str, direction: TradeDirection, amount: Decimal, price: Decimal) -> ExecutionIntent {
    ExecutionIntent {
        position_id: None,
        ticker: ticker.to_string(),
        contract: domain::contract(ticker),
        network: NETWORK.into(),
        direction,
        amount,
        reference_price: price,
        slippage: None,
    }
}

fn failure(err: ExecutionError) -> (ExecutionFailureReason, u32) {
    match err {
        ExecutionError::Failed { reason, attempts, .. } => (reason, attempts),
        other => panic!("expected surfaced failure, got {other}"),
    }
}

#[tokio::test]
async fn buy_confirms_on_first_attempt() {
    let dex = Arc::new(ScriptedDex::new().with_token("PEPE", dec!(0.5)));
    let router = router(&dex, fast_config());

    let report = router
        .execute(&intent("PEPE", TradeDirection::Buy, dec!(100), dec!(0.5)))
        .await
        .unwrap();

    assert_eq!(report.amount_in, dec!(100));
    assert_eq!(report.amount_out, dec!(200));
    assert_eq!(report.fill_price, dec!(0.5));
    assert_eq!(report.attempts, 1);
    assert!(!report.simulated);

    let submitted = dex.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].to, ROUTER);
    assert_eq!(submitted[0].nonce, 0);
    assert_eq!(submitted[0].gas_price, 1_100_000_000);
    assert_eq!(submitted[0].gas_limit, 165_000);
}

#[tokio::test]
async fn sell_prices_fill_from_quote() {
    let dex = Arc::new(ScriptedDex::new().with_token("PEPE", dec!(2)));
    let router = router(&dex, fast_config());

    let report = router
        .execute(&intent("PEPE", TradeDirection::Sell, dec!(50), dec!(2)))
        .await
        .unwrap();

    assert_eq!(report.amount_out, dec!(100));
    assert_eq!(report.fill_price, dec!(2));
}

#[tokio::test]
async fn transfer_fee_buy_reports_what_arrived() {
    let dex = Arc::new(ScriptedDex::new().with_token("TAX", dec!(1)));
    dex.set_transfer_fee("TAX", dec!(0.03));
    let router = ExecutionRouter::new(fast_config()).with_route(Network::new(NETWORK), dex.route(&["TAX"]));

    let report = router
        .execute(&intent("TAX", TradeDirection::Buy, dec!(100), dec!(1)))
        .await
        .unwrap();

    assert_eq!(report.amount_out, dec!(97));
    assert_eq!(dex.wallet_balance("TAX"), dec!(97));
    assert_eq!(report.fill_price, dec!(100) / dec!(97));
}

#[tokio::test]
async fn unreadable_balance_reports_minimum_output() {
    let dex = Arc::new(ScriptedDex::new().with_token("PEPE", dec!(1)));
    dex.hide_balances();
    let router = router(&dex, fast_config());

    let report = router
        .execute(&intent("PEPE", TradeDirection::Buy, dec!(100), dec!(1)))
        .await
        .unwrap();

    // 5% default slippage below the 100-token quote.
    assert_eq!(report.amount_out, dec!(95));
}

#[tokio::test]
async fn quote_below_decimal_precision_is_refused() {
    let dex = Arc::new(ScriptedDex::new().with_token("WIDE", dec!(1)));
    dex.set_decimals("WIDE", 36);
    dex.queue_quotes([U256::from(5u8)]);
    let router = router(&dex, fast_config());

    let err = router
        .execute(&intent("WIDE", TradeDirection::Buy, dec!(1), dec!(1)))
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::QuoteFailed(_)));
    assert!(dex.submitted().is_empty());
}

#[tokio::test]
async fn revert_is_retried_once_with_higher_gas() {
    let dex = Arc::new(ScriptedDex::new().with_token("PEPE", dec!(1)));
    dex.queue_receipts([TxStatus::Failed {
        reason: "status 0".into(),
    }]);
    let router = router(&dex, fast_config());

    let report = router
        .execute(&intent("PEPE", TradeDirection::Buy, dec!(100), dec!(1)))
        .await
        .unwrap();

    assert_eq!(report.attempts, 2);
    let submitted = dex.submitted();
    assert_eq!(submitted.len(), 2);
    // The reverted transaction was mined, so the retry takes the next nonce.
    assert_eq!(submitted[0].nonce, 0);
    assert_eq!(submitted[1].nonce, 1);
    assert!(submitted[1].gas_price > submitted[0].gas_price);
}

#[tokio::test]
async fn second_revert_surfaces_failure() {
    let dex = Arc::new(ScriptedDex::new().with_token("PEPE", dec!(1)));
    dex.queue_receipts([
        TxStatus::Failed {
            reason: "status 0".into(),
        },
        TxStatus::Failed {
            reason: "status 0".into(),
        },
    ]);
    let router = router(&dex, fast_config());

    let err = router
        .execute(&intent("PEPE", TradeDirection::Buy, dec!(100), dec!(1)))
        .await
        .unwrap_err();

    assert_eq!(failure(err), (ExecutionFailureReason::Reverted, 2));
}

#[tokio::test]
async fn output_bound_revert_is_slippage() {
    let dex = Arc::new(ScriptedDex::new().with_token("PEPE", dec!(1)));
    let revert = || TxStatus::Failed {
        reason: "UniswapV2Router: INSUFFICIENT_OUTPUT_AMOUNT".into(),
    };
    dex.queue_receipts([revert(), revert()]);
    let router = router(&dex, fast_config());

    let err = router
        .execute(&intent("PEPE", TradeDirection::Sell, dec!(10), dec!(1)))
        .await
        .unwrap_err();

    assert_eq!(failure(err).0, ExecutionFailureReason::SlippageExceeded);
}

#[tokio::test]
async fn gas_spike_refuses_before_broadcast() {
    let dex = Arc::new(ScriptedDex::new().with_token("PEPE", dec!(1)));
    dex.set_gas_price(5_000_000_000);
    let mut config = fast_config();
    config.gas.max_price_wei = Some(2_000_000_000);
    let router = router(&dex, config);

    let err = router
        .execute(&intent("PEPE", TradeDirection::Buy, dec!(100), dec!(1)))
        .await
        .unwrap_err();

    assert_eq!(failure(err), (ExecutionFailureReason::GasSpike, 0));
    assert!(dex.submitted().is_empty());
}

#[tokio::test]
async fn unconfirmed_swap_times_out_and_replaces_nonce() {
    let dex = Arc::new(ScriptedDex::new().with_token("PEPE", dec!(1)));
    dex.stall();
    let config = ExecutionConfig {
        confirmation_timeout: Duration::from_millis(20),
        ..fast_config()
    };
    let router = router(&dex, config);

    let err = router
        .execute(&intent("PEPE", TradeDirection::Buy, dec!(100), dec!(1)))
        .await
        .unwrap_err();

    assert_eq!(failure(err), (ExecutionFailureReason::Timeout, 2));
    let submitted = dex.submitted();
    assert_eq!(submitted.len(), 2);
    // Pending, not mined: the retry replaces the same nonce at a higher price.
    assert_eq!(submitted[0].nonce, submitted[1].nonce);
    assert!(submitted[1].gas_price > submitted[0].gas_price);
}

#[tokio::test]
async fn estimate_failure_counts_as_attempt() {
    let dex = Arc::new(ScriptedDex::new().with_token("PEPE", dec!(1)));
    dex.fail_estimate("execution reverted");
    let router = router(&dex, fast_config());

    let report = router
        .execute(&intent("PEPE", TradeDirection::Buy, dec!(100), dec!(1)))
        .await
        .unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(dex.submitted().len(), 1);
    assert_eq!(dex.submitted()[0].nonce, 0);
}

#[tokio::test]
async fn rejected_submit_refetches_nonce() {
    let dex = Arc::new(ScriptedDex::new().with_token("PEPE", dec!(1)));
    dex.fail_submit("nonce too low");
    let router = router(&dex, fast_config());

    router
        .execute(&intent("PEPE", TradeDirection::Buy, dec!(100), dec!(1)))
        .await
        .unwrap();

    assert_eq!(dex.nonce_reads(), 2);
}

#[tokio::test]
async fn dry_run_quotes_without_broadcast() {
    let dex = Arc::new(ScriptedDex::new().with_token("PEPE", dec!(0.25)));
    let router = router(
        &dex,
        ExecutionConfig {
            dry_run: true,
            ..fast_config()
        },
    );

    let report = router
        .execute(&intent("PEPE", TradeDirection::Buy, dec!(100), dec!(0.25)))
        .await
        .unwrap();

    assert!(report.simulated);
    assert_eq!(report.attempts, 0);
    assert_eq!(report.amount_out, dec!(400));
    assert!(report.tx_hash.starts_with("dry-run-"));
    assert!(dex.submitted().is_empty());
    assert_eq!(dex.nonce_reads(), 0);
}

#[tokio::test]
async fn short_allowance_is_approved_first() {
    let dex = Arc::new(ScriptedDex::new().with_token("PEPE", dec!(1)));
    dex.set_allowance(U256::ZERO);
    let router = router(&dex, fast_config());

    router
        .execute(&intent("PEPE", TradeDirection::Buy, dec!(100), dec!(1)))
        .await
        .unwrap();

    let submitted = dex.submitted();
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[0].to, QUOTE_TOKEN);
    assert_eq!(submitted[0].nonce, 0);
    assert_eq!(submitted[1].to, ROUTER);
    assert_eq!(submitted[1].nonce, 1);
}

#[tokio::test]
async fn builder_code_is_appended_to_calldata() {
    let dex = Arc::new(ScriptedDex::new().with_token("PEPE", dec!(1)));
    let router = router(
        &dex,
        ExecutionConfig {
            builder_code: Bytes::from_static(b"bc01"),
            ..fast_config()
        },
    );

    router
        .execute(&intent("PEPE", TradeDirection::Buy, dec!(100), dec!(1)))
        .await
        .unwrap();

    assert!(dex.submitted()[0].input.ends_with(b"bc01"));
}

#[tokio::test]
async fn unknown_network_is_unsupported() {
    let dex = Arc::new(ScriptedDex::new().with_token("PEPE", dec!(1)));
    let router = router(&dex, fast_config());
    let mut intent = intent("PEPE", TradeDirection::Buy, dec!(100), dec!(1));
    intent.network = "solana".into();

    let err = router.execute(&intent).await.unwrap_err();
    assert!(matches!(err, ExecutionError::UnsupportedNetwork(_)));
}

#[tokio::test]
async fn concurrent_swaps_never_share_a_nonce() {
    let dex = Arc::new(
        ScriptedDex::new()
            .with_token("PEPE", dec!(1))
            .with_token("WIF", dec!(2)),
    );
    let router = Arc::new(router(&dex, fast_config()));

    let handles: Vec<_> = ["PEPE", "WIF", "PEPE", "WIF"]
        .into_iter()
        .map(|ticker| {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                router
                    .execute(&intent(ticker, TradeDirection::Buy, dec!(10), dec!(1)))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let nonces: HashSet<u64> = dex.submitted().iter().map(|tx| tx.nonce).collect();
    assert_eq!(nonces.len(), 4);
}
