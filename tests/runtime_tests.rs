//! The assembled runtime: signals in, positions out, clean shutdown.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use signalbook::adapter::outbound::memory::MemoryStore;
use signalbook::application::ledger::PositionLedger;
use signalbook::domain::{AgentId, PositionStatus, TradeAction};
use signalbook::infrastructure::bootstrap::{Ports, Runtime};
use signalbook::testkit::dex::ScriptedDex;
use signalbook::testkit::market::MockMarket;
use signalbook::testkit::notifier::RecordingNotifier;
use signalbook::testkit::oracle::ScriptedOracle;
use signalbook::testkit::{config, domain};
use tokio::sync::{mpsc, oneshot};

struct Stack {
    ports: Ports,
    store: Arc<MemoryStore>,
    notifier: Arc<RecordingNotifier>,
}

fn stack(score: f64) -> Stack {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let ports = Ports {
        market: Arc::new(MockMarket::new().with_token("PEPE", dec!(0.5))),
        oracle: Arc::new(ScriptedOracle::fixed(score)),
        dex: Arc::new(ScriptedDex::new().with_token("PEPE", dec!(0.5))),
        store: store.clone(),
        performance: store.clone(),
        notifier: notifier.clone(),
    };
    Stack {
        ports,
        store,
        notifier,
    }
}

async fn wait_for_positions(ledger: &PositionLedger, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while ledger.snapshot().positions.len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no position opened within 5s"));
}

#[tokio::test]
async fn signal_opens_position_and_shutdown_is_clean() {
    let Stack {
        ports,
        store,
        notifier,
    } = stack(0.9);
    let runtime = Runtime::assemble(&config::config(), ports).unwrap();
    let ledger = Arc::clone(&runtime.ledger);

    let (signals_tx, signals) = mpsc::channel(8);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = tokio::spawn(runtime.run_until(signals, async {
        let _ = stop_rx.await;
    }));

    signals_tx.send(domain::event("alpha", "PEPE")).await.unwrap();
    wait_for_positions(&ledger, 1).await;

    stop_tx.send(()).unwrap();
    run.await.unwrap().unwrap();

    let snapshot = ledger.snapshot();
    let position = &snapshot.positions[0];
    assert_eq!(position.status(), PositionStatus::Open);
    assert_eq!(position.quantity(), dec!(200));
    assert_eq!(snapshot.open_count(&AgentId::new("alpha")), 1);
    assert_eq!(snapshot.balance_usd, dec!(2400));

    let trades = store.all_trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].action, TradeAction::Open);
    assert_eq!(store.scores().len(), 1);
    assert!(notifier.rejection_codes().is_empty());
}

#[tokio::test]
async fn price_history_outlives_the_longest_window_only() {
    let Stack { ports, .. } = stack(0.9);
    let mut config = config::config();
    config.rebalance.scheduled_window_days = 20;
    config.rebalance.overflow_window_days = 7;

    let runtime = Runtime::assemble(&config, ports).unwrap();
    assert_eq!(runtime.board.retention(), Some(chrono::Duration::days(21)));
}

#[tokio::test]
async fn rejected_signal_is_reported_and_runtime_keeps_going() {
    let Stack {
        ports,
        store,
        notifier,
    } = stack(0.1);
    let runtime = Runtime::assemble(&config::config(), ports).unwrap();
    let ledger = Arc::clone(&runtime.ledger);

    let (signals_tx, signals) = mpsc::channel(8);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = tokio::spawn(runtime.run_until(signals, async {
        let _ = stop_rx.await;
    }));

    signals_tx.send(domain::event("alpha", "PEPE")).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while notifier.rejection_codes().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    stop_tx.send(()).unwrap();
    run.await.unwrap().unwrap();

    assert_eq!(notifier.rejection_codes(), vec!["LowConfidence"]);
    assert!(ledger.snapshot().positions.is_empty());
    assert!(store.all_trades().is_empty());
}

#[tokio::test]
async fn closed_signal_source_does_not_stop_the_runtime() {
    let Stack { ports, .. } = stack(0.9);
    let runtime = Runtime::assemble(&config::config(), ports).unwrap();

    let (signals_tx, signals) = mpsc::channel(1);
    drop(signals_tx);

    let result = runtime
        .run_until(signals, tokio::time::sleep(Duration::from_millis(50)))
        .await;
    assert!(result.is_ok());
}
