//! Integration tests for the rebalancing engine: price rules, evictions and
//! failure handling against a scripted executor.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use signalbook::adapter::outbound::memory::MemoryStore;
use signalbook::application::ledger::{LedgerLimits, PositionLedger};
use signalbook::application::monitor::PriceBoard;
use signalbook::application::rebalance::{DecisionOutcome, RebalanceConfig, RebalancingEngine};
use signalbook::domain::{
    CapacityScope, DecisionKind, ExitReason, Position, PositionStatus, PriceChangeEvent,
    SignalRejection, TradeAction, TradeDirection,
};
use signalbook::error::ExecutionFailureReason;
use signalbook::port::Event;
use signalbook::testkit::dex::ScriptedExecutor;
use signalbook::testkit::domain;
use signalbook::testkit::market::MockMarket;
use signalbook::testkit::notifier::RecordingNotifier;

struct Harness {
    engine: RebalancingEngine,
    ledger: Arc<PositionLedger>,
    board: Arc<PriceBoard>,
    executor: Arc<ScriptedExecutor>,
    store: Arc<MemoryStore>,
    notifier: Arc<RecordingNotifier>,
}

impl Harness {
    fn new(limits: LedgerLimits) -> Self {
        let ledger = Arc::new(PositionLedger::new(limits));
        let board = Arc::new(PriceBoard::new());
        let executor = Arc::new(ScriptedExecutor::new());
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = RebalancingEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&board),
            Arc::new(MockMarket::new()),
            executor.clone(),
            store.clone(),
            notifier.clone(),
            RebalanceConfig::default(),
        );
        Self {
            engine,
            ledger,
            board,
            executor,
            store,
            notifier,
        }
    }

    async fn open(&self, agent: &str, ticker: &str, price: Decimal) -> Position {
        self.engine
            .buy(domain::admitted(agent, ticker, price, Utc::now()))
            .await
            .unwrap_or_else(|e| panic!("buy {ticker} for {agent}: {e}"))
    }

    async fn price(&self, position: &Position, price: Decimal, at: DateTime<Utc>) -> DecisionOutcome {
        self.board.record(position.id(), price, at);
        self.engine
            .on_price_change(&PriceChangeEvent {
                position_id: position.id(),
                price_change_pct: position.price_change_pct(price),
                current_price: price,
                observed_at: at,
            })
            .await
    }

    fn status(&self, position: &Position) -> PositionStatus {
        self.ledger.position(position.id()).map(|p| p.status()).unwrap()
    }
}

fn applied_kind(outcome: &DecisionOutcome) -> Option<DecisionKind> {
    match outcome {
        DecisionOutcome::Applied { kind, .. } => Some(*kind),
        _ => None,
    }
}

fn limits(agent_cap: usize, global_cap: usize) -> LedgerLimits {
    LedgerLimits {
        global_cap,
        default_agent_cap: agent_cap,
        ..LedgerLimits::default()
    }
}

#[tokio::test]
async fn buy_records_open_trade_and_notifies() {
    let h = Harness::new(LedgerLimits::default());
    let position = h.open("alpha", "PEPE", dec!(0.5)).await;

    assert_eq!(position.entry_price(), dec!(0.5));
    assert_eq!(position.quantity(), dec!(200));
    assert_eq!(h.ledger.balance(), dec!(2400));

    let trades = h.store.all_trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].action, TradeAction::Open);
    assert_eq!(trades[0].tx_hash.as_deref(), Some("0xfill1"));
    assert_eq!(h.notifier.count(|e| matches!(e, Event::PositionOpened(_))), 1);
}

#[tokio::test]
async fn take_profit_then_graduation() {
    let h = Harness::new(LedgerLimits::default());
    let position = h.open("alpha", "PEPE", dec!(1)).await;
    let t1 = Utc::now() + Duration::hours(1);

    let outcome = h.price(&position, dec!(2), t1).await;
    assert_eq!(applied_kind(&outcome), Some(DecisionKind::TakeProfit));
    assert_eq!(h.status(&position), PositionStatus::PartialTaken);

    let sell = h.executor.intents().pop().unwrap();
    assert_eq!(sell.direction, TradeDirection::Sell);
    assert_eq!(sell.amount, dec!(50));

    let outcome = h.price(&position, dec!(2.1), t1 + Duration::hours(1)).await;
    assert_eq!(applied_kind(&outcome), Some(DecisionKind::Graduate));
    assert_eq!(h.status(&position), PositionStatus::Graduated);

    // Graduated positions hold forever, whatever the price does.
    let outcome = h.price(&position, dec!(0.1), t1 + Duration::hours(2)).await;
    assert_eq!(outcome, DecisionOutcome::Held);
    assert_eq!(h.status(&position), PositionStatus::Graduated);

    let actions: Vec<TradeAction> = h.store.all_trades().iter().map(|t| t.action).collect();
    assert_eq!(
        actions,
        vec![TradeAction::Open, TradeAction::PartialSell, TradeAction::Graduate]
    );
}

#[tokio::test]
async fn graduated_position_frees_its_slot() {
    let h = Harness::new(limits(1, 25));
    let position = h.open("alpha", "PEPE", dec!(1)).await;
    let t1 = Utc::now() + Duration::hours(1);
    h.price(&position, dec!(2), t1).await;
    h.price(&position, dec!(2), t1 + Duration::hours(1)).await;
    assert_eq!(h.status(&position), PositionStatus::Graduated);

    let second = h.open("alpha", "WIF", dec!(1)).await;
    assert_eq!(h.status(&second), PositionStatus::Open);
    assert_eq!(h.status(&position), PositionStatus::Graduated);
}

#[tokio::test]
async fn stop_loss_closes_position() {
    let h = Harness::new(LedgerLimits::default());
    let position = h.open("alpha", "PEPE", dec!(1)).await;

    let outcome = h.price(&position, dec!(0.5), Utc::now() + Duration::hours(1)).await;
    assert_eq!(applied_kind(&outcome), Some(DecisionKind::StopLoss));
    assert_eq!(h.status(&position), PositionStatus::Closed);

    let close = h.store.all_trades().pop().unwrap();
    assert_eq!(close.action, TradeAction::Close);
    assert_eq!(close.exit_reason, Some(ExitReason::StopLoss));
    assert_eq!(close.exit_price, Some(dec!(0.5)));
    assert!(!h.ledger.holds(&"alpha".into(), &domain::contract("PEPE")));
}

#[tokio::test]
async fn small_moves_hold() {
    let h = Harness::new(LedgerLimits::default());
    let position = h.open("alpha", "PEPE", dec!(1)).await;

    let outcome = h.price(&position, dec!(1.4), Utc::now() + Duration::hours(1)).await;
    assert_eq!(outcome, DecisionOutcome::Held);
    assert_eq!(h.executor.intents().len(), 1);
}

#[tokio::test]
async fn failed_sell_leaves_ledger_untouched_and_retries() {
    let h = Harness::new(LedgerLimits::default());
    let position = h.open("alpha", "PEPE", dec!(1)).await;
    h.executor.fail_next([ExecutionFailureReason::SlippageExceeded]);
    let t1 = Utc::now() + Duration::hours(1);

    let outcome = h.price(&position, dec!(0.4), t1).await;
    assert!(matches!(
        outcome,
        DecisionOutcome::Failed {
            kind: DecisionKind::StopLoss,
            ..
        }
    ));
    let unchanged = h.ledger.position(position.id()).unwrap();
    assert_eq!(unchanged.status(), PositionStatus::Open);
    assert_eq!(unchanged.quantity(), position.quantity());
    assert_eq!(h.notifier.count(|e| matches!(e, Event::ExecutionFailed(_))), 1);

    let outcome = h.price(&position, dec!(0.4), t1 + Duration::hours(1)).await;
    assert_eq!(applied_kind(&outcome), Some(DecisionKind::StopLoss));
}

#[tokio::test]
async fn stale_price_is_superseded() {
    let h = Harness::new(LedgerLimits::default());
    let position = h.open("alpha", "PEPE", dec!(1)).await;
    let t1 = Utc::now() + Duration::hours(1);
    h.board.record(position.id(), dec!(1), t1 + Duration::minutes(5));

    let outcome = h
        .engine
        .on_price_change(&PriceChangeEvent {
            position_id: position.id(),
            price_change_pct: dec!(-0.6),
            current_price: dec!(0.4),
            observed_at: t1,
        })
        .await;
    assert_eq!(outcome, DecisionOutcome::Superseded(DecisionKind::StopLoss));
    assert_eq!(h.status(&position), PositionStatus::Open);
}

#[tokio::test]
async fn failed_buy_releases_reservation() {
    let h = Harness::new(limits(1, 25));
    h.executor.block("PEPE");

    let err = h
        .engine
        .buy(domain::admitted("alpha", "PEPE", dec!(1), Utc::now()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ExecutionFailed");
    assert_eq!(h.ledger.balance(), dec!(2500));
    assert!(h.ledger.snapshot().positions.is_empty());

    h.executor.unblock("PEPE");
    h.open("alpha", "PEPE", dec!(1)).await;
}

#[tokio::test]
async fn duplicate_buy_is_already_held() {
    let h = Harness::new(LedgerLimits::default());
    h.open("alpha", "PEPE", dec!(1)).await;

    let err = h
        .engine
        .buy(domain::admitted("alpha", "PEPE", dec!(1), Utc::now()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "AlreadyHeld");
}

#[tokio::test]
async fn agent_overflow_evicts_worst_seven_day_performer() {
    let h = Harness::new(limits(2, 25));
    let pepe = h.open("alpha", "PEPE", dec!(1)).await;
    let wif = h.open("alpha", "WIF", dec!(1)).await;
    let now = Utc::now();
    h.board.record(pepe.id(), dec!(0.8), now);
    h.board.record(wif.id(), dec!(1.1), now);

    let bonk = h
        .engine
        .buy(domain::admitted("alpha", "BONK", dec!(1), now + Duration::seconds(1)))
        .await
        .unwrap();

    assert_eq!(h.status(&pepe), PositionStatus::Closed);
    assert_eq!(h.status(&wif), PositionStatus::Open);
    assert_eq!(h.status(&bonk), PositionStatus::Open);
    let eviction = h
        .store
        .all_trades()
        .into_iter()
        .find(|t| t.action == TradeAction::Close)
        .unwrap();
    assert_eq!(eviction.exit_reason, Some(ExitReason::OverflowEviction));
    assert_eq!(eviction.exit_price, Some(dec!(0.8)));
}

#[tokio::test]
async fn global_overflow_evicts_across_agents() {
    let h = Harness::new(limits(5, 2));
    let pepe = h.open("alpha", "PEPE", dec!(1)).await;
    let wif = h.open("beta", "WIF", dec!(1)).await;
    let now = Utc::now();
    h.board.record(pepe.id(), dec!(1.5), now);
    h.board.record(wif.id(), dec!(0.9), now);

    h.engine
        .buy(domain::admitted("gamma", "BONK", dec!(1), now + Duration::seconds(1)))
        .await
        .unwrap();

    assert_eq!(h.status(&wif), PositionStatus::Closed);
    assert_eq!(h.status(&pepe), PositionStatus::Open);
}

#[tokio::test]
async fn failed_eviction_rejects_buy() {
    let h = Harness::new(limits(1, 25));
    h.open("alpha", "PEPE", dec!(1)).await;
    h.executor.block("PEPE");

    let err = h
        .engine
        .buy(domain::admitted("alpha", "WIF", dec!(1), Utc::now()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CapacityUnavailable");
    assert!(!h.ledger.holds(&"alpha".into(), &domain::contract("WIF")));
}

#[tokio::test]
async fn insufficient_balance_is_not_evicted() {
    let h = Harness::new(LedgerLimits {
        initial_balance_usd: dec!(150),
        ..LedgerLimits::default()
    });
    let pepe = h.open("alpha", "PEPE", dec!(1)).await;

    let err = h
        .engine
        .buy(domain::admitted("alpha", "WIF", dec!(1), Utc::now()))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SignalRejection::CapacityExceeded {
            scope: CapacityScope::Balance
        }
    );
    assert_eq!(h.status(&pepe), PositionStatus::Open);
}

#[tokio::test]
async fn scheduled_eviction_fires_once_per_window() {
    let h = Harness::new(limits(2, 25));
    let pepe = h.open("alpha", "PEPE", dec!(1)).await;
    let wif = h.open("alpha", "WIF", dec!(1)).await;
    let later = Utc::now() + Duration::days(10);
    h.board.record(pepe.id(), dec!(0.7), later);
    h.board.record(wif.id(), dec!(1.3), later);

    let early = h.engine.run_scheduled_evictions(Utc::now() + Duration::days(13)).await;
    assert!(early.is_empty());

    let due = Utc::now() + Duration::days(15);
    let outcomes = h.engine.run_scheduled_evictions(due).await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(applied_kind(&outcomes[0]), Some(DecisionKind::ScheduledEviction));
    assert_eq!(h.status(&pepe), PositionStatus::Closed);
    assert_eq!(h.status(&wif), PositionStatus::Open);

    assert!(h.engine.run_scheduled_evictions(due).await.is_empty());
}

#[tokio::test]
async fn pruning_forgets_closed_decisions_and_stale_triggers() {
    let h = Harness::new(limits(2, 25));
    let pepe = h.open("alpha", "PEPE", dec!(1)).await;
    let wif = h.open("alpha", "WIF", dec!(1)).await;
    let later = Utc::now() + Duration::days(10);
    h.board.record(pepe.id(), dec!(0.7), later);
    h.board.record(wif.id(), dec!(1.3), later);
    let due = Utc::now() + Duration::days(15);
    h.engine.run_scheduled_evictions(due).await;
    assert_eq!(h.engine.bookkeeping_len(), (1, 1));

    h.engine.prune(due);
    // The trigger is still within reach, so it must stay to block a repeat.
    assert_eq!(h.engine.bookkeeping_len(), (0, 1));
    assert!(h.engine.run_scheduled_evictions(due).await.is_empty());

    h.engine.prune(due + Duration::days(15));
    assert_eq!(h.engine.bookkeeping_len(), (0, 0));
}

/// Two positions whose worst performer depends on the window: AAA is down
/// 12% over fourteen days but up 10% over the last seven, BBB is down 5%
/// over both. Returns the positions and the evaluation time.
async fn diverging_windows(h: &Harness) -> (Position, Position, DateTime<Utc>) {
    let aaa = h.open("alpha", "AAA", dec!(1)).await;
    let bbb = h.open("alpha", "BBB", dec!(1)).await;
    let t0 = Utc::now();
    h.board.record(aaa.id(), dec!(1), t0);
    h.board.record(bbb.id(), dec!(1), t0);
    h.board.record(aaa.id(), dec!(0.8), t0 + Duration::days(7));
    h.board.record(bbb.id(), dec!(1), t0 + Duration::days(7));
    h.board.record(aaa.id(), dec!(0.88), t0 + Duration::days(14));
    h.board.record(bbb.id(), dec!(0.95), t0 + Duration::days(14));
    (aaa, bbb, t0 + Duration::days(14) + Duration::hours(1))
}

#[tokio::test]
async fn overflow_ranks_by_the_seven_day_window() {
    let h = Harness::new(limits(2, 25));
    let (aaa, bbb, at) = diverging_windows(&h).await;

    h.engine
        .buy(domain::admitted("alpha", "CCC", dec!(1), at))
        .await
        .unwrap();

    assert_eq!(h.status(&bbb), PositionStatus::Closed);
    assert_eq!(h.status(&aaa), PositionStatus::Open);
}

#[tokio::test]
async fn scheduled_eviction_ranks_by_the_fourteen_day_window() {
    let h = Harness::new(limits(2, 25));
    let (aaa, bbb, at) = diverging_windows(&h).await;

    let outcomes = h.engine.run_scheduled_evictions(at).await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(h.status(&aaa), PositionStatus::Closed);
    assert_eq!(h.status(&bbb), PositionStatus::Open);
}

#[tokio::test]
async fn exits_sell_the_quantity_that_arrived() {
    let h = Harness::new(LedgerLimits::default());
    h.executor.set_transfer_fee("TAX", dec!(0.03));
    let position = h.open("alpha", "TAX", dec!(1)).await;
    assert_eq!(position.quantity(), dec!(97));

    let outcome = h.price(&position, dec!(0.4), Utc::now() + Duration::hours(1)).await;

    assert_eq!(applied_kind(&outcome), Some(DecisionKind::StopLoss));
    let sell = h.executor.intents().pop().unwrap();
    assert_eq!(sell.direction, TradeDirection::Sell);
    assert_eq!(sell.amount, dec!(97));
}

#[tokio::test]
async fn agent_below_cap_is_not_scheduled() {
    let h = Harness::new(limits(2, 25));
    h.open("alpha", "PEPE", dec!(1)).await;

    let outcomes = h
        .engine
        .run_scheduled_evictions(Utc::now() + Duration::days(30))
        .await;
    assert!(outcomes.is_empty());
}

#[tokio::test]
async fn refresh_completion_writes_pnl_snapshot() {
    let h = Harness::new(LedgerLimits::default());
    let position = h.open("alpha", "PEPE", dec!(1)).await;
    let at = Utc::now() + Duration::hours(1);
    h.board.record(position.id(), dec!(1.5), at);

    h.engine.on_refresh_completed(at).await;

    let snapshots = h.store.snapshots();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].rows.len(), 1);
    assert_eq!(snapshots[0].grand_total.invested_usd, dec!(100));
    assert_eq!(snapshots[0].grand_total.current_value_usd, dec!(150));
}
