//! Price monitor.
//!
//! On a fixed interval (hourly by default) the monitor refreshes prices for
//! every open, partially taken and graduated position, batched per network
//! to respect provider limits, and emits one [`PriceChangeEvent`] per priced
//! position followed by a refresh-completed marker. A failed batch or a
//! missing price never blocks the others; the position is retried on the
//! next tick.

mod board;

pub use board::{PriceBoard, PriceObservation};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::ledger::PositionLedger;
use crate::application::rebalance::EngineInput;
use crate::domain::{ContractAddress, Network, Position, PriceChangeEvent};
use crate::port::MarketData;

/// Monitor scheduling.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    /// Contracts per batched price request.
    pub batch_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            batch_size: 30,
        }
    }
}

/// Counts from one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub tracked: usize,
    pub priced: usize,
    pub failed: usize,
}

/// The engine input channel closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineClosed;

/// Periodic price refresher.
pub struct PriceMonitor {
    ledger: Arc<PositionLedger>,
    board: Arc<PriceBoard>,
    market: Arc<dyn MarketData>,
    config: MonitorConfig,
}

impl PriceMonitor {
    #[must_use]
    pub fn new(
        ledger: Arc<PositionLedger>,
        board: Arc<PriceBoard>,
        market: Arc<dyn MarketData>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            ledger,
            board,
            market,
            config,
        }
    }

    /// Run one refresh pass, sending events to the engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineClosed`] if the engine stopped accepting input.
    pub async fn refresh(&self, events: &mpsc::Sender<EngineInput>) -> Result<RefreshSummary, EngineClosed> {
        let snapshot = self.ledger.snapshot();
        let observed_at = Utc::now();

        let mut by_network: BTreeMap<Network, Vec<&Position>> = BTreeMap::new();
        for position in snapshot.active_positions() {
            by_network
                .entry(position.network().clone())
                .or_default()
                .push(position);
        }

        let batch_size = self
            .config
            .batch_size
            .min(self.market.batch_limit())
            .max(1);
        let mut batches: Vec<(Network, Vec<ContractAddress>)> = Vec::new();
        for (network, positions) in &by_network {
            let mut contracts: Vec<ContractAddress> =
                positions.iter().map(|p| p.contract().clone()).collect();
            contracts.sort();
            contracts.dedup();
            for chunk in contracts.chunks(batch_size) {
                batches.push((network.clone(), chunk.to_vec()));
            }
        }

        let market = &self.market;
        let futures: Vec<_> = batches
            .iter()
            .map(|(network, contracts)| async move { market.prices(network, contracts).await })
            .collect();
        let results = futures_util::future::join_all(futures).await;

        let mut prices = BTreeMap::new();
        for ((network, contracts), result) in batches.iter().zip(results) {
            match result {
                Ok(batch) => {
                    for (contract, price) in batch {
                        prices.insert((network.clone(), contract), price);
                    }
                }
                Err(e) => warn!(
                    network = %network,
                    contracts = contracts.len(),
                    error = %e,
                    "Price batch failed, retrying next tick"
                ),
            }
        }

        let mut summary = RefreshSummary {
            tracked: snapshot.active_positions().count(),
            ..RefreshSummary::default()
        };
        for (network, positions) in by_network {
            for position in positions {
                let key = (network.clone(), position.contract().clone());
                let Some(&price) = prices.get(&key) else {
                    debug!(position = %position.id(), ticker = %position.ticker(), "No price this tick");
                    summary.failed += 1;
                    continue;
                };
                self.board.record(position.id(), price, observed_at);
                let event = PriceChangeEvent {
                    position_id: position.id(),
                    price_change_pct: position.price_change_pct(price),
                    current_price: price,
                    observed_at,
                };
                events
                    .send(EngineInput::PriceChange(event))
                    .await
                    .map_err(|_| EngineClosed)?;
                summary.priced += 1;
            }
        }

        events
            .send(EngineInput::RefreshCompleted { observed_at })
            .await
            .map_err(|_| EngineClosed)?;

        info!(
            tracked = summary.tracked,
            priced = summary.priced,
            failed = summary.failed,
            "Price refresh complete"
        );
        Ok(summary)
    }

    /// Spawn the recurring refresh loop.
    pub fn start(self, events: mpsc::Sender<EngineInput>) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let interval = self.config.interval;

        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Price monitor shutting down");
                        break;
                    }
                    _ = timer.tick() => {
                        if self.refresh(&events).await.is_err() {
                            debug!("Engine input closed, price monitor stopping");
                            break;
                        }
                    }
                }
            }
        });

        MonitorHandle { shutdown_tx, task }
    }
}

/// Handle to a running price monitor.
pub struct MonitorHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ledger::LedgerLimits;
    use crate::testkit::domain;
    use crate::testkit::market::MockMarket;
    use rust_decimal_macros::dec;

    fn drain(rx: &mut mpsc::Receiver<EngineInput>) -> (Vec<PriceChangeEvent>, usize) {
        let mut changes = Vec::new();
        let mut completed = 0;
        while let Ok(input) = rx.try_recv() {
            match input {
                EngineInput::PriceChange(event) => changes.push(event),
                EngineInput::RefreshCompleted { .. } => completed += 1,
                EngineInput::Buy { .. } => panic!("monitor never buys"),
            }
        }
        (changes, completed)
    }

    #[tokio::test]
    async fn refresh_emits_change_per_position_then_marker() {
        let ledger = Arc::new(PositionLedger::new(LedgerLimits::default()));
        let pepe = ledger
            .open_position(&domain::signal("alpha", "PEPE"), dec!(100), dec!(1), Utc::now())
            .unwrap();
        ledger
            .open_position(&domain::signal("beta", "WIF"), dec!(100), dec!(2), Utc::now())
            .unwrap();
        let market = Arc::new(
            MockMarket::new()
                .with_token("PEPE", dec!(1.5))
                .with_token("WIF", dec!(1)),
        );
        let board = Arc::new(PriceBoard::new());
        let monitor = PriceMonitor::new(Arc::clone(&ledger), Arc::clone(&board), market, MonitorConfig::default());
        let (tx, mut rx) = mpsc::channel(16);

        let summary = monitor.refresh(&tx).await.unwrap();
        assert_eq!(
            summary,
            RefreshSummary {
                tracked: 2,
                priced: 2,
                failed: 0
            }
        );

        let (changes, completed) = drain(&mut rx);
        assert_eq!(completed, 1);
        let pepe_change = changes.iter().find(|c| c.position_id == pepe.id()).unwrap();
        assert_eq!(pepe_change.price_change_pct, dec!(0.5));
        assert_eq!(board.latest(pepe.id()).unwrap().price, dec!(1.5));
    }

    #[tokio::test]
    async fn missing_price_does_not_block_others() {
        let ledger = Arc::new(PositionLedger::new(LedgerLimits::default()));
        ledger
            .open_position(&domain::signal("alpha", "PEPE"), dec!(100), dec!(1), Utc::now())
            .unwrap();
        ledger
            .open_position(&domain::signal("alpha", "WIF"), dec!(100), dec!(1), Utc::now())
            .unwrap();
        let market = MockMarket::new()
            .with_token("PEPE", dec!(1))
            .with_token("WIF", dec!(1));
        market.fail("WIF");
        let monitor = PriceMonitor::new(
            ledger,
            Arc::new(PriceBoard::new()),
            Arc::new(market),
            MonitorConfig::default(),
        );
        let (tx, mut rx) = mpsc::channel(16);

        let summary = monitor.refresh(&tx).await.unwrap();
        assert_eq!(summary.priced, 1);
        assert_eq!(summary.failed, 1);
        let (changes, completed) = drain(&mut rx);
        assert_eq!(changes.len(), 1);
        assert_eq!(completed, 1);
    }

    #[tokio::test]
    async fn batches_respect_configured_size() {
        let ledger = Arc::new(PositionLedger::new(LedgerLimits::default()));
        let mut market = MockMarket::new();
        for ticker in ["A", "B", "C", "D", "E"] {
            market = market.with_token(ticker, dec!(1));
            ledger
                .open_position(&domain::signal("alpha", ticker), dec!(100), dec!(1), Utc::now())
                .unwrap();
        }
        let market = Arc::new(market);
        let monitor = PriceMonitor::new(
            ledger,
            Arc::new(PriceBoard::new()),
            market.clone(),
            MonitorConfig {
                interval: Duration::from_secs(3600),
                batch_size: 2,
            },
        );
        let (tx, _rx) = mpsc::channel(16);

        monitor.refresh(&tx).await.unwrap();
        assert_eq!(market.price_batches(), 3);
    }

    #[tokio::test]
    async fn closed_engine_stops_refresh() {
        let ledger = Arc::new(PositionLedger::new(LedgerLimits::default()));
        let monitor = PriceMonitor::new(
            ledger,
            Arc::new(PriceBoard::new()),
            Arc::new(MockMarket::new()),
            MonitorConfig::default(),
        );
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        assert_eq!(monitor.refresh(&tx).await.unwrap_err(), EngineClosed);
    }
}
