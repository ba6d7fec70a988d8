//! Composition root: builds adapters from configuration and wires the
//! ledger, monitor, engine and signal pipeline together.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::adapter::outbound::dexscreener::{self, DexScreener};
use crate::adapter::outbound::evm::EvmRouter;
use crate::adapter::outbound::llm::{anthropic, openai};
use crate::adapter::outbound::memory::MemoryStore;
use crate::adapter::outbound::oracle::LlmOracle;
use crate::adapter::outbound::sqlite::{self, SqliteStore};
use crate::application::execution::{ExecutionRouter, Route};
use crate::application::gate::ConfidenceGate;
use crate::application::intake::SignalValidator;
use crate::application::ledger::PositionLedger;
use crate::application::monitor::{PriceBoard, PriceMonitor};
use crate::application::pipeline::SignalPipeline;
use crate::application::rebalance::{EngineInput, RebalanceConfig, RebalancingEngine};
use crate::domain::{Network, SignalEvent};
use crate::error::{ConfigError, Error, Result};
use crate::infrastructure::config::llm::LlmProvider;
use crate::infrastructure::config::Config;
use crate::port::{
    DexRouter, Llm, LogNotifier, MarketData, Notifier, NotifierRegistry, PerformanceSource,
    ScoringOracle, TradeStore,
};

/// Engine input buffer. Monitor batches and buys share it.
const ENGINE_CHANNEL_CAPACITY: usize = 1024;

/// External collaborators the core depends on.
#[derive(Clone)]
pub struct Ports {
    pub market: Arc<dyn MarketData>,
    pub oracle: Arc<dyn ScoringOracle>,
    pub dex: Arc<dyn DexRouter>,
    pub store: Arc<dyn TradeStore>,
    pub performance: Arc<dyn PerformanceSource>,
    pub notifier: Arc<dyn Notifier>,
}

impl Ports {
    /// Build production adapters from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a required secret is missing, the database cannot
    /// be opened, or an endpoint is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        let market: Arc<dyn MarketData> = Arc::new(DexScreener::new(
            dexscreener::DEFAULT_BASE_URL,
            Duration::from_secs(config.intake.market_timeout_secs),
        )?);
        let oracle: Arc<dyn ScoringOracle> = Arc::new(LlmOracle::new(build_llm_client(config)?));
        let dex = build_dex(config)?;
        let (store, performance) = build_store(config)?;

        Ok(Self {
            market,
            oracle,
            dex,
            store,
            performance,
            notifier: Arc::new(build_notifier_registry()),
        })
    }
}

/// Build the notifier registry.
pub(crate) fn build_notifier_registry() -> NotifierRegistry {
    let mut registry = NotifierRegistry::new();
    registry.register(Box::new(LogNotifier));
    registry
}

/// Build the LLM client for the configured provider.
pub(crate) fn build_llm_client(config: &Config) -> Result<Arc<dyn Llm>> {
    let settings = config.llm.model_settings();
    let base_url = config.llm.active().base_url.clone();

    let client: Arc<dyn Llm> = match config.llm.provider {
        LlmProvider::Anthropic => {
            let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
                ConfigError::MissingField {
                    field: "ANTHROPIC_API_KEY",
                }
            })?;
            let base = base_url.as_deref().unwrap_or(anthropic::DEFAULT_BASE_URL);
            Arc::new(anthropic::Anthropic::new(api_key, base, settings)?)
        }
        LlmProvider::OpenAi => {
            let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| ConfigError::MissingField {
                field: "OPENAI_API_KEY",
            })?;
            let base = base_url.as_deref().unwrap_or(openai::DEFAULT_BASE_URL);
            Arc::new(openai::OpenAi::new(api_key, base, settings)?)
        }
    };

    info!(provider = client.name(), model = %config.llm.active().model, "LLM client initialized");
    Ok(client)
}

/// Connect the chain router. Dry runs fall back to a read-only wallet.
pub(crate) fn build_dex(config: &Config) -> Result<Arc<dyn DexRouter>> {
    let execution = &config.execution;
    let router = match config.private_key.as_deref() {
        Some(key) => EvmRouter::connect(&execution.rpc_url, key, execution.chain_id)?,
        None if config.dry_run => {
            warn!("WALLET_PRIVATE_KEY not set, using a read-only wallet for dry run");
            EvmRouter::read_only(&execution.rpc_url, execution.chain_id)?
        }
        None => {
            return Err(ConfigError::MissingField {
                field: "WALLET_PRIVATE_KEY",
            }
            .into())
        }
    };
    info!(wallet = %router.wallet(), chain_id = router.chain_id(), "Chain router connected");
    Ok(Arc::new(router))
}

/// Open the trade store. An empty database path keeps records in memory.
pub(crate) fn build_store(
    config: &Config,
) -> Result<(Arc<dyn TradeStore>, Arc<dyn PerformanceSource>)> {
    if config.database.trim().is_empty() {
        warn!("No database configured, trade records are kept in memory only");
        let store = Arc::new(MemoryStore::new());
        return Ok((store.clone(), store));
    }
    let store = Arc::new(SqliteStore::new(sqlite::open(&config.database)?));
    info!(path = %config.database, "Trade store opened");
    Ok((store.clone(), store))
}

/// How long price history is kept: the longest eviction window plus a day,
/// so the base observation for every window survives.
#[must_use]
pub fn board_retention(rebalance: &RebalanceConfig) -> chrono::Duration {
    rebalance.scheduled_window.max(rebalance.overflow_window) + chrono::Duration::days(1)
}

/// Build the execution router for the configured network.
///
/// # Errors
///
/// Returns an error if an address or the builder code is malformed.
pub fn build_execution_router(config: &Config, dex: Arc<dyn DexRouter>) -> Result<ExecutionRouter> {
    let execution = &config.execution;
    let route = Route {
        dex,
        router: execution.router()?,
        quote_token: execution.quote()?,
        fee_on_transfer: execution.fee_on_transfer()?.into_iter().collect(),
    };
    Ok(
        ExecutionRouter::new(execution.execution_config(config.dry_run)?)
            .with_route(Network::new(&execution.network), route),
    )
}

/// Fully wired application, ready to run.
pub struct Runtime {
    pub ledger: Arc<PositionLedger>,
    pub board: Arc<PriceBoard>,
    pub engine: Arc<RebalancingEngine>,
    monitor: PriceMonitor,
    pipeline: SignalPipeline,
    inputs: mpsc::Sender<EngineInput>,
    receiver: mpsc::Receiver<EngineInput>,
}

impl Runtime {
    /// Wire the core around `ports`.
    ///
    /// # Errors
    ///
    /// Returns an error if the execution route cannot be built.
    pub fn assemble(config: &Config, ports: Ports) -> Result<Self> {
        let executor = Arc::new(build_execution_router(config, Arc::clone(&ports.dex))?);

        let rebalance = config
            .rebalance
            .rebalance_config(config.portfolio.position_size_usd);
        let ledger = Arc::new(PositionLedger::new(config.portfolio.ledger_limits()));
        let board = Arc::new(PriceBoard::with_retention(board_retention(&rebalance)));
        let (inputs, receiver) = mpsc::channel(ENGINE_CHANNEL_CAPACITY);

        let engine = Arc::new(RebalancingEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&board),
            Arc::clone(&ports.market),
            executor,
            Arc::clone(&ports.store),
            Arc::clone(&ports.notifier),
            rebalance,
        ));

        let monitor = PriceMonitor::new(
            Arc::clone(&ledger),
            Arc::clone(&board),
            Arc::clone(&ports.market),
            config.monitor.monitor_config(),
        );

        let validator = SignalValidator::new(
            Arc::clone(&ledger),
            Arc::clone(&ports.market),
            config.intake.criteria(),
        );
        let gate = ConfidenceGate::new(
            ports.oracle,
            ports.performance,
            ports.store,
            config.gate.gate_config(),
        );
        let pipeline = SignalPipeline::new(validator, gate, inputs.clone(), ports.notifier);

        Ok(Self {
            ledger,
            board,
            engine,
            monitor,
            pipeline,
            inputs,
            receiver,
        })
    }

    /// Run until `shutdown` resolves or the ledger halts.
    ///
    /// On shutdown the monitor and pipeline stop first; the engine then
    /// drains inputs already queued before returning.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::LedgerError::Halted`] if the ledger halted,
    /// or an error if a task panicked.
    pub async fn run_until<F>(self, signals: mpsc::Receiver<SignalEvent>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            engine,
            monitor,
            pipeline,
            inputs,
            receiver,
            ..
        } = self;

        let mut engine_task = tokio::spawn(async move { engine.run(receiver).await });
        let monitor = monitor.start(inputs.clone());
        let pipeline_task = tokio::spawn(async move { pipeline.run(signals).await });
        drop(inputs);

        info!("signalbook running");

        let halted = tokio::select! {
            result = &mut engine_task => Some(result),
            () = shutdown => None,
        };

        monitor.shutdown().await;
        pipeline_task.abort();
        let _ = pipeline_task.await;

        let result = match halted {
            Some(result) => result,
            None => engine_task.await,
        };
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(Error::Task(e.to_string())),
        }
    }
}
