use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use signalbook::adapter::inbound::ndjson;
use signalbook::infrastructure::bootstrap::{Ports, Runtime};
use signalbook::infrastructure::config::Config;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Signalbook - social-signal position ledger and rebalancing engine.
#[derive(Parser, Debug)]
#[command(name = "signalbook")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read NDJSON signal events from stdin and trade on them
    Run {
        /// Quote and simulate swaps without broadcasting
        #[arg(long)]
        dry_run: bool,

        /// Emit JSON logs regardless of config
        #[arg(long)]
        json_logs: bool,
    },

    /// Validate the configuration file and exit
    Check,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { dry_run, json_logs } => run(&cli.config, dry_run, json_logs).await,
        Commands::Check => check(&cli.config),
    };

    if let Err(e) = result {
        error!(error = %e, "Fatal error");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(path: &Path, dry_run: bool, json_logs: bool) -> anyhow::Result<()> {
    let mut config = load(path)?;
    if dry_run {
        config.dry_run = true;
    }
    if json_logs {
        config.logging.format = "json".to_string();
    }
    config.init_logging();

    info!(
        dry_run = config.dry_run,
        network = %config.execution.network,
        global_cap = config.portfolio.global_cap,
        "signalbook starting"
    );
    if config.dry_run {
        warn!("Dry-run mode: swaps are quoted but never broadcast");
    }

    let ports = Ports::from_config(&config).context("failed to build adapters")?;
    let runtime = Runtime::assemble(&config, ports).context("failed to assemble runtime")?;

    let (signals_tx, signals) = mpsc::channel(256);
    let reader = tokio::spawn(async move {
        match ndjson::forward_signals(BufReader::new(tokio::io::stdin()), signals_tx).await {
            Ok(summary) => info!(
                accepted = summary.accepted,
                malformed = summary.malformed,
                "Signal input closed"
            ),
            Err(e) => error!(error = %e, "Signal input failed"),
        }
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
    };

    let outcome = runtime.run_until(signals, shutdown).await;
    reader.abort();
    outcome?;

    info!("signalbook stopped");
    Ok(())
}

fn check(path: &Path) -> anyhow::Result<()> {
    let config = load(path)?;
    println!("Configuration OK: {}", path.display());
    println!("  network:        {}", config.execution.network);
    println!("  global cap:     {}", config.portfolio.global_cap);
    println!("  agent cap:      {}", config.portfolio.default_agent_cap);
    println!("  position size:  ${}", config.portfolio.position_size_usd);
    println!("  gate threshold: {}", config.gate.threshold);
    println!("  llm provider:   {:?}", config.llm.provider);
    println!(
        "  database:       {}",
        if config.database.is_empty() {
            "in-memory"
        } else {
            config.database.as_str()
        }
    );
    println!("  dry run:        {}", config.dry_run);
    Ok(())
}

fn load(path: &Path) -> anyhow::Result<Config> {
    Config::load(path).with_context(|| format!("failed to load config from {}", path.display()))
}
