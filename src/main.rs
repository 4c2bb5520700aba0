use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use warthog::api::{Broker, LiteFinanceClient, PaperBroker};
use warthog::reporting::TracingSink;
use warthog::{Orchestrator, TradingConfig};

#[derive(Parser)]
#[command(name = "warthog")]
#[command(about = "Indicator-driven trading engine", long_about = None)]
struct Cli {
    /// Configuration file (defaults to config/default.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Trade through the LiteFinance API instead of the paper broker
    #[arg(long)]
    live: bool,

    /// Stop after this many cycles
    #[arg(long)]
    cycles: Option<u64>,

    /// Seed for the paper broker's price walk
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Starting balance for the paper broker
    #[arg(long, default_value = "10000.0")]
    balance: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = TradingConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    tracing::info!(
        symbols = ?config.trading_pairs,
        interval_ms = config.cycle_interval_ms,
        live = cli.live,
        "Warthog starting"
    );

    let broker = create_broker(&cli, &config)?;
    let mut engine = Orchestrator::new(config, broker)?;

    let stop = engine.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, finishing current cycle...");
            stop.stop();
        }
    });

    let cycles = engine.run(&TracingSink, cli.cycles).await;

    let stats = engine.positions().stats(chrono::Utc::now().date_naive());
    tracing::info!(
        cycles,
        total_trades = stats.total_trades,
        win_rate = stats.win_rate,
        best_trade = stats.best_trade,
        open_positions = engine.positions().open_positions().len(),
        "Shutdown complete"
    );

    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warthog=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn create_broker(cli: &Cli, config: &TradingConfig) -> Result<Arc<dyn Broker>> {
    if !cli.live {
        tracing::info!(seed = cli.seed, balance = cli.balance, "Using paper broker");
        return Ok(Arc::new(PaperBroker::new(cli.seed, cli.balance)));
    }

    let api_key = std::env::var("LITEFINANCE_API_KEY")
        .context("LITEFINANCE_API_KEY not found in environment")?;

    let client = match std::env::var("LITEFINANCE_BASE_URL") {
        Ok(base_url) => LiteFinanceClient::with_base_url(&base_url, api_key)?,
        Err(_) => LiteFinanceClient::new(api_key)?,
    };
    // Retries must finish before the engine's own call timeout fires
    let client = client.fit_to_budget(config.call_timeout());

    tracing::info!(
        worst_case_ms = client.worst_case_price_latency().as_millis() as u64,
        "Using LiteFinance broker"
    );
    Ok(Arc::new(client))
}
