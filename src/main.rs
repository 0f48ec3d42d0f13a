use alerter::{Notifier, NullNotifier, TelegramAlerter};
use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use configuration::Config;
use engine::{OrderOutcome, TradingEngine};
use exchange::{BinanceSpotClient, ExchangeClient, PaperExchange};
use ledger::{MemoryStore, PgStore, PositionLedger, PositionStore};
use risk::RiskGate;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// A rule-driven spot trading engine for crypto.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the trading engine and run until interrupted.
    Run,
    /// Show the account balance and open positions.
    Status,
    /// Show the most recent trades.
    History {
        /// How many trades to show.
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Force-close one position at market, bypassing the risk checks.
    Close {
        /// The symbol to close (e.g. "BTCUSDT").
        #[arg(long)]
        symbol: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from a .env file when present.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = configuration::load_config_from(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config))?;

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Status => status(config).await,
        Commands::History { limit } => history(config, limit).await,
        Commands::Close { symbol } => close(config, &symbol).await,
    }
}

/// Builds the exchange client; in paper mode the live client stays inside
/// as the price source while fills are simulated.
fn build_exchange(config: &Config) -> anyhow::Result<Arc<dyn ExchangeClient>> {
    let live = Arc::new(BinanceSpotClient::new(&config.exchange)?);
    if config.engine.paper_trading {
        Ok(Arc::new(PaperExchange::new(
            live,
            config.engine.quote_asset.clone(),
            config.engine.paper_balance,
        )))
    } else {
        Ok(live)
    }
}

/// Builds the position store. Paper trading runs on the in-memory store;
/// live trading requires PostgreSQL.
async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn PositionStore>> {
    if config.engine.paper_trading {
        return Ok(Arc::new(MemoryStore::new()));
    }

    let url = match &config.database.url {
        Some(url) => url.clone(),
        None => std::env::var("DATABASE_URL")
            .map_err(|_| anyhow!("live trading needs DATABASE_URL or [database].url"))?,
    };
    let pool = ledger::connect(&url).await?;
    ledger::run_migrations(&pool).await?;
    Ok(Arc::new(PgStore::new(pool)))
}

fn build_notifier(config: &Config) -> Arc<dyn Notifier> {
    match TelegramAlerter::new(&config.telegram) {
        Some(alerter) => Arc::new(alerter),
        None => Arc::new(NullNotifier),
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let exchange = build_exchange(&config)?;
    let store = build_store(&config).await?;
    let ledger = Arc::new(PositionLedger::new(store));
    let notifier = build_notifier(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        tracing::info!("interrupt received, shutting down");
        let _ = shutdown_tx.send(true);
    });

    let engine = TradingEngine::new(config, ledger, exchange, notifier);
    engine.run(shutdown_rx).await?;
    Ok(())
}

async fn status(config: Config) -> anyhow::Result<()> {
    let exchange = build_exchange(&config)?;
    let store = build_store(&config).await?;
    let ledger = PositionLedger::new(store);

    let balance = exchange.balance(&config.engine.quote_asset).await?;
    println!("Balance: {} {}", balance, config.engine.quote_asset);

    let positions = ledger.positions().await?;
    if positions.is_empty() {
        println!("No open positions.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Symbol",
        "Quantity",
        "Entry",
        "Current",
        "Unrealized P&L",
        "Opened",
    ]);
    for position in positions {
        let current = exchange.current_price(&position.symbol).await?;
        table.add_row(vec![
            position.symbol.clone(),
            position.quantity.to_string(),
            position.entry_price.to_string(),
            current.to_string(),
            position.unrealized_pnl(current).to_string(),
            position.opened_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn history(config: Config, limit: i64) -> anyhow::Result<()> {
    let store = build_store(&config).await?;
    let ledger = PositionLedger::new(store);

    let trades = ledger.recent_trades(limit).await?;
    if trades.is_empty() {
        println!("No trades recorded.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Executed",
        "Symbol",
        "Side",
        "Price",
        "Quantity",
        "Profit",
        "Order ID",
    ]);
    for trade in trades {
        table.add_row(vec![
            trade.executed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            trade.symbol.clone(),
            trade.side.as_wire().to_string(),
            trade.price.to_string(),
            trade.quantity.to_string(),
            trade
                .profit
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
            trade.order_id.clone(),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn close(config: Config, symbol: &str) -> anyhow::Result<()> {
    let profile = config
        .profiles
        .iter()
        .find(|p| p.symbol.eq_ignore_ascii_case(symbol))
        .ok_or_else(|| anyhow!("no profile configured for {symbol}"))?;
    let gate = RiskGate::new(profile.risk.clone())?;
    let symbol = profile.symbol.clone();

    let exchange = build_exchange(&config)?;
    let store = build_store(&config).await?;
    let ledger = Arc::new(PositionLedger::new(store));
    let notifier = build_notifier(&config);

    let engine = TradingEngine::new(config, ledger, exchange, notifier);
    let outcome = engine
        .coordinator()
        .execute_sell(&symbol, &gate, true, "manual close")
        .await;

    println!("{outcome:?}");
    match outcome {
        OrderOutcome::Executed { .. } => Ok(()),
        OrderOutcome::Rejected { reason } | OrderOutcome::Failed { reason } => Err(anyhow!(reason)),
    }
}
