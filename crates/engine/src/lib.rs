//! The trading engine: one task per configured symbol, fed by the shared
//! market data stream, all order decisions funneled through the
//! [`OrderCoordinator`].
//!
//! Shutdown is cooperative. Workers observe a watch flag but only between
//! klines, so an order lifecycle that has already started always runs to
//! completion, including its ledger write, before the task exits.

pub mod coordinator;
pub mod error;

pub use coordinator::{OrderCoordinator, OrderOutcome};
pub use error::EngineError;

use alerter::{DailySummary, Notifier};
use chrono::Utc;
use configuration::{Config, ProfileConfig};
use core_types::{Kline, SignalKind, TradeRecord};
use exchange::{BalanceCache, ExchangeClient, MarketStream};
use ledger::PositionLedger;
use risk::{DailyLossTracker, RiskGate};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use strategies::{build_strategy, Strategy};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

/// The central orchestrator for live and paper trading.
pub struct TradingEngine {
    config: Config,
    ledger: Arc<PositionLedger>,
    exchange: Arc<dyn ExchangeClient>,
    notifier: Arc<dyn Notifier>,
    coordinator: Arc<OrderCoordinator>,
}

impl TradingEngine {
    pub fn new(
        config: Config,
        ledger: Arc<PositionLedger>,
        exchange: Arc<dyn ExchangeClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let balance = Arc::new(BalanceCache::new(
            exchange.clone(),
            config.engine.quote_asset.clone(),
            Duration::from_secs(config.engine.balance_cache_ttl_secs),
        ));
        let coordinator = Arc::new(OrderCoordinator::new(
            ledger.clone(),
            exchange.clone(),
            notifier.clone(),
            balance,
            Arc::new(DailyLossTracker::new()),
        ));
        Self {
            config,
            ledger,
            exchange,
            notifier,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &Arc<OrderCoordinator> {
        &self.coordinator
    }

    /// Runs the engine until `shutdown` flips to `true`, then drains every
    /// in-flight order lifecycle before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), EngineError> {
        let profiles: Vec<ProfileConfig> =
            self.config.active_profiles().cloned().collect();
        if profiles.is_empty() {
            return Err(EngineError::Configuration(
                "no enabled trading profiles".to_string(),
            ));
        }

        let mode = if self.config.engine.paper_trading {
            "paper"
        } else {
            "live"
        };
        tracing::info!(%mode, profiles = profiles.len(), "starting trading engine");
        self.notifier.startup(mode).await;

        let mut workers = JoinSet::new();
        let mut routes: HashMap<String, mpsc::Sender<Kline>> = HashMap::new();

        for profile in profiles {
            let mut strategy = build_strategy(&profile)?;
            let gate = RiskGate::new(profile.risk.clone())?;
            self.warm_up(&profile.symbol, strategy.as_mut()).await?;

            let (tx, rx) = mpsc::channel(256);
            routes.insert(profile.symbol.to_uppercase(), tx);
            workers.spawn(run_symbol_worker(
                profile.symbol.clone(),
                strategy,
                gate,
                self.coordinator.clone(),
                rx,
                shutdown.clone(),
            ));
        }

        let stream = MarketStream::new(self.config.exchange.testnet)?;
        let symbols: Vec<String> = routes.keys().cloned().collect();
        let mut klines = stream.subscribe_klines(
            &symbols,
            &self.config.engine.interval,
            shutdown.clone(),
        )?;

        let summary_task = tokio::spawn(run_summary_loop(
            self.ledger.clone(),
            self.notifier.clone(),
            Duration::from_secs(self.config.engine.summary_interval_secs),
            shutdown.clone(),
        ));

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("shutdown requested");
                        break;
                    }
                }
                kline = klines.recv() => {
                    match kline {
                        Some((symbol, kline)) => {
                            if let Some(tx) = routes.get(&symbol.to_uppercase()) {
                                if tx.send(kline).await.is_err() {
                                    tracing::warn!(%symbol, "symbol worker is gone");
                                }
                            }
                        }
                        None => {
                            tracing::error!("market data stream ended");
                            break;
                        }
                    }
                }
            }
        }

        // Dropping the routes closes every worker inbox; workers finish the
        // kline they are on, which includes completing any order lifecycle.
        drop(routes);
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "symbol worker panicked");
            }
        }
        summary_task.abort();

        self.notifier.shutdown().await;
        tracing::info!("trading engine stopped");
        Ok(())
    }

    /// Replays recent history through the strategy so its indicators are
    /// warm before the first live kline.
    async fn warm_up(
        &self,
        symbol: &str,
        strategy: &mut dyn Strategy,
    ) -> Result<(), EngineError> {
        let needed = strategy.required_history();
        if needed == 0 {
            return Ok(());
        }
        let klines = self
            .exchange
            .klines(symbol, &self.config.engine.interval, needed as u32)
            .await?;
        tracing::info!(%symbol, requested = needed, received = klines.len(), "warming up strategy");
        for kline in &klines {
            strategy.observe(kline)?;
        }
        Ok(())
    }
}

async fn run_symbol_worker(
    symbol: String,
    mut strategy: Box<dyn Strategy>,
    gate: RiskGate,
    coordinator: Arc<OrderCoordinator>,
    mut klines: mpsc::Receiver<Kline>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(%symbol, strategy = strategy.name(), "symbol worker started");
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            kline = klines.recv() => {
                let Some(kline) = kline else { break };
                handle_kline(&symbol, strategy.as_mut(), &gate, &coordinator, &kline).await;
            }
        }
    }
    tracing::info!(%symbol, "symbol worker stopped");
}

async fn handle_kline(
    symbol: &str,
    strategy: &mut dyn Strategy,
    gate: &RiskGate,
    coordinator: &OrderCoordinator,
    kline: &Kline,
) {
    let signal = match strategy.analyze(kline) {
        Ok(signal) => signal,
        Err(e) => {
            tracing::error!(%symbol, error = %e, "strategy evaluation failed");
            return;
        }
    };

    // Exit triggers outrank the strategy: they are checked on every closed
    // kline, and an exit ends the cycle so a buy signal cannot re-enter on
    // the same bar.
    if let Some(outcome) = coordinator.check_exit_triggers(symbol, gate).await {
        tracing::info!(%symbol, ?outcome, "exit trigger handled");
        return;
    }

    match signal.signal {
        SignalKind::Buy => {
            let outcome = coordinator.execute_buy(symbol, gate, &signal.reason).await;
            tracing::info!(%symbol, ?outcome, "buy signal handled");
        }
        SignalKind::Sell => {
            let outcome = coordinator
                .execute_sell(symbol, gate, false, &signal.reason)
                .await;
            tracing::info!(%symbol, ?outcome, "sell signal handled");
        }
        SignalKind::Hold => {}
    }
}

async fn run_summary_loop(
    ledger: Arc<PositionLedger>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; skip it so the summary describes a
    // full period.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
            _ = ticker.tick() => {
                let today = Utc::now().date_naive();
                let since = match today.and_hms_opt(0, 0, 0) {
                    Some(start) => start.and_utc(),
                    None => continue,
                };
                match ledger.trades_since(since).await {
                    Ok(trades) => {
                        let summary = build_summary(today, &trades);
                        notifier.daily_summary(&summary).await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to load trades for the daily summary");
                    }
                }
            }
        }
    }
}

fn build_summary(date: chrono::NaiveDate, trades: &[TradeRecord]) -> DailySummary {
    let mut wins = 0;
    let mut losses = 0;
    let mut realized_pnl = Decimal::ZERO;
    for trade in trades {
        if let Some(profit) = trade.profit {
            realized_pnl += profit;
            if profit > Decimal::ZERO {
                wins += 1;
            } else if profit < Decimal::ZERO {
                losses += 1;
            }
        }
    }
    DailySummary {
        date,
        total_trades: trades.len(),
        wins,
        losses,
        realized_pnl,
    }
}
