// src/trading_bot.rs
use crate::analysis::indicators::{format_price, format_quantity, profit_loss_percent};
use crate::config::Config;
use crate::domain::errors::{AppError, AppResult, MarketDataError, TradingError};
use crate::domain::models::{Order, OrderStatus, Position};
use crate::exchange::client::{BarSource, VenueClient};
use crate::market_data::feed::MarketFeed;
use crate::trading::execution::{ExecutionEngine, RiskGatedExecutor};
use crate::trading::positions::PositionBook;
use crate::trading::risk::{RiskGate, RiskLimits};
use crate::trading::signals::SignalProcessor;
use crate::trading::strategies::strategy_from_config;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Owns every pipeline component and their startup and shutdown order
pub struct TradingBot {
    config: Config,
    venue: Arc<dyn VenueClient>,
    book: PositionBook,
    risk: Arc<RiskGate>,
    feed: Arc<MarketFeed>,
    signals: Arc<SignalProcessor>,
    execution: Arc<ExecutionEngine>,
    mirrors: HashMap<String, Arc<ExecutionEngine>>,
    started: AtomicBool,
    active_symbols: Mutex<Vec<String>>,
    heartbeat: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl TradingBot {
    /// Wire the pipeline. `network_venues` must hold a venue for every
    /// network an enabled pair is routed to.
    pub fn new(
        config: Config,
        venue: Arc<dyn VenueClient>,
        bars: Arc<dyn BarSource>,
        network_venues: HashMap<String, Arc<dyn VenueClient>>,
    ) -> AppResult<Self> {
        config.validate()?;

        let book = PositionBook::new();
        let risk = Arc::new(RiskGate::new(RiskLimits::from(&config.risk), book.clone()));
        let strategy = strategy_from_config(&config.strategy)?;

        let execution = Arc::new(ExecutionEngine::new(
            venue.clone(),
            book.clone(),
            risk.clone(),
            config.request_timeout(),
            config.reconcile_interval(),
        ));

        let mut mirrors = HashMap::new();
        for pair in config.trading.pairs.iter().filter(|p| p.enabled) {
            let Some(network) = &pair.network else { continue };
            if mirrors.contains_key(network) {
                continue;
            }
            let network_venue = network_venues.get(network).ok_or_else(|| {
                AppError::Config(format!("no venue for network {} (pair {})", network, pair.symbol))
            })?;
            let engine = ExecutionEngine::new(
                network_venue.clone(),
                book.clone(),
                risk.clone(),
                config.request_timeout(),
                config.reconcile_interval(),
            )
            .with_network(network);
            mirrors.insert(network.clone(), Arc::new(engine));
        }

        let feed = Arc::new(MarketFeed::new(bars, config.feed_interval(), config.request_timeout()));

        Ok(Self {
            config,
            venue,
            book,
            risk,
            feed,
            signals: Arc::new(SignalProcessor::new(strategy)),
            execution,
            mirrors,
            started: AtomicBool::new(false),
            active_symbols: Mutex::new(Vec::new()),
            heartbeat: Mutex::new(None),
        })
    }

    /// Start execution first so fills can settle, warm up the strategy,
    /// wire the handlers, then open the feed.
    pub async fn start(&self) -> AppResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(TradingError::Lifecycle("trading bot already started".to_string()).into());
        }

        self.execution.start()?;
        for engine in self.mirrors.values() {
            engine.start()?;
        }

        let symbols = self.config.enabled_symbols();
        let ready = self
            .signals
            .initialize(
                self.venue.as_ref(),
                &symbols,
                &self.config.trading.interval,
                self.config.request_timeout(),
            )
            .await;
        if ready.is_empty() {
            return Err(MarketDataError::NoData(symbols.join(", ")).into());
        }

        let mut executor = RiskGatedExecutor::new(self.risk.clone(), self.execution.clone());
        for (network, engine) in &self.mirrors {
            let routed: Vec<String> = self
                .config
                .trading
                .pairs
                .iter()
                .filter(|p| p.enabled && p.network.as_deref() == Some(network.as_str()))
                .map(|p| p.symbol.clone())
                .collect();
            executor = executor.with_mirror(engine.clone(), &routed);
        }
        self.signals.register_signal_handler(Arc::new(executor)).await;

        self.feed.register_handler(self.signals.clone()).await;
        self.feed.register_handler(self.execution.clone()).await;
        for engine in self.mirrors.values() {
            self.feed.register_handler(engine.clone()).await;
        }

        self.feed.start(ready.clone())?;
        log::info!(
            "Trading {} with {} ({})",
            ready.join(", "),
            self.signals.strategy_name(),
            self.venue.name()
        );
        *self.active_symbols.lock() = ready;

        self.start_heartbeat();
        Ok(())
    }

    fn start_heartbeat(&self) {
        let (tx, mut rx) = watch::channel(false);
        let period = self.config.heartbeat_interval();
        let book = self.book.clone();
        let mut engines = vec![self.execution.clone()];
        engines.extend(self.mirrors.values().cloned());

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => log_summary(&book.snapshot().into_values().collect::<Vec<_>>(), &engines),
                }
            }
        });
        *self.heartbeat.lock() = Some((tx, handle));
    }

    /// Stop producers before consumers: feed, heartbeat, then execution.
    /// Safe to call more than once.
    pub async fn stop(&self) {
        log::info!("Shutting down...");
        self.feed.stop().await;

        let heartbeat = self.heartbeat.lock().take();
        if let Some((tx, handle)) = heartbeat {
            let _ = tx.send(true);
            if let Err(e) = handle.await {
                log::error!("Heartbeat task ended abnormally: {}", e);
            }
        }

        self.execution.stop().await;
        for engine in self.mirrors.values() {
            engine.stop().await;
        }
        log::info!("Shutdown complete");
    }

    /// Symbols that passed warm-up and are being traded
    pub fn active_symbols(&self) -> Vec<String> {
        self.active_symbols.lock().clone()
    }

    pub fn feed(&self) -> &Arc<MarketFeed> {
        &self.feed
    }

    pub fn signals(&self) -> &Arc<SignalProcessor> {
        &self.signals
    }

    pub fn execution(&self) -> &Arc<ExecutionEngine> {
        &self.execution
    }

    pub fn mirror(&self, network: &str) -> Option<&Arc<ExecutionEngine>> {
        self.mirrors.get(network)
    }

    pub fn positions(&self) -> Vec<Position> {
        self.book.snapshot().into_values().collect()
    }
}

fn log_summary(positions: &[Position], engines: &[Arc<ExecutionEngine>]) {
    if !positions.is_empty() {
        log::info!("=== Current Positions ===");
        for position in positions {
            log::info!(
                "{}: {} @ {} (now {}), PnL: {}%",
                position.key(),
                format_quantity(position.quantity),
                format_price(position.entry_price),
                format_price(position.current_price),
                profit_loss_percent(position.entry_price, position.current_price).round_dp(2)
            );
        }
    }

    let orders: Vec<Order> = engines.iter().flat_map(|e| e.get_orders().into_values()).collect();
    let count = |status: OrderStatus| orders.iter().filter(|o| o.status == status).count();
    log::info!(
        "Orders: {} total, {} pending, {} filled, {} confirmed, {} failed, {} cancelled",
        orders.len(),
        count(OrderStatus::Pending),
        count(OrderStatus::Filled),
        count(OrderStatus::Confirmed),
        count(OrderStatus::Failed),
        count(OrderStatus::Cancelled)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NetworkConfig, PairConfig};
    use crate::exchange::simulated::SimulatedVenue;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn config(symbols: &[&str]) -> Config {
        let mut config = Config::default();
        config.trading.pairs = symbols
            .iter()
            .map(|s| PairConfig { symbol: s.to_string(), enabled: true, network: None })
            .collect();
        config.trading.feed_interval_ms = 100;
        config.strategy.short_period = 3;
        config.strategy.long_period = 5;
        config
    }

    #[test]
    fn missing_network_venue_is_a_config_error() {
        let mut config = config(&["UNI"]);
        config.trading.pairs[0].network = Some("ethereum".into());
        config.networks.push(NetworkConfig { name: "ethereum".into(), enabled: true, confirmation_polls: 1 });

        let venue = Arc::new(SimulatedVenue::new("sim", dec!(10)));
        let result = TradingBot::new(config, venue.clone(), venue, HashMap::new());
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn start_skips_broken_symbols_and_stops_cleanly() {
        tokio::time::pause();
        let venue = Arc::new(SimulatedVenue::new("sim", dec!(100)).with_failing_history("BAD"));
        let bot = TradingBot::new(config(&["BTC", "BAD"]), venue.clone(), venue, HashMap::new()).unwrap();

        bot.start().await.unwrap();
        assert_eq!(bot.active_symbols(), vec!["BTC".to_string()]);
        assert!(bot.start().await.is_err());
        assert_eq!(bot.feed().handler_count().await, 2);

        tokio::time::sleep(Duration::from_millis(350)).await;
        bot.stop().await;
        bot.stop().await;
        assert!(!bot.feed().is_running());
    }

    #[tokio::test]
    async fn start_fails_when_no_symbol_has_history() {
        let venue = Arc::new(SimulatedVenue::new("sim", dec!(100)).with_failing_history("BAD"));
        let bot = TradingBot::new(config(&["BAD"]), venue.clone(), venue, HashMap::new()).unwrap();

        assert!(matches!(bot.start().await, Err(AppError::MarketData(_))));
        bot.stop().await;
    }
}
