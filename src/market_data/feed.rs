// src/market_data/feed.rs
use crate::domain::errors::{MarketDataError, MarketDataResult};
use crate::domain::models::PriceBar;
use crate::exchange::client::{with_timeout, BarSource};
use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Consumer of price bars
#[async_trait]
pub trait MarketDataHandler: Send + Sync {
    async fn on_bar(&self, bar: &PriceBar);
}

type HandlerList = Arc<RwLock<Vec<Arc<dyn MarketDataHandler>>>>;

/// Polls a bar source once per tick for every symbol and fans each bar out
/// to the registered handlers. Every symbol runs on its own task.
pub struct MarketFeed {
    source: Arc<dyn BarSource>,
    tick: Duration,
    request_timeout: Duration,
    handlers: HandlerList,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MarketFeed {
    pub fn new(source: Arc<dyn BarSource>, tick: Duration, request_timeout: Duration) -> Self {
        Self {
            source,
            tick,
            request_timeout,
            handlers: Arc::new(RwLock::new(Vec::new())),
            shutdown: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Add a consumer. Bars already being delivered may not reach it.
    pub async fn register_handler(&self, handler: Arc<dyn MarketDataHandler>) {
        self.handlers.write().await.push(handler);
    }

    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.lock().is_some()
    }

    /// Spawn one delivery loop per symbol
    pub fn start(&self, symbols: Vec<String>) -> MarketDataResult<()> {
        let mut shutdown = self.shutdown.lock();
        if shutdown.is_some() {
            return Err(MarketDataError::Feed("market feed already running".to_string()));
        }

        let (tx, rx) = watch::channel(false);
        let mut tasks = self.tasks.lock();
        for symbol in symbols {
            log::info!("Starting market feed for {}", symbol);
            tasks.push(tokio::spawn(run_symbol(
                symbol,
                self.source.clone(),
                self.handlers.clone(),
                self.tick,
                self.request_timeout,
                rx.clone(),
            )));
        }
        *shutdown = Some(tx);
        Ok(())
    }

    /// Deliver an externally received bar to every handler
    pub async fn dispatch(&self, bar: &PriceBar) {
        deliver(&self.handlers, bar).await;
    }

    /// Signal every loop to exit and wait until they have. Safe to call twice.
    pub async fn stop(&self) {
        let Some(tx) = self.shutdown.lock().take() else {
            return;
        };
        let _ = tx.send(true);

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for result in join_all(tasks).await {
            if let Err(e) = result {
                log::error!("Market feed task ended abnormally: {}", e);
            }
        }
        log::info!("Market feed stopped");
    }
}

async fn deliver(handlers: &HandlerList, bar: &PriceBar) {
    let handlers = handlers.read().await;
    for handler in handlers.iter() {
        handler.on_bar(bar).await;
    }
}

async fn run_symbol(
    symbol: String,
    source: Arc<dyn BarSource>,
    handlers: HandlerList,
    tick: Duration,
    request_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        match with_timeout(request_timeout, source.latest_bar(&symbol)).await {
            Ok(bar) => {
                log::debug!("{} close {}", bar.symbol, bar.close);
                deliver(&handlers, &bar).await;
            }
            Err(source) => {
                let err = MarketDataError::Fetch { symbol: symbol.clone(), source };
                log::warn!("{}; retrying next tick", err);
            }
        }
    }
    log::debug!("Market feed for {} exited", symbol);
}
