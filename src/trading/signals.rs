// src/trading/signals.rs
use crate::domain::models::{PriceBar, Signal};
use crate::exchange::client::{with_timeout, VenueClient};
use crate::market_data::feed::MarketDataHandler;
use crate::trading::strategies::{StrategyParameter, TradingStrategy};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Anything that wants trading signals: execution, analytics, alerting
#[async_trait]
pub trait SignalHandler: Send + Sync {
    async fn handle_signal(&self, signal: &Signal);
}

/// Signal processor that runs a strategy over incoming bars and hands the
/// resulting signals to every registered handler
pub struct SignalProcessor {
    strategy: Mutex<Box<dyn TradingStrategy>>,
    handlers: RwLock<Vec<Arc<dyn SignalHandler>>>,
}

impl SignalProcessor {
    /// Create a new signal processor
    pub fn new(strategy: Box<dyn TradingStrategy>) -> Self {
        Self {
            strategy: Mutex::new(strategy),
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to trading signals
    pub async fn register_signal_handler(&self, handler: Arc<dyn SignalHandler>) {
        self.handlers.write().await.push(handler);
    }

    /// Seed the strategy with history for each symbol. Returns the symbols
    /// that are ready to trade; a symbol whose history cannot be fetched
    /// or is too short is logged and left out.
    pub async fn initialize(
        &self,
        venue: &dyn VenueClient,
        symbols: &[String],
        interval: &str,
        request_timeout: Duration,
    ) -> Vec<String> {
        let count = self.strategy.lock().warm_up_bars();
        let mut ready = Vec::with_capacity(symbols.len());

        for symbol in symbols {
            log::info!("Fetching {} bars of {}/{} from {}", count, symbol, interval, venue.name());
            let bars = match with_timeout(request_timeout, venue.get_historical_bars(symbol, interval, count)).await {
                Ok(bars) => bars,
                Err(e) => {
                    log::error!("Skipping {}: history unavailable: {}", symbol, e);
                    continue;
                }
            };

            match self.strategy.lock().warm_up(symbol, &bars) {
                Ok(()) => ready.push(symbol.clone()),
                Err(e) => log::error!("Skipping {}: {}", symbol, e),
            }
        }
        ready
    }

    /// Run the strategy on one bar and distribute any signal
    pub async fn process_bar(&self, bar: &PriceBar) -> Option<Signal> {
        // The strategy lock is released before handlers run
        let result = self.strategy.lock().process(bar);
        let signal = match result {
            Ok(Some(signal)) => signal,
            Ok(None) => return None,
            Err(e) => {
                log::error!("Strategy error on {}: {}", bar.symbol, e);
                return None;
            }
        };

        log::info!(
            "Generated {} signal for {} {} @ {}",
            signal.direction,
            signal.quantity,
            signal.symbol,
            signal.price
        );

        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle_signal(&signal).await;
        }
        Some(signal)
    }

    pub fn strategy_name(&self) -> String {
        self.strategy.lock().name().to_string()
    }

    pub fn strategy_parameters(&self) -> Vec<StrategyParameter> {
        self.strategy.lock().parameters()
    }
}

#[async_trait]
impl MarketDataHandler for SignalProcessor {
    async fn on_bar(&self, bar: &PriceBar) {
        self.process_bar(bar).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Direction;
    use crate::exchange::simulated::SimulatedVenue;
    use crate::trading::strategies::{FixedQuantity, MovingAverageCrossover};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[derive(Default)]
    struct Collector {
        signals: Mutex<Vec<Signal>>,
    }

    #[async_trait]
    impl SignalHandler for Collector {
        async fn handle_signal(&self, signal: &Signal) {
            self.signals.lock().push(signal.clone());
        }
    }

    fn processor() -> SignalProcessor {
        let strategy = MovingAverageCrossover::new(3, 5, 10, Box::new(FixedQuantity(dec!(1)))).unwrap();
        SignalProcessor::new(Box::new(strategy))
    }

    #[tokio::test]
    async fn every_handler_receives_each_signal() {
        let processor = processor();
        let first = Arc::new(Collector::default());
        let second = Arc::new(Collector::default());
        processor.register_signal_handler(first.clone()).await;
        processor.register_signal_handler(second.clone()).await;

        for close in [10, 10, 10, 10, 10, 12] {
            processor.on_bar(&PriceBar::from_close("BTC", 0, Decimal::from(close))).await;
        }

        assert_eq!(first.signals.lock().len(), 1);
        assert_eq!(second.signals.lock()[0].direction, Direction::Buy);
    }

    #[tokio::test]
    async fn initialize_skips_symbols_without_history() {
        let venue = SimulatedVenue::new("sim", dec!(100))
            .with_failing_history("BAD")
            .with_history("SHORT", vec![dec!(1), dec!(2)]);
        let processor = processor();

        let symbols = vec!["BTC".to_string(), "BAD".to_string(), "SHORT".to_string()];
        let ready = processor
            .initialize(&venue, &symbols, "1m", Duration::from_secs(1))
            .await;

        assert_eq!(ready, vec!["BTC".to_string()]);
    }

    #[test]
    fn exposes_strategy_name_and_parameters() {
        let processor = processor();
        assert_eq!(processor.strategy_name(), "moving_average_crossover");
        assert_eq!(processor.strategy_parameters().len(), 4);
    }
}
