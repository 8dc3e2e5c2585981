// src/trading/execution.rs
use crate::domain::errors::{TradingError, TradingResult};
use crate::domain::models::{Direction, Order, OrderStatus, Position, PositionKey, PriceBar, Signal};
use crate::exchange::client::{with_timeout, VenueClient, VenueStatus};
use crate::market_data::feed::MarketDataHandler;
use crate::trading::positions::PositionBook;
use crate::trading::risk::{RiskDecision, RiskGate};
use crate::trading::signals::SignalHandler;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

static ORDER_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// `ORD-<unix millis>-<sequence>`, unique within the process
fn next_order_id(now: i64) -> String {
    format!("ORD-{}-{}", now, ORDER_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Turns approved signals into orders on one venue, follows them to a
/// terminal status and applies fills to the position book.
///
/// An engine built with a network label keys its positions by that network;
/// this is the on-chain mirror of the plain exchange path.
pub struct ExecutionEngine {
    venue: Arc<dyn VenueClient>,
    network: Option<String>,
    orders: RwLock<HashMap<String, Order>>,
    book: PositionBook,
    risk: Arc<RiskGate>,
    request_timeout: Duration,
    reconcile_interval: Duration,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionEngine {
    pub fn new(
        venue: Arc<dyn VenueClient>,
        book: PositionBook,
        risk: Arc<RiskGate>,
        request_timeout: Duration,
        reconcile_interval: Duration,
    ) -> Self {
        Self {
            venue,
            network: None,
            orders: RwLock::new(HashMap::new()),
            book,
            risk,
            request_timeout,
            reconcile_interval,
            shutdown: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn with_network(mut self, network: &str) -> Self {
        self.network = Some(network.to_string());
        self
    }

    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    fn position_key(&self, symbol: &str) -> PositionKey {
        PositionKey::new(symbol, self.network.as_deref())
    }

    /// Place an order for an approved signal and return its id.
    ///
    /// Risk is not re-checked here. A dispatch failure leaves the order in
    /// the book as failed and is returned as an error.
    pub async fn submit(&self, signal: &Signal) -> TradingResult<String> {
        let order = self.place(signal);
        self.dispatch(order).await
    }

    /// Record a pending order for `signal` without contacting the venue.
    /// From here on it counts in `pending_buys`.
    pub(crate) fn place(&self, signal: &Signal) -> Order {
        let now = now_millis();
        let order = Order::from_signal(next_order_id(now), signal, self.network.clone(), now);
        self.orders.write().insert(order.id.clone(), order.clone());
        order
    }

    /// Send a placed order to the venue and apply an immediate verdict
    pub(crate) async fn dispatch(&self, order: Order) -> TradingResult<String> {
        let id = order.id.clone();
        log::info!(
            "Submitting {} {} {} @ {} to {} as {}",
            order.direction,
            order.quantity,
            order.symbol,
            order.price,
            self.venue.name(),
            id
        );

        let ack = match with_timeout(self.request_timeout, self.venue.submit_order(&order)).await {
            Ok(ack) => ack,
            Err(e) => {
                let message = e.to_string();
                self.apply_status(&id, VenueStatus::Failed(message.clone()))?;
                return Err(TradingError::OrderExecution(format!("{}: {}", id, message)));
            }
        };

        if let Some(order) = self.orders.write().get_mut(&id) {
            order.tx_ref = Some(ack.venue_ref.clone());
        }
        log::debug!("{} accepted by {} as {}", id, self.venue.name(), ack.venue_ref);

        if ack.status.is_terminal() {
            self.apply_status(&id, ack.status)?;
        }
        Ok(id)
    }

    /// Apply a venue status to a pending order. Returns whether the order
    /// changed. Terminal orders are never touched again.
    pub fn apply_status(&self, id: &str, status: VenueStatus) -> TradingResult<bool> {
        let mut orders = self.orders.write();
        let order = orders
            .get_mut(id)
            .ok_or_else(|| TradingError::OrderNotFound(id.to_string()))?;

        if order.status.is_terminal() {
            return Ok(false);
        }

        let (success, block_number) = match status {
            VenueStatus::Pending => return Ok(false),
            VenueStatus::Failed(reason) => {
                log::error!("Order {} failed: {}", id, reason);
                order.status = OrderStatus::Failed;
                order.error_message = Some(reason);
                return Ok(true);
            }
            VenueStatus::Filled => (OrderStatus::Filled, None),
            VenueStatus::Confirmed { block_number } => (OrderStatus::Confirmed, block_number),
        };

        // Lock order: orders, then positions
        let key = self.position_key(&order.symbol);
        let updated = match self.book.apply_fill(&key, order.direction, order.quantity, order.price, now_millis()) {
            Ok(updated) => updated,
            Err(e) => {
                log::error!("Order {} fill refused: {}", id, e);
                order.status = OrderStatus::Failed;
                order.error_message = Some(e.to_string());
                return Ok(true);
            }
        };

        order.status = success;
        order.block_number = block_number;
        log::info!(
            "Order {} {}: {} {} {} @ {}",
            id,
            success,
            order.direction,
            order.quantity,
            key,
            order.price
        );
        drop(orders);

        match updated {
            Some(position) => {
                self.risk.update_position(&position);
            }
            None => log::info!("Position {} closed", key),
        }
        Ok(true)
    }

    /// Cancel an order that has not reached a terminal status
    pub fn cancel(&self, id: &str) -> TradingResult<()> {
        let mut orders = self.orders.write();
        let order = orders
            .get_mut(id)
            .ok_or_else(|| TradingError::OrderNotFound(id.to_string()))?;

        if order.status.is_terminal() {
            return Err(TradingError::Lifecycle(format!(
                "order {} is already {}",
                id, order.status
            )));
        }
        order.status = OrderStatus::Cancelled;
        log::info!("Order {} cancelled", id);
        Ok(())
    }

    /// Poll the venue once for every pending order. Returns the number of
    /// orders that reached a terminal status.
    pub async fn reconcile_once(&self) -> usize {
        let pending: Vec<(String, String)> = self
            .orders
            .read()
            .values()
            .filter(|o| o.status == OrderStatus::Pending)
            .filter_map(|o| o.tx_ref.clone().map(|tx| (o.id.clone(), tx)))
            .collect();

        let mut settled = 0;
        for (id, venue_ref) in pending {
            match with_timeout(self.request_timeout, self.venue.poll_status(&venue_ref)).await {
                Ok(status) => match self.apply_status(&id, status) {
                    Ok(true) => settled += 1,
                    Ok(false) => {}
                    Err(e) => log::warn!("Reconcile {}: {}", id, e),
                },
                Err(e) => log::warn!("Status poll for {} ({}) failed: {}", id, venue_ref, e),
            }
        }
        settled
    }

    /// Start the periodic reconciliation loop
    pub fn start(self: &Arc<Self>) -> TradingResult<()> {
        let mut shutdown = self.shutdown.lock();
        if shutdown.is_some() {
            return Err(TradingError::Lifecycle(format!(
                "execution engine for {} already running",
                self.venue.name()
            )));
        }

        let (tx, mut rx) = watch::channel(false);
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.reconcile_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let settled = engine.reconcile_once().await;
                        if settled > 0 {
                            log::debug!("Reconciled {} orders on {}", settled, engine.venue.name());
                        }
                    }
                }
            }
        });

        *shutdown = Some(tx);
        *self.task.lock() = Some(handle);
        log::info!("Execution engine for {} started", self.venue.name());
        Ok(())
    }

    /// Stop the reconciliation loop and wait for it to exit
    pub async fn stop(&self) {
        let Some(tx) = self.shutdown.lock().take() else {
            return;
        };
        let _ = tx.send(true);

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::error!("Reconciliation task ended abnormally: {}", e);
            }
        }
        log::info!("Execution engine for {} stopped", self.venue.name());
    }

    /// Open positions on this engine's network, by symbol
    pub fn get_positions(&self) -> HashMap<String, Position> {
        self.book
            .snapshot()
            .into_iter()
            .filter(|(key, _)| key.network == self.network)
            .map(|(key, position)| (key.symbol, position))
            .collect()
    }

    pub fn get_position(&self, symbol: &str) -> Option<Position> {
        self.book.get(&self.position_key(symbol))
    }

    /// Quantity of buy orders still awaiting a venue verdict, by position key
    pub fn pending_buys(&self) -> HashMap<PositionKey, Decimal> {
        let mut pending = HashMap::new();
        for order in self
            .orders
            .read()
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.direction == Direction::Buy)
        {
            *pending.entry(self.position_key(&order.symbol)).or_insert(Decimal::ZERO) += order.quantity;
        }
        pending
    }

    pub fn get_orders(&self) -> HashMap<String, Order> {
        self.orders.read().clone()
    }

    pub fn get_order(&self, id: &str) -> Option<Order> {
        self.orders.read().get(id).cloned()
    }
}

#[async_trait]
impl MarketDataHandler for ExecutionEngine {
    /// Mark the open position to the bar close and check its thresholds
    async fn on_bar(&self, bar: &PriceBar) {
        if let Some(position) = self.book.mark_price(&self.position_key(&bar.symbol), bar.close) {
            self.risk.update_position(&position);
        }
    }
}

/// Signal handler that runs each signal through the risk gate and hands
/// approved ones to the engine for the pair's network.
///
/// Check and order placement happen under one admission lock, with pending
/// buys on every engine counted as exposure, so concurrent or unfilled
/// buys cannot overrun the limits. Venue dispatch runs outside the lock.
pub struct RiskGatedExecutor {
    risk: Arc<RiskGate>,
    primary: Arc<ExecutionEngine>,
    mirrors: HashMap<String, Arc<ExecutionEngine>>,
    routes: HashMap<String, String>,
    admission: Mutex<()>,
}

impl RiskGatedExecutor {
    pub fn new(risk: Arc<RiskGate>, primary: Arc<ExecutionEngine>) -> Self {
        Self {
            risk,
            primary,
            mirrors: HashMap::new(),
            routes: HashMap::new(),
            admission: Mutex::new(()),
        }
    }

    /// Route `symbols` to `engine`, which must carry a network label
    pub fn with_mirror(mut self, engine: Arc<ExecutionEngine>, symbols: &[String]) -> Self {
        if let Some(network) = engine.network().map(str::to_string) {
            for symbol in symbols {
                self.routes.insert(symbol.clone(), network.clone());
            }
            self.mirrors.insert(network, engine);
        }
        self
    }

    fn engine_for(&self, symbol: &str) -> Option<&Arc<ExecutionEngine>> {
        match self.routes.get(symbol) {
            Some(network) => self.mirrors.get(network),
            None => Some(&self.primary),
        }
    }

    /// Pending buys across the primary and every mirror. Read before the
    /// book, so an order filling in between is counted twice, never missed.
    fn pending_buys(&self) -> HashMap<PositionKey, Decimal> {
        let mut pending = self.primary.pending_buys();
        for engine in self.mirrors.values() {
            for (key, quantity) in engine.pending_buys() {
                *pending.entry(key).or_insert(Decimal::ZERO) += quantity;
            }
        }
        pending
    }
}

#[async_trait]
impl SignalHandler for RiskGatedExecutor {
    async fn handle_signal(&self, signal: &Signal) {
        let Some(engine) = self.engine_for(&signal.symbol) else {
            log::warn!("No execution route for {}", signal.symbol);
            return;
        };

        let order = {
            let _admission = self.admission.lock();
            let pending = self.pending_buys();
            if let RiskDecision::Rejected(_) = self.risk.check_with_pending(signal, engine.network(), &pending) {
                return;
            }
            engine.place(signal)
        };

        if let Err(e) = engine.dispatch(order).await {
            log::error!("Failed to execute signal for {}: {}", signal.symbol, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Direction;
    use crate::exchange::simulated::{FillMode, SimulatedVenue};
    use crate::trading::risk::RiskLimits;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn signal(symbol: &str, direction: Direction, price: Decimal, quantity: Decimal) -> Signal {
        Signal {
            symbol: symbol.to_string(),
            direction,
            price,
            quantity,
            timestamp: 0,
        }
    }

    fn engine(venue: SimulatedVenue) -> Arc<ExecutionEngine> {
        let book = PositionBook::new();
        let risk = Arc::new(RiskGate::new(RiskLimits::default(), book.clone()));
        Arc::new(ExecutionEngine::new(
            Arc::new(venue),
            book,
            risk,
            Duration::from_secs(1),
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn synchronous_fill_updates_the_position() {
        let engine = engine(SimulatedVenue::new("sim", dec!(100)));
        let id = engine
            .submit(&signal("BTC", Direction::Buy, dec!(100), dec!(0.5)))
            .await
            .unwrap();

        let order = engine.get_order(&id).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.tx_ref.as_deref(), Some("sim-1"));
        assert_eq!(engine.get_position("BTC").unwrap().quantity, dec!(0.5));
    }

    #[tokio::test]
    async fn pending_orders_settle_once_on_reconcile() {
        let engine = engine(SimulatedVenue::new("sim", dec!(100)).with_fill_mode(FillMode::AfterPolls(2)));
        let id = engine
            .submit(&signal("BTC", Direction::Buy, dec!(100), dec!(1)))
            .await
            .unwrap();
        assert_eq!(engine.get_order(&id).unwrap().status, OrderStatus::Pending);
        assert!(engine.get_positions().is_empty());

        assert_eq!(engine.reconcile_once().await, 0);
        assert_eq!(engine.reconcile_once().await, 1);
        assert_eq!(engine.reconcile_once().await, 0);

        assert_eq!(engine.get_order(&id).unwrap().status, OrderStatus::Filled);
        assert_eq!(engine.get_position("BTC").unwrap().quantity, dec!(1));
    }

    #[tokio::test]
    async fn terminal_status_is_applied_only_once() {
        let engine = engine(SimulatedVenue::new("sim", dec!(100)));
        let id = engine
            .submit(&signal("BTC", Direction::Buy, dec!(100), dec!(1)))
            .await
            .unwrap();

        assert!(!engine.apply_status(&id, VenueStatus::Filled).unwrap());
        assert!(!engine.apply_status(&id, VenueStatus::Failed("late".into())).unwrap());
        assert_eq!(engine.get_position("BTC").unwrap().quantity, dec!(1));
        assert!(matches!(
            engine.apply_status("ORD-missing", VenueStatus::Filled),
            Err(TradingError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn venue_failures_are_recorded_on_the_order() {
        let engine = engine(
            SimulatedVenue::new("sim", dec!(100))
                .with_failing_submit("BAD")
                .with_rejected_fills("DOGE", "insufficient liquidity"),
        );

        assert!(engine
            .submit(&signal("BAD", Direction::Buy, dec!(1), dec!(1)))
            .await
            .is_err());
        let id = engine
            .submit(&signal("DOGE", Direction::Buy, dec!(1), dec!(1)))
            .await
            .unwrap();

        let orders = engine.get_orders();
        assert_eq!(orders.len(), 2);
        assert!(orders.values().all(|o| o.status == OrderStatus::Failed));
        assert_eq!(orders[&id].error_message.as_deref(), Some("insufficient liquidity"));
        assert!(engine.get_positions().is_empty());
    }

    #[tokio::test]
    async fn oversell_fill_fails_without_touching_positions() {
        let engine = engine(SimulatedVenue::new("sim", dec!(100)));
        engine
            .submit(&signal("BTC", Direction::Buy, dec!(100), dec!(1)))
            .await
            .unwrap();
        let id = engine
            .submit(&signal("BTC", Direction::Sell, dec!(100), dec!(2)))
            .await
            .unwrap();

        let order = engine.get_order(&id).unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        assert!(order.error_message.unwrap().contains("exceeds held quantity"));
        assert_eq!(engine.get_position("BTC").unwrap().quantity, dec!(1));
    }

    #[tokio::test]
    async fn cancel_only_applies_to_pending_orders() {
        let engine = engine(SimulatedVenue::new("sim", dec!(100)).with_fill_mode(FillMode::AfterPolls(1)));
        let id = engine
            .submit(&signal("BTC", Direction::Buy, dec!(100), dec!(1)))
            .await
            .unwrap();

        engine.cancel(&id).unwrap();
        assert_eq!(engine.reconcile_once().await, 0);
        assert_eq!(engine.get_order(&id).unwrap().status, OrderStatus::Cancelled);
        assert!(engine.get_position("BTC").is_none());

        assert!(matches!(engine.cancel(&id), Err(TradingError::Lifecycle(_))));
        assert!(matches!(engine.cancel("nope"), Err(TradingError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn order_ids_are_unique() {
        let engine = engine(SimulatedVenue::new("sim", dec!(100)));
        let mut ids = std::collections::HashSet::new();
        for _ in 0..50 {
            let id = engine
                .submit(&signal("BTC", Direction::Buy, dec!(1), dec!(0.01)))
                .await
                .unwrap();
            assert!(id.starts_with("ORD-"));
            assert!(ids.insert(id));
        }
    }

    #[tokio::test]
    async fn reconciliation_loop_runs_until_stopped() {
        tokio::time::pause();
        let engine = engine(SimulatedVenue::new("sim", dec!(100)).with_fill_mode(FillMode::AfterPolls(1)));
        engine.start().unwrap();
        assert!(engine.start().is_err());

        let id = engine
            .submit(&signal("BTC", Direction::Buy, dec!(100), dec!(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(engine.get_order(&id).unwrap().status, OrderStatus::Filled);

        engine.stop().await;
        engine.stop().await;
    }

    #[tokio::test]
    async fn mirror_engine_confirms_with_block_number() {
        let book = PositionBook::new();
        let risk = Arc::new(RiskGate::new(RiskLimits::default(), book.clone()));
        let mirror = Arc::new(
            ExecutionEngine::new(
                Arc::new(SimulatedVenue::new("dex", dec!(10)).with_on_chain_confirmation()),
                book.clone(),
                risk,
                Duration::from_secs(1),
                Duration::from_secs(15),
            )
            .with_network("ethereum"),
        );

        let id = mirror
            .submit(&signal("UNI", Direction::Buy, dec!(10), dec!(1)))
            .await
            .unwrap();
        let order = mirror.get_order(&id).unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.network.as_deref(), Some("ethereum"));
        assert!(order.block_number.is_some());
        assert!(book.get(&PositionKey::new("UNI", Some("ethereum"))).is_some());
        assert!(book.get(&PositionKey::new("UNI", None)).is_none());
    }

    #[tokio::test]
    async fn gated_executor_routes_by_network_and_respects_risk() {
        let book = PositionBook::new();
        let risk = Arc::new(RiskGate::new(RiskLimits::default(), book.clone()));
        let primary = Arc::new(ExecutionEngine::new(
            Arc::new(SimulatedVenue::new("sim", dec!(100))),
            book.clone(),
            risk.clone(),
            Duration::from_secs(1),
            Duration::from_secs(5),
        ));
        let mirror = Arc::new(
            ExecutionEngine::new(
                Arc::new(SimulatedVenue::new("dex", dec!(10)).with_on_chain_confirmation()),
                book.clone(),
                risk.clone(),
                Duration::from_secs(1),
                Duration::from_secs(15),
            )
            .with_network("ethereum"),
        );
        let executor = RiskGatedExecutor::new(risk, primary.clone()).with_mirror(mirror.clone(), &["UNI".to_string()]);

        executor.handle_signal(&signal("BTC", Direction::Buy, dec!(100), dec!(0.5))).await;
        executor.handle_signal(&signal("UNI", Direction::Buy, dec!(10), dec!(0.5))).await;
        // Rejected: nothing held on the primary path
        executor.handle_signal(&signal("ETH", Direction::Sell, dec!(10), dec!(0.5))).await;

        assert_eq!(primary.get_orders().len(), 1);
        assert_eq!(mirror.get_orders().len(), 1);
        assert!(primary.get_position("BTC").is_some());
        assert!(mirror.get_position("UNI").is_some());
        assert!(primary.get_position("UNI").is_none());
    }

    fn gated(limits: RiskLimits, venue: SimulatedVenue) -> (Arc<ExecutionEngine>, Arc<RiskGatedExecutor>) {
        let book = PositionBook::new();
        let risk = Arc::new(RiskGate::new(limits, book.clone()));
        let engine = Arc::new(ExecutionEngine::new(
            Arc::new(venue),
            book,
            risk.clone(),
            Duration::from_secs(1),
            Duration::from_secs(5),
        ));
        let executor = Arc::new(RiskGatedExecutor::new(risk, engine.clone()));
        (engine, executor)
    }

    #[tokio::test]
    async fn unfilled_buys_hold_their_exposure() {
        let limits = RiskLimits { max_open_positions: 1, ..RiskLimits::default() };
        let (engine, executor) = gated(
            limits,
            SimulatedVenue::new("sim", dec!(100)).with_fill_mode(FillMode::AfterPolls(1)),
        );

        executor.handle_signal(&signal("A", Direction::Buy, dec!(100), dec!(0.6))).await;
        // Same key: no new slot, but the pending 0.6 counts toward the size limit
        executor.handle_signal(&signal("A", Direction::Buy, dec!(100), dec!(0.6))).await;
        for symbol in ["B", "C"] {
            executor.handle_signal(&signal(symbol, Direction::Buy, dec!(100), dec!(0.1))).await;
        }

        assert_eq!(engine.get_orders().len(), 1);
        assert_eq!(
            engine.pending_buys(),
            HashMap::from([(PositionKey::new("A", None), dec!(0.6))])
        );

        assert_eq!(engine.reconcile_once().await, 1);
        assert!(engine.pending_buys().is_empty());
        assert_eq!(engine.get_positions().len(), 1);
        assert_eq!(engine.get_position("A").unwrap().quantity, dec!(0.6));
    }

    #[tokio::test]
    async fn failed_dispatch_releases_the_reserved_slot() {
        let limits = RiskLimits { max_open_positions: 1, ..RiskLimits::default() };
        let (engine, executor) = gated(
            limits,
            SimulatedVenue::new("sim", dec!(100))
                .with_fill_mode(FillMode::AfterPolls(1))
                .with_failing_submit("BAD"),
        );

        executor.handle_signal(&signal("BAD", Direction::Buy, dec!(100), dec!(0.1))).await;
        executor.handle_signal(&signal("A", Direction::Buy, dec!(100), dec!(0.1))).await;

        let orders = engine.get_orders();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders.values().filter(|o| o.status == OrderStatus::Failed).count(), 1);
        assert_eq!(engine.pending_buys().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_buys_cannot_overrun_the_open_limit() {
        let limits = RiskLimits { max_open_positions: 2, ..RiskLimits::default() };
        let (engine, executor) = gated(
            limits,
            SimulatedVenue::new("sim", dec!(100)).with_fill_mode(FillMode::AfterPolls(1)),
        );

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let executor = executor.clone();
                tokio::spawn(async move {
                    let symbol = format!("S{}", i);
                    executor.handle_signal(&signal(&symbol, Direction::Buy, dec!(100), dec!(0.1))).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(engine.get_orders().len(), 2);
        assert_eq!(engine.reconcile_once().await, 2);
        assert_eq!(engine.get_positions().len(), 2);
    }

    #[tokio::test]
    async fn bars_mark_open_positions() {
        let engine = engine(SimulatedVenue::new("sim", dec!(100)));
        engine
            .submit(&signal("BTC", Direction::Buy, dec!(100), dec!(1)))
            .await
            .unwrap();

        engine.on_bar(&PriceBar::from_close("BTC", 1, dec!(120))).await;
        engine.on_bar(&PriceBar::from_close("ETH", 1, dec!(5))).await;

        assert_eq!(engine.get_position("BTC").unwrap().current_price, dec!(120));
        assert!(engine.get_position("ETH").is_none());
    }
}
