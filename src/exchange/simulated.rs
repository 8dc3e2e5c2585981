// src/exchange/simulated.rs
//
// In-process venue. Prices follow a random walk unless a close series is
// scripted for the symbol; orders fill on submit or after a number of
// status polls. Failure injection hooks exist for tests.
use crate::domain::errors::{ExchangeError, ExchangeResult};
use crate::domain::models::{Order, PriceBar};
use crate::exchange::client::{BarSource, SubmitAck, VenueClient, VenueStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

const BAR_SPACING_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillMode {
    /// Terminal status is returned in the submit acknowledgement
    OnSubmit,
    /// Status turns terminal on the Nth poll
    AfterPolls(u32),
}

#[derive(Debug)]
struct SimOrder {
    symbol: String,
    polls_remaining: u32,
    outcome: VenueStatus,
}

pub struct SimulatedVenue {
    name: String,
    seed_price: Decimal,
    fill_mode: FillMode,
    on_chain: bool,
    last_prices: Mutex<HashMap<String, Decimal>>,
    scripts: Mutex<HashMap<String, VecDeque<Decimal>>>,
    histories: HashMap<String, Vec<Decimal>>,
    failing_history: HashSet<String>,
    failing_submit: HashSet<String>,
    rejected_fills: HashMap<String, String>,
    orders: Mutex<HashMap<String, SimOrder>>,
    next_ref: AtomicU64,
    block_height: AtomicU64,
    polls: AtomicU64,
}

impl SimulatedVenue {
    pub fn new(name: &str, seed_price: Decimal) -> Self {
        Self {
            name: name.to_string(),
            seed_price,
            fill_mode: FillMode::OnSubmit,
            on_chain: false,
            last_prices: Mutex::new(HashMap::new()),
            scripts: Mutex::new(HashMap::new()),
            histories: HashMap::new(),
            failing_history: HashSet::new(),
            failing_submit: HashSet::new(),
            rejected_fills: HashMap::new(),
            orders: Mutex::new(HashMap::new()),
            next_ref: AtomicU64::new(1),
            block_height: AtomicU64::new(1_000),
            polls: AtomicU64::new(0),
        }
    }

    pub fn with_fill_mode(mut self, fill_mode: FillMode) -> Self {
        self.fill_mode = fill_mode;
        self
    }

    /// Report `Confirmed` with a block number instead of `Filled`
    pub fn with_on_chain_confirmation(mut self) -> Self {
        self.on_chain = true;
        self
    }

    /// Live bars for `symbol` replay these closes, one per fetch
    pub fn with_script(self, symbol: &str, closes: Vec<Decimal>) -> Self {
        self.scripts.lock().insert(symbol.to_string(), closes.into());
        self
    }

    /// Historical closes for `symbol`, oldest first
    pub fn with_history(mut self, symbol: &str, closes: Vec<Decimal>) -> Self {
        self.histories.insert(symbol.to_string(), closes);
        self
    }

    pub fn with_failing_history(mut self, symbol: &str) -> Self {
        self.failing_history.insert(symbol.to_string());
        self
    }

    pub fn with_failing_submit(mut self, symbol: &str) -> Self {
        self.failing_submit.insert(symbol.to_string());
        self
    }

    /// Orders for `symbol` are accepted but end up failed with `reason`
    pub fn with_rejected_fills(mut self, symbol: &str, reason: &str) -> Self {
        self.rejected_fills.insert(symbol.to_string(), reason.to_string());
        self
    }

    /// Number of status polls served so far
    pub fn poll_count(&self) -> u64 {
        self.polls.load(Ordering::SeqCst)
    }

    fn success_status(&self) -> VenueStatus {
        if self.on_chain {
            let block = self.block_height.fetch_add(1, Ordering::SeqCst);
            VenueStatus::Confirmed { block_number: Some(block) }
        } else {
            VenueStatus::Filled
        }
    }

    fn outcome_for(&self, symbol: &str) -> VenueStatus {
        match self.rejected_fills.get(symbol) {
            Some(reason) => VenueStatus::Failed(reason.clone()),
            None => self.success_status(),
        }
    }

    fn next_close(&self, symbol: &str) -> ExchangeResult<Decimal> {
        if let Some(script) = self.scripts.lock().get_mut(symbol) {
            return script
                .pop_front()
                .ok_or_else(|| ExchangeError::Api(format!("no more scripted bars for {}", symbol)));
        }

        let mut prices = self.last_prices.lock();
        let last = prices.entry(symbol.to_string()).or_insert(self.seed_price);
        *last = random_step(*last);
        Ok(*last)
    }
}

// Moves the price by up to +/-1%, two decimals, never below one cent.
fn random_step(price: Decimal) -> Decimal {
    let step = rand::thread_rng().gen_range(-10..=10);
    let moved = price + price * Decimal::new(step, 3);
    moved.round_dp(2).max(Decimal::new(1, 2))
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl VenueClient for SimulatedVenue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_historical_bars(
        &self,
        symbol: &str,
        _interval: &str,
        count: usize,
    ) -> ExchangeResult<Vec<PriceBar>> {
        if self.failing_history.contains(symbol) {
            return Err(ExchangeError::InvalidSymbol(symbol.to_string()));
        }

        let closes: Vec<Decimal> = match self.histories.get(symbol) {
            Some(closes) => {
                let skip = closes.len().saturating_sub(count);
                closes[skip..].to_vec()
            }
            None => {
                let mut price = self.seed_price;
                (0..count)
                    .map(|_| {
                        price = random_step(price);
                        price
                    })
                    .collect()
            }
        };

        let end = now_millis();
        let first = end - BAR_SPACING_MS * closes.len() as i64;
        Ok(closes
            .into_iter()
            .enumerate()
            .map(|(i, close)| PriceBar::from_close(symbol, first + BAR_SPACING_MS * (i as i64 + 1), close))
            .collect())
    }

    async fn submit_order(&self, order: &Order) -> ExchangeResult<SubmitAck> {
        if self.failing_submit.contains(&order.symbol) {
            return Err(ExchangeError::Order(format!("{} rejected {}", self.name, order.id)));
        }

        let venue_ref = if self.on_chain {
            format!("0x{:064x}", self.next_ref.fetch_add(1, Ordering::SeqCst))
        } else {
            format!("{}-{}", self.name, self.next_ref.fetch_add(1, Ordering::SeqCst))
        };

        let status = match self.fill_mode {
            FillMode::OnSubmit => self.outcome_for(&order.symbol),
            FillMode::AfterPolls(polls) => {
                self.orders.lock().insert(
                    venue_ref.clone(),
                    SimOrder {
                        symbol: order.symbol.clone(),
                        polls_remaining: polls,
                        outcome: VenueStatus::Pending,
                    },
                );
                VenueStatus::Pending
            }
        };

        Ok(SubmitAck { venue_ref, status })
    }

    async fn poll_status(&self, venue_ref: &str) -> ExchangeResult<VenueStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);

        let mut orders = self.orders.lock();
        let order = orders
            .get_mut(venue_ref)
            .ok_or_else(|| ExchangeError::UnknownOrder(venue_ref.to_string()))?;

        if order.outcome.is_terminal() {
            return Ok(order.outcome.clone());
        }
        if order.polls_remaining > 0 {
            order.polls_remaining -= 1;
            if order.polls_remaining > 0 {
                return Ok(VenueStatus::Pending);
            }
        }
        let symbol = order.symbol.clone();
        order.outcome = self.outcome_for(&symbol);
        Ok(order.outcome.clone())
    }
}

#[async_trait]
impl BarSource for SimulatedVenue {
    async fn latest_bar(&self, symbol: &str) -> ExchangeResult<PriceBar> {
        let close = self.next_close(symbol)?;
        Ok(PriceBar::from_close(symbol, now_millis(), close))
    }
}
