// src/trading/strategies.rs
use crate::analysis::indicators;
use crate::config::{QuantityConfig, StrategyConfig};
use crate::domain::errors::{TradingError, TradingResult};
use crate::domain::models::{Direction, PriceBar, Signal};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Trading strategy trait that all strategies must implement.
/// Implementations keep their own per-symbol state.
pub trait TradingStrategy: Send + Sync {
    /// Get the name of the strategy
    fn name(&self) -> &str;

    /// Get the description of the strategy
    fn description(&self) -> &str;

    /// Get strategy parameters
    fn parameters(&self) -> Vec<StrategyParameter>;

    /// Number of historical bars wanted for warm-up
    fn warm_up_bars(&self) -> usize;

    /// Seed the state for `symbol` from historical bars, oldest first.
    /// Never emits a signal.
    fn warm_up(&mut self, symbol: &str, bars: &[PriceBar]) -> TradingResult<()>;

    /// Feed one live bar; returns a signal on a state transition
    fn process(&mut self, bar: &PriceBar) -> TradingResult<Option<Signal>>;
}

/// Strategy parameter value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Integer(i64),
    Decimal(Decimal),
    String(String),
}

/// Strategy parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyParameter {
    pub name: String,
    pub description: String,
    pub value: ParameterValue,
}

impl StrategyParameter {
    fn new(name: &str, description: &str, value: ParameterValue) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            value,
        }
    }
}

/// Decides how much to trade for a signal at `price`
pub trait QuantityPolicy: Send + Sync {
    fn describe(&self) -> String;

    fn quantity(&self, price: Decimal) -> Decimal;
}

#[derive(Debug, Clone)]
pub struct FixedQuantity(pub Decimal);

impl QuantityPolicy for FixedQuantity {
    fn describe(&self) -> String {
        format!("fixed {}", self.0)
    }

    fn quantity(&self, _price: Decimal) -> Decimal {
        self.0
    }
}

/// Spend `percent` of `equity` per signal
#[derive(Debug, Clone)]
pub struct PercentOfEquity {
    pub equity: Decimal,
    pub percent: Decimal,
}

impl QuantityPolicy for PercentOfEquity {
    fn describe(&self) -> String {
        format!("{}% of {}", self.percent, self.equity)
    }

    fn quantity(&self, price: Decimal) -> Decimal {
        if price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.equity * self.percent / Decimal::ONE_HUNDRED / price).round_dp(8)
    }
}

pub fn quantity_policy_from_config(config: &QuantityConfig) -> Box<dyn QuantityPolicy> {
    match config {
        QuantityConfig::Fixed { quantity } => Box::new(FixedQuantity(*quantity)),
        QuantityConfig::PercentOfEquity { equity, percent } => Box::new(PercentOfEquity {
            equity: *equity,
            percent: *percent,
        }),
    }
}

/// Build the strategy named in the configuration
pub fn strategy_from_config(config: &StrategyConfig) -> TradingResult<Box<dyn TradingStrategy>> {
    match config.name.as_str() {
        "moving_average_crossover" | "ma_crossover" => Ok(Box::new(MovingAverageCrossover::new(
            config.short_period,
            config.long_period,
            config.history_margin,
            quantity_policy_from_config(&config.quantity),
        )?)),
        other => Err(TradingError::Strategy(format!("Unknown strategy: {}", other))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trend {
    Up,
    Down,
}

#[derive(Debug, Default)]
struct SymbolState {
    closes: VecDeque<Decimal>,
    trend: Option<Trend>,
}

impl SymbolState {
    /// Append in place, dropping the oldest closes beyond `capacity`
    fn push_close(&mut self, close: Decimal, capacity: usize) {
        self.closes.push_back(close);
        while self.closes.len() > capacity {
            self.closes.pop_front();
        }
    }
}

/// Moving average crossover.
///
/// Emits a buy when the short SMA moves above the long SMA and a sell when
/// it moves back to or below it. Equal averages count as a down trend. The
/// first trend computed for a symbol, during warm-up or live, only records
/// state.
pub struct MovingAverageCrossover {
    short_period: usize,
    long_period: usize,
    capacity: usize,
    quantity: Box<dyn QuantityPolicy>,
    states: HashMap<String, SymbolState>,
}

impl MovingAverageCrossover {
    pub fn new(
        short_period: usize,
        long_period: usize,
        history_margin: usize,
        quantity: Box<dyn QuantityPolicy>,
    ) -> TradingResult<Self> {
        if short_period == 0 || short_period >= long_period {
            return Err(TradingError::Strategy(format!(
                "Short period must be >= 1 and < long period (got {} / {})",
                short_period, long_period
            )));
        }
        Ok(Self {
            short_period,
            long_period,
            capacity: long_period + history_margin,
            quantity,
            states: HashMap::new(),
        })
    }

    fn trend(
        short_period: usize,
        long_period: usize,
        closes: &VecDeque<Decimal>,
    ) -> TradingResult<Option<Trend>> {
        if closes.len() < long_period {
            return Ok(None);
        }
        let short = indicators::calculate_sma(closes, short_period)
            .map_err(|e| TradingError::Strategy(format!("Failed to calculate short SMA: {}", e)))?;
        let long = indicators::calculate_sma(closes, long_period)
            .map_err(|e| TradingError::Strategy(format!("Failed to calculate long SMA: {}", e)))?;

        log::debug!("short SMA {} / long SMA {}", short, long);
        Ok(Some(if short > long { Trend::Up } else { Trend::Down }))
    }
}

impl TradingStrategy for MovingAverageCrossover {
    fn name(&self) -> &str {
        "moving_average_crossover"
    }

    fn description(&self) -> &str {
        "Signals when the short simple moving average crosses the long one"
    }

    fn parameters(&self) -> Vec<StrategyParameter> {
        vec![
            StrategyParameter::new(
                "short_period",
                "Short SMA period",
                ParameterValue::Integer(self.short_period as i64),
            ),
            StrategyParameter::new(
                "long_period",
                "Long SMA period",
                ParameterValue::Integer(self.long_period as i64),
            ),
            StrategyParameter::new(
                "history_capacity",
                "Closes kept per symbol",
                ParameterValue::Integer(self.capacity as i64),
            ),
            StrategyParameter::new(
                "quantity_policy",
                "Order size per signal",
                ParameterValue::String(self.quantity.describe()),
            ),
        ]
    }

    fn warm_up_bars(&self) -> usize {
        self.capacity
    }

    fn warm_up(&mut self, symbol: &str, bars: &[PriceBar]) -> TradingResult<()> {
        if bars.len() < self.long_period {
            return Err(TradingError::Strategy(format!(
                "Not enough history for {}. Need at least {} bars, got {}",
                symbol,
                self.long_period,
                bars.len()
            )));
        }

        let mut state = SymbolState {
            closes: VecDeque::with_capacity(self.capacity + 1),
            trend: None,
        };
        for bar in bars {
            state.push_close(bar.close, self.capacity);
        }
        state.trend = Self::trend(self.short_period, self.long_period, &state.closes)?;
        log::info!("Warmed up {} with {} bars, trend {:?}", symbol, state.closes.len(), state.trend);

        self.states.insert(symbol.to_string(), state);
        Ok(())
    }

    fn process(&mut self, bar: &PriceBar) -> TradingResult<Option<Signal>> {
        let state = self.states.entry(bar.symbol.clone()).or_default();
        state.push_close(bar.close, self.capacity);
        let Some(current) = Self::trend(self.short_period, self.long_period, &state.closes)? else {
            return Ok(None);
        };

        let previous = state.trend.replace(current);
        let direction = match (previous, current) {
            (Some(Trend::Down), Trend::Up) => Direction::Buy,
            (Some(Trend::Up), Trend::Down) => Direction::Sell,
            _ => return Ok(None),
        };

        let quantity = self.quantity.quantity(bar.close);
        if quantity <= Decimal::ZERO {
            log::warn!("{} crossover at {} sized to zero; no signal", bar.symbol, bar.close);
            return Ok(None);
        }

        Ok(Some(Signal {
            symbol: bar.symbol.clone(),
            direction,
            price: bar.close,
            quantity,
            timestamp: bar.timestamp,
        }))
    }
}
