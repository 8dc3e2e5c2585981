// src/domain/models.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::{TradingError, TradingResult};

/// One OHLCV sample for a symbol. Never mutated after the feed produces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub symbol: String,
    /// Bar close time, unix millis
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl PriceBar {
    /// Flat bar where every price field equals `close`.
    pub fn from_close(symbol: &str, timestamp: i64, close: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            timestamp,
            open: close,
            high: close,
            low: close,
            close,
            volume: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A strategy's recommendation. Fire-and-forget: it only lives while it
/// travels through risk and execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: Direction,
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Filled,
    Confirmed,
    Failed,
    Cancelled,
}

impl OrderStatus {
    /// Everything except `Pending` is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Confirmed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Confirmed => write!(f, "CONFIRMED"),
            OrderStatus::Failed => write!(f, "FAILED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub direction: Direction,
    pub price: Decimal,
    pub quantity: Decimal,
    pub status: OrderStatus,
    pub timestamp: i64,
    pub network: Option<String>,
    /// Venue order id or transaction hash, set once the venue accepted it
    pub tx_ref: Option<String>,
    pub block_number: Option<u64>,
    pub error_message: Option<String>,
}

impl Order {
    pub fn from_signal(id: String, signal: &Signal, network: Option<String>, timestamp: i64) -> Self {
        Self {
            id,
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            price: signal.price,
            quantity: signal.quantity,
            status: OrderStatus::Pending,
            timestamp,
            network,
            tx_ref: None,
            block_number: None,
            error_message: None,
        }
    }
}

/// Positions are unique per symbol and, for the on-chain path, per network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey {
    pub symbol: String,
    pub network: Option<String>,
}

impl PositionKey {
    pub fn new(symbol: &str, network: Option<&str>) -> Self {
        Self {
            symbol: symbol.to_string(),
            network: network.map(str::to_string),
        }
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.network {
            Some(network) => write!(f, "{}-{}", self.symbol, network),
            None => f.write_str(&self.symbol),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub network: Option<String>,
    pub quantity: Decimal,
    /// Volume-weighted average of all buy fills
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub timestamp: i64,
}

impl Position {
    /// Open a position from a first buy fill.
    pub fn open(key: &PositionKey, quantity: Decimal, price: Decimal, timestamp: i64) -> TradingResult<Self> {
        if quantity <= Decimal::ZERO {
            return Err(TradingError::PositionManagement(format!(
                "cannot open {} with non-positive quantity {}",
                key, quantity
            )));
        }
        Ok(Self {
            symbol: key.symbol.clone(),
            network: key.network.clone(),
            quantity,
            entry_price: price,
            current_price: price,
            timestamp,
        })
    }

    pub fn key(&self) -> PositionKey {
        PositionKey {
            symbol: self.symbol.clone(),
            network: self.network.clone(),
        }
    }

    /// Add a buy fill, re-weighting the entry price.
    pub fn add(&mut self, quantity: Decimal, price: Decimal, timestamp: i64) -> TradingResult<()> {
        if quantity <= Decimal::ZERO {
            return Err(TradingError::PositionManagement(format!(
                "buy fill for {} has non-positive quantity {}",
                self.symbol, quantity
            )));
        }
        let new_quantity = self.quantity + quantity;
        self.entry_price = (self.entry_price * self.quantity + price * quantity) / new_quantity;
        self.quantity = new_quantity;
        self.current_price = price;
        self.timestamp = timestamp;
        Ok(())
    }

    /// Remove a sell fill. Returns true when the position is now flat.
    /// Over-selling is rejected without touching the position.
    pub fn reduce(&mut self, quantity: Decimal, price: Decimal, timestamp: i64) -> TradingResult<bool> {
        if quantity <= Decimal::ZERO {
            return Err(TradingError::PositionManagement(format!(
                "sell fill for {} has non-positive quantity {}",
                self.symbol, quantity
            )));
        }
        if quantity > self.quantity {
            return Err(TradingError::PositionManagement(format!(
                "sell of {} {} exceeds held quantity {}",
                quantity, self.symbol, self.quantity
            )));
        }
        self.quantity -= quantity;
        self.current_price = price;
        self.timestamp = timestamp;
        Ok(self.quantity.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn buy_fills_weight_the_entry_price() {
        let key = PositionKey::new("ETHUSDT", None);
        let mut position = Position::open(&key, dec!(2), dec!(100), 1).unwrap();
        position.add(dec!(1), dec!(130), 2).unwrap();

        assert_eq!(position.quantity, dec!(3));
        assert_eq!(position.entry_price, dec!(110));
        assert_eq!(position.current_price, dec!(130));
    }

    #[test]
    fn reduce_reports_flat_and_refuses_oversell() {
        let key = PositionKey::new("ETHUSDT", None);
        let mut position = Position::open(&key, dec!(1.5), dec!(100), 1).unwrap();

        assert!(position.reduce(dec!(2), dec!(90), 2).is_err());
        assert_eq!(position.quantity, dec!(1.5));

        assert!(!position.reduce(dec!(0.5), dec!(90), 3).unwrap());
        assert!(position.reduce(dec!(1.0), dec!(95), 4).unwrap());
        assert!(position.quantity.is_zero());
    }

    #[test]
    fn position_key_display_includes_network() {
        assert_eq!(PositionKey::new("UNI", Some("ethereum")).to_string(), "UNI-ethereum");
        assert_eq!(PositionKey::new("UNI", None).to_string(), "UNI");
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!OrderStatus::Pending.is_terminal());
        for status in [
            OrderStatus::Filled,
            OrderStatus::Confirmed,
            OrderStatus::Failed,
            OrderStatus::Cancelled,
        ] {
            assert!(status.is_terminal());
        }
        assert!(OrderStatus::Confirmed.is_success());
        assert!(!OrderStatus::Cancelled.is_success());
    }
}
