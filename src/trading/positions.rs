// src/trading/positions.rs
use crate::domain::errors::{TradingError, TradingResult};
use crate::domain::models::{Direction, Position, PositionKey};
use parking_lot::{RwLock, RwLockReadGuard};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared map of open positions.
///
/// Readers get copies. Fills are applied only from inside the crate by the
/// execution engine, so a flat position never stays in the map.
#[derive(Clone, Default)]
pub struct PositionBook {
    inner: Arc<RwLock<HashMap<PositionKey, Position>>>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> HashMap<PositionKey, Position> {
        self.inner.read().clone()
    }

    pub fn get(&self, key: &PositionKey) -> Option<Position> {
        self.inner.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, HashMap<PositionKey, Position>> {
        self.inner.read()
    }

    /// Apply a fill. Returns the updated position, or `None` once it is
    /// closed. A fill that would break the book is refused untouched.
    pub(crate) fn apply_fill(
        &self,
        key: &PositionKey,
        direction: Direction,
        quantity: Decimal,
        price: Decimal,
        timestamp: i64,
    ) -> TradingResult<Option<Position>> {
        let mut positions = self.inner.write();

        match direction {
            Direction::Buy => match positions.get_mut(key) {
                Some(position) => {
                    position.add(quantity, price, timestamp)?;
                    Ok(Some(position.clone()))
                }
                None => {
                    let position = Position::open(key, quantity, price, timestamp)?;
                    positions.insert(key.clone(), position.clone());
                    Ok(Some(position))
                }
            },
            Direction::Sell => {
                let position = positions.get_mut(key).ok_or_else(|| {
                    TradingError::PositionManagement(format!("no open position for {}", key))
                })?;
                if position.reduce(quantity, price, timestamp)? {
                    positions.remove(key);
                    Ok(None)
                } else {
                    Ok(Some(position.clone()))
                }
            }
        }
    }

    /// Mark the position for `key` to `price`, returning the updated copy
    pub(crate) fn mark_price(&self, key: &PositionKey, price: Decimal) -> Option<Position> {
        let mut positions = self.inner.write();
        let position = positions.get_mut(key)?;
        position.current_price = price;
        Some(position.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn buys_accumulate_and_sells_close() {
        let book = PositionBook::new();
        let key = PositionKey::new("BTC", None);

        book.apply_fill(&key, Direction::Buy, dec!(1), dec!(100), 1).unwrap();
        let position = book.apply_fill(&key, Direction::Buy, dec!(3), dec!(200), 2).unwrap().unwrap();
        assert_eq!(position.entry_price, dec!(175));

        assert!(book.apply_fill(&key, Direction::Sell, dec!(4), dec!(210), 3).unwrap().is_none());
        assert!(book.is_empty());
    }

    #[test]
    fn refused_fills_leave_the_book_untouched() {
        let book = PositionBook::new();
        let key = PositionKey::new("BTC", None);

        assert!(book.apply_fill(&key, Direction::Sell, dec!(1), dec!(100), 1).is_err());
        assert!(book.apply_fill(&key, Direction::Buy, dec!(0), dec!(100), 1).is_err());
        assert!(book.is_empty());

        book.apply_fill(&key, Direction::Buy, dec!(1), dec!(100), 1).unwrap();
        assert!(book.apply_fill(&key, Direction::Sell, dec!(2), dec!(100), 2).is_err());
        assert_eq!(book.get(&key).unwrap().quantity, dec!(1));
    }

    #[test]
    fn network_is_part_of_the_key() {
        let book = PositionBook::new();
        book.apply_fill(&PositionKey::new("UNI", None), Direction::Buy, dec!(1), dec!(5), 1).unwrap();
        book.apply_fill(&PositionKey::new("UNI", Some("ethereum")), Direction::Buy, dec!(2), dec!(6), 1).unwrap();

        assert_eq!(book.len(), 2);
        let marked = book.mark_price(&PositionKey::new("UNI", Some("ethereum")), dec!(7)).unwrap();
        assert_eq!(marked.current_price, dec!(7));
        assert_eq!(book.get(&PositionKey::new("UNI", None)).unwrap().current_price, dec!(5));
        assert!(book.mark_price(&PositionKey::new("BTC", None), dec!(7)).is_none());
    }
}
