// src/trading/risk.rs
use crate::analysis::indicators::{format_price, profit_loss_percent};
use crate::config::RiskConfig;
use crate::domain::models::{Direction, Position, PositionKey, Signal};
use crate::trading::positions::PositionBook;
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

/// Risk parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RiskLimits {
    /// Maximum number of open positions
    pub max_open_positions: usize,

    /// Maximum quantity per position
    pub max_position_size: Decimal,

    /// Stop loss percentage
    pub stop_loss_percent: Decimal,

    /// Take profit percentage
    pub take_profit_percent: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_open_positions: 5,
            max_position_size: Decimal::ONE,
            stop_loss_percent: Decimal::new(5, 0),
            take_profit_percent: Decimal::new(10, 0),
        }
    }
}

impl From<&RiskConfig> for RiskLimits {
    fn from(config: &RiskConfig) -> Self {
        Self {
            max_open_positions: config.max_open_positions,
            max_position_size: config.max_position_size,
            stop_loss_percent: config.stop_loss_percent,
            take_profit_percent: config.take_profit_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("maximum open positions reached ({open}/{max})")]
    MaxOpenPositions { open: usize, max: usize },

    #[error("position size {requested} would exceed limit {max}")]
    MaxPositionSize { requested: Decimal, max: Decimal },

    #[error("insufficient position: holding {held}, selling {requested}")]
    InsufficientPosition { held: Decimal, requested: Decimal },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Approved,
    Rejected(RejectReason),
}

impl RiskDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, RiskDecision::Approved)
    }
}

/// Threshold crossed by an open position. Reported only; no order follows.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtectiveTrigger {
    StopLoss { pnl_percent: Decimal },
    TakeProfit { pnl_percent: Decimal },
}

pub struct RiskGate {
    limits: RiskLimits,
    book: PositionBook,
}

impl RiskGate {
    pub fn new(limits: RiskLimits, book: PositionBook) -> Self {
        Self { limits, book }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Decide whether `signal` may become an order on `network`.
    /// The whole check runs against a single view of the book.
    pub fn check(&self, signal: &Signal, network: Option<&str>) -> RiskDecision {
        self.check_with_pending(signal, network, &HashMap::new())
    }

    /// `check`, with `pending` buy quantities per key counted as exposure
    /// that is already committed. A key with a pending buy holds an open
    /// position slot even before its first fill.
    pub fn check_with_pending(
        &self,
        signal: &Signal,
        network: Option<&str>,
        pending: &HashMap<PositionKey, Decimal>,
    ) -> RiskDecision {
        let positions = self.book.read();
        let key = PositionKey::new(&signal.symbol, network);

        let decision = match signal.direction {
            Direction::Buy => {
                let reserved = pending
                    .iter()
                    .filter(|(k, quantity)| !quantity.is_zero() && !positions.contains_key(*k))
                    .count();
                let open = positions.len() + reserved;
                let held = positions.get(&key).map(|p| p.quantity);
                let pending_here = pending.get(&key).copied().filter(|q| !q.is_zero());

                if open >= self.limits.max_open_positions {
                    RiskDecision::Rejected(RejectReason::MaxOpenPositions {
                        open,
                        max: self.limits.max_open_positions,
                    })
                } else if held.is_none() && pending_here.is_none() {
                    // Size limit applies only once the key has exposure
                    RiskDecision::Approved
                } else {
                    let requested =
                        held.unwrap_or(Decimal::ZERO) + pending_here.unwrap_or(Decimal::ZERO) + signal.quantity;
                    if requested > self.limits.max_position_size {
                        RiskDecision::Rejected(RejectReason::MaxPositionSize {
                            requested,
                            max: self.limits.max_position_size,
                        })
                    } else {
                        RiskDecision::Approved
                    }
                }
            }
            Direction::Sell => {
                let held = positions.get(&key).map(|p| p.quantity).unwrap_or(Decimal::ZERO);
                // Zero held also rejects a zero-quantity sell
                if held.is_zero() || held < signal.quantity {
                    RiskDecision::Rejected(RejectReason::InsufficientPosition {
                        held,
                        requested: signal.quantity,
                    })
                } else {
                    RiskDecision::Approved
                }
            }
        };
        drop(positions);

        if let RiskDecision::Rejected(reason) = &decision {
            log::warn!("Risk rejected {} {} {}: {}", signal.direction, signal.quantity, key, reason);
        }
        decision
    }

    /// Evaluate stop-loss and take-profit for a freshly updated position
    pub fn update_position(&self, position: &Position) -> Option<ProtectiveTrigger> {
        let pnl_percent = profit_loss_percent(position.entry_price, position.current_price).round_dp(2);

        if pnl_percent <= -self.limits.stop_loss_percent {
            log::warn!(
                "Stop loss triggered for {} at {} ({}%)",
                position.key(),
                format_price(position.current_price),
                pnl_percent
            );
            Some(ProtectiveTrigger::StopLoss { pnl_percent })
        } else if pnl_percent >= self.limits.take_profit_percent {
            log::info!(
                "Take profit triggered for {} at {} ({}%)",
                position.key(),
                format_price(position.current_price),
                pnl_percent
            );
            Some(ProtectiveTrigger::TakeProfit { pnl_percent })
        } else {
            None
        }
    }
}
