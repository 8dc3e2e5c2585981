// src/trading/mod.rs
pub mod execution;
pub mod positions;
pub mod risk;
pub mod signals;
pub mod strategies;

pub use execution::{ExecutionEngine, RiskGatedExecutor};
pub use positions::PositionBook;
pub use risk::{ProtectiveTrigger, RejectReason, RiskDecision, RiskGate, RiskLimits};
pub use signals::{SignalHandler, SignalProcessor};
pub use strategies::{
    strategy_from_config, FixedQuantity, MovingAverageCrossover, PercentOfEquity, QuantityPolicy,
    TradingStrategy,
};
