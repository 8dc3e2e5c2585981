// src/domain/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Market data error: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Trading error: {0}")]
    Trading(#[from] TradingError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures talking to a venue. These are transient from the pipeline's
/// point of view: the caller logs them and retries on the next tick.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Order error: {0}")]
    Order(String),

    #[error("Unknown order reference: {0}")]
    UnknownOrder(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("API error: {0}")]
    Api(String),
}

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Fetch failed for {symbol}: {source}")]
    Fetch {
        symbol: String,
        #[source]
        source: ExchangeError,
    },

    #[error("No data available for: {0}")]
    NoData(String),

    #[error("Feed error: {0}")]
    Feed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradingError {
    #[error("Strategy error: {0}")]
    Strategy(String),

    #[error("Signal error: {0}")]
    Signal(String),

    #[error("Order execution error: {0}")]
    OrderExecution(String),

    #[error("Position management error: {0}")]
    PositionManagement(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("{0}")]
    Lifecycle(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Insufficient data for analysis: {0}")]
    InsufficientData(String),

    #[error("Indicator calculation error: {0}")]
    IndicatorCalculation(String),
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type ExchangeResult<T> = Result<T, ExchangeError>;
pub type MarketDataResult<T> = Result<T, MarketDataError>;
pub type TradingResult<T> = Result<T, TradingError>;
pub type AnalysisResult<T> = Result<T, AnalysisError>;
