// src/market_data/mod.rs
pub mod feed;

pub use feed::{MarketDataHandler, MarketFeed};
