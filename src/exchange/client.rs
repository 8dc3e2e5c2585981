// src/exchange/client.rs
use crate::domain::errors::{ExchangeError, ExchangeResult};
use crate::domain::models::{Order, PriceBar};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Core trading venue interface: centralized exchange, DEX contract or
/// simulator. The pipeline only depends on this contract.
#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Venue name used in logs
    fn name(&self) -> &str;

    /// Get historical bars, oldest first
    async fn get_historical_bars(
        &self,
        symbol: &str,
        interval: &str,
        count: usize,
    ) -> ExchangeResult<Vec<PriceBar>>;

    /// Dispatch an order. The acknowledgement may already carry a terminal
    /// status when the venue fills synchronously.
    async fn submit_order(&self, order: &Order) -> ExchangeResult<SubmitAck>;

    /// Query the status of a previously submitted order
    async fn poll_status(&self, venue_ref: &str) -> ExchangeResult<VenueStatus>;
}

/// Source of live bars for the market feed
#[async_trait]
pub trait BarSource: Send + Sync {
    /// Fetch the most recent bar for a symbol
    async fn latest_bar(&self, symbol: &str) -> ExchangeResult<PriceBar>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitAck {
    pub venue_ref: String,
    pub status: VenueStatus,
}

/// Order state as reported by a venue
#[derive(Debug, Clone, PartialEq)]
pub enum VenueStatus {
    /// Not yet known; re-poll later
    Pending,
    Filled,
    /// On-chain style confirmation
    Confirmed { block_number: Option<u64> },
    Failed(String),
}

impl VenueStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VenueStatus::Pending)
    }
}

/// Bound a venue call by `limit`, mapping expiry to `ExchangeError::Timeout`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> ExchangeResult<T>
where
    F: Future<Output = ExchangeResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ExchangeError::Timeout(limit.as_millis() as u64)),
    }
}
