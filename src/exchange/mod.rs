// src/exchange/mod.rs
pub mod client;
pub mod simulated;

pub use client::{with_timeout, BarSource, SubmitAck, VenueClient, VenueStatus};
pub use simulated::{FillMode, SimulatedVenue};
