// src/main.rs
use auto_trade_pipeline::config::Config;
use auto_trade_pipeline::domain::errors::{AppError, AppResult};
use auto_trade_pipeline::exchange::{BarSource, FillMode, SimulatedVenue, VenueClient};
use auto_trade_pipeline::TradingBot;

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tokio::signal::ctrl_c;

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = match env::var("CONFIG_FILE") {
        Ok(path) => Config::from_file(path)?,
        Err(_) => Config::from_env()?,
    };

    // Initialize logging
    config.init_logging()?;

    log::info!("Starting auto_trade_pipeline v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using {} venue", config.venue.name);

    let venue = create_venue(&config)?;
    let network_venues = create_network_venues(&config);

    let bars: Arc<dyn BarSource> = venue.clone();
    let venue: Arc<dyn VenueClient> = venue;
    let bot = TradingBot::new(config, venue, bars, network_venues)?;
    bot.start().await?;

    // Wait for shutdown signal
    log::info!("Bot is running. Press Ctrl+C to stop.");
    if let Err(e) = ctrl_c().await {
        log::error!("Failed to listen for control-c event: {}", e);
    }

    bot.stop().await;
    log::info!("Goodbye!");
    Ok(())
}

fn fill_mode(polls: u32) -> FillMode {
    if polls == 0 {
        FillMode::OnSubmit
    } else {
        FillMode::AfterPolls(polls)
    }
}

/// Create the trading venue based on configuration
fn create_venue(config: &Config) -> AppResult<Arc<SimulatedVenue>> {
    match config.venue.name.to_lowercase().as_str() {
        "simulated" => Ok(Arc::new(
            SimulatedVenue::new(&config.venue.name, config.venue.seed_price)
                .with_fill_mode(fill_mode(config.venue.fill_after_polls)),
        )),
        _ => Err(AppError::Config(format!(
            "Unsupported venue: {}",
            config.venue.name
        ))),
    }
}

/// One simulated chain per enabled network
fn create_network_venues(config: &Config) -> HashMap<String, Arc<dyn VenueClient>> {
    config
        .enabled_networks()
        .into_iter()
        .map(|network| {
            let venue = SimulatedVenue::new(&network.name, config.venue.seed_price)
                .with_fill_mode(fill_mode(network.confirmation_polls))
                .with_on_chain_confirmation();
            (network.name.clone(), Arc::new(venue) as Arc<dyn VenueClient>)
        })
        .collect()
}
