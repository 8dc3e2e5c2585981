// src/config.rs
use crate::domain::errors::{AppError, AppResult};
use dotenv::dotenv;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Trading pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Execution venue settings
    pub venue: VenueConfig,

    /// Traded symbols and feed cadence
    pub trading: TradingConfig,

    /// Strategy parameters
    pub strategy: StrategyConfig,

    /// Risk limits
    pub risk: RiskConfig,

    /// Networks for the mirrored on-chain execution path
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Venue name (only "simulated" ships with the crate)
    pub name: String,

    /// Upper bound for a single venue call, seconds
    pub request_timeout_secs: u64,

    /// Order status reconciliation period, seconds
    pub reconcile_interval_secs: u64,

    /// Simulated venue: polls until an order fills (0 = fill on submit)
    pub fill_after_polls: u32,

    /// Simulated venue: starting price for the random walk
    pub seed_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingConfig {
    pub pairs: Vec<PairConfig>,

    /// Bar interval label passed to the venue (e.g. "1m")
    pub interval: String,

    /// Feed sampling period per symbol, milliseconds
    pub feed_interval_ms: u64,

    /// Position summary log period, seconds
    pub heartbeat_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairConfig {
    pub symbol: String,
    pub enabled: bool,

    /// Route this pair to the on-chain path on the named network
    #[serde(default)]
    pub network: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    pub short_period: usize,
    pub long_period: usize,

    /// Extra closes kept beyond the long period
    pub history_margin: usize,

    pub quantity: QuantityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum QuantityConfig {
    Fixed { quantity: Decimal },
    PercentOfEquity { equity: Decimal, percent: Decimal },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_open_positions: usize,

    /// Largest quantity allowed per position
    pub max_position_size: Decimal,

    /// Stop loss percentage
    pub stop_loss_percent: Decimal,

    /// Take profit percentage
    pub take_profit_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub enabled: bool,

    /// Simulated chain: polls until a transaction confirms
    #[serde(default = "default_confirmation_polls")]
    pub confirmation_polls: u32,
}

fn default_confirmation_polls() -> u32 {
    2
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Log file path
    pub file_path: Option<String>,
}

/// A missing variable yields `default`; a present but unparsable one is an error
fn env_or<T: FromStr>(key: &str, default: T) -> AppResult<T> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("Invalid {}: {}", key, value))),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();
        let defaults = Config::default();

        let pairs = match env::var("TRADING_SYMBOLS") {
            Ok(symbols) => symbols
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|entry| {
                    // SYMBOL or SYMBOL@network
                    let mut parts = entry.splitn(2, '@');
                    PairConfig {
                        symbol: parts.next().unwrap_or_default().to_string(),
                        enabled: true,
                        network: parts.next().map(str::to_string),
                    }
                })
                .collect(),
            Err(_) => defaults.trading.pairs.clone(),
        };

        let confirmation_polls = env_or("NETWORK_CONFIRMATION_POLLS", default_confirmation_polls())?;
        let networks = match env::var("NETWORKS") {
            Ok(names) => names
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|name| NetworkConfig {
                    name: name.to_string(),
                    enabled: true,
                    confirmation_polls,
                })
                .collect(),
            Err(_) => defaults.networks.clone(),
        };

        let quantity = match env::var("QUANTITY_POLICY").as_deref() {
            Ok("percent_of_equity") => QuantityConfig::PercentOfEquity {
                equity: env_or("ACCOUNT_EQUITY", Decimal::new(10_000, 0))?,
                percent: env_or("ORDER_EQUITY_PERCENT", Decimal::new(1, 0))?,
            },
            _ => QuantityConfig::Fixed {
                quantity: env_or("ORDER_QUANTITY", Decimal::new(1, 1))?,
            },
        };

        let config = Config {
            venue: VenueConfig {
                name: env::var("VENUE_NAME").unwrap_or(defaults.venue.name),
                request_timeout_secs: env_or("VENUE_TIMEOUT_SECS", defaults.venue.request_timeout_secs)?,
                reconcile_interval_secs: env_or("RECONCILE_INTERVAL_SECS", defaults.venue.reconcile_interval_secs)?,
                fill_after_polls: env_or("FILL_AFTER_POLLS", defaults.venue.fill_after_polls)?,
                seed_price: env_or("SEED_PRICE", defaults.venue.seed_price)?,
            },
            trading: TradingConfig {
                pairs,
                interval: env::var("TRADING_INTERVAL").unwrap_or(defaults.trading.interval),
                feed_interval_ms: env_or("FEED_INTERVAL_MS", defaults.trading.feed_interval_ms)?,
                heartbeat_secs: env_or("HEARTBEAT_SECS", defaults.trading.heartbeat_secs)?,
            },
            strategy: StrategyConfig {
                name: env::var("STRATEGY_NAME").unwrap_or(defaults.strategy.name),
                short_period: env_or("SHORT_PERIOD", defaults.strategy.short_period)?,
                long_period: env_or("LONG_PERIOD", defaults.strategy.long_period)?,
                history_margin: env_or("HISTORY_MARGIN", defaults.strategy.history_margin)?,
                quantity,
            },
            risk: RiskConfig {
                max_open_positions: env_or("MAX_OPEN_POSITIONS", defaults.risk.max_open_positions)?,
                max_position_size: env_or("MAX_POSITION_SIZE", defaults.risk.max_position_size)?,
                stop_loss_percent: env_or("STOP_LOSS_PERCENT", defaults.risk.stop_loss_percent)?,
                take_profit_percent: env_or("TAKE_PROFIT_PERCENT", defaults.risk.take_profit_percent)?,
            },
            networks,
            logging: LoggingConfig {
                level: env::var("LOG_LEVEL").unwrap_or(defaults.logging.level),
                to_file: env_or("LOG_TO_FILE", false)?,
                file_path: env::var("LOG_FILE_PATH").ok(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let mut file = File::open(path).map_err(|e| {
            AppError::Config(format!("Failed to open config file: {}", e))
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| {
            AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|e| {
            AppError::Config(format!("Failed to write config file: {}", e))
        })?;
        Ok(())
    }

    /// Reject parameter combinations the pipeline cannot run with
    pub fn validate(&self) -> AppResult<()> {
        let fail = |msg: &str| Err(AppError::Config(msg.to_string()));

        if self.enabled_symbols().is_empty() {
            return fail("no enabled trading pairs");
        }
        if self.trading.pairs.iter().any(|p| p.symbol.trim().is_empty()) {
            return fail("trading pair with empty symbol");
        }
        if self.strategy.short_period == 0 {
            return fail("short_period must be positive");
        }
        if self.strategy.short_period >= self.strategy.long_period {
            return fail("short_period must be smaller than long_period");
        }
        if self.risk.max_open_positions == 0 {
            return fail("max_open_positions must be positive");
        }
        if self.risk.max_position_size <= Decimal::ZERO {
            return fail("max_position_size must be positive");
        }
        if self.risk.stop_loss_percent <= Decimal::ZERO || self.risk.take_profit_percent <= Decimal::ZERO {
            return fail("stop loss and take profit percentages must be positive");
        }
        if self.trading.feed_interval_ms == 0 || self.venue.reconcile_interval_secs == 0 {
            return fail("feed and reconcile intervals must be positive");
        }
        if self.venue.request_timeout_secs == 0 {
            return fail("request_timeout_secs must be positive");
        }
        match &self.strategy.quantity {
            QuantityConfig::Fixed { quantity } if *quantity <= Decimal::ZERO => {
                return fail("fixed order quantity must be positive");
            }
            QuantityConfig::PercentOfEquity { equity, percent }
                if *equity <= Decimal::ZERO || *percent <= Decimal::ZERO =>
            {
                return fail("equity and percent must be positive");
            }
            _ => {}
        }
        for pair in &self.trading.pairs {
            if let Some(network) = &pair.network {
                if !self.networks.iter().any(|n| &n.name == network) {
                    return Err(AppError::Config(format!(
                        "pair {} references unknown network {}",
                        pair.symbol, network
                    )));
                }
            }
        }
        Ok(())
    }

    /// Symbols of enabled pairs, in configuration order
    pub fn enabled_symbols(&self) -> Vec<String> {
        self.trading
            .pairs
            .iter()
            .filter(|p| p.enabled)
            .map(|p| p.symbol.clone())
            .collect()
    }

    /// Enabled networks
    pub fn enabled_networks(&self) -> Vec<&NetworkConfig> {
        self.networks.iter().filter(|n| n.enabled).collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.venue.request_timeout_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.venue.reconcile_interval_secs)
    }

    pub fn feed_interval(&self) -> Duration {
        Duration::from_millis(self.trading.feed_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.trading.heartbeat_secs.max(1))
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> AppResult<()> {
        let mut builder = env_logger::Builder::new();

        // Set log level
        let log_level = match self.logging.level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        };

        builder.filter_level(log_level);

        // Configure output
        if self.logging.to_file {
            if let Some(file_path) = &self.logging.file_path {
                let file = File::create(file_path).map_err(|e| {
                    AppError::Config(format!("Failed to create log file: {}", e))
                })?;

                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
        }

        builder.try_init().map_err(|e| {
            AppError::Config(format!("Failed to initialize logger: {}", e))
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            venue: VenueConfig {
                name: "simulated".to_string(),
                request_timeout_secs: 10,
                reconcile_interval_secs: 5,
                fill_after_polls: 0,
                seed_price: Decimal::new(100, 0),
            },
            trading: TradingConfig {
                pairs: vec![PairConfig {
                    symbol: "BTCUSDT".to_string(),
                    enabled: true,
                    network: None,
                }],
                interval: "1m".to_string(),
                feed_interval_ms: 60_000,
                heartbeat_secs: 60,
            },
            strategy: StrategyConfig {
                name: "moving_average_crossover".to_string(),
                short_period: 5,
                long_period: 20,
                history_margin: 10,
                quantity: QuantityConfig::Fixed {
                    quantity: Decimal::new(1, 1),
                },
            },
            risk: RiskConfig {
                max_open_positions: 5,
                max_position_size: Decimal::new(1, 0),
                stop_loss_percent: Decimal::new(5, 0),
                take_profit_percent: Decimal::new(10, 0),
            },
            networks: Vec::new(),
            logging: LoggingConfig {
                level: "info".to_string(),
                to_file: false,
                file_path: None,
            },
        }
    }
}
