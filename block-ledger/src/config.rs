//! Configuration for the ledger

use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name (appears in logs)
    pub service_name: String,

    /// Block and transaction rules
    pub ledger: LedgerConfig,

    /// Log output
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "block-ledger".to_string(),
            ledger: LedgerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Block and transaction rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Transactions per committed block
    pub block_capacity: usize,

    /// Minimum fee per transaction
    pub min_fee: i64,

    /// Maximum note length (characters)
    pub max_note_len: usize,

    /// Address of the fee sink that holds the whole supply at genesis
    pub master_address: String,

    /// Fixed money supply seeded into the master account
    pub total_supply: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            block_capacity: 10,
            min_fee: 10,
            max_note_len: 1024,
            master_address: "master".to_string(),
            total_supply: i64::MAX,
        }
    }
}

impl LedgerConfig {
    /// Reject settings the ledger cannot operate with
    pub fn validate(&self) -> crate::Result<()> {
        if self.block_capacity == 0 {
            return Err(crate::Error::Config(
                "block_capacity must be at least 1".to_string(),
            ));
        }
        if self.min_fee < 0 {
            return Err(crate::Error::Config(
                "min_fee must be non-negative".to_string(),
            ));
        }
        if self.total_supply <= 0 {
            return Err(crate::Error::Config(
                "total_supply must be positive".to_string(),
            ));
        }
        if self.master_address.trim().is_empty() {
            return Err(crate::Error::Config(
                "master_address must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML document
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.ledger.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(capacity) = std::env::var("LEDGER_BLOCK_CAPACITY") {
            config.ledger.block_capacity = parse_env("LEDGER_BLOCK_CAPACITY", &capacity)?;
        }

        if let Ok(fee) = std::env::var("LEDGER_MIN_FEE") {
            config.ledger.min_fee = parse_env("LEDGER_MIN_FEE", &fee)?;
        }

        if let Ok(len) = std::env::var("LEDGER_MAX_NOTE_LEN") {
            config.ledger.max_note_len = parse_env("LEDGER_MAX_NOTE_LEN", &len)?;
        }

        if let Ok(format) = std::env::var("LEDGER_LOG_FORMAT") {
            config.logging.json = format.eq_ignore_ascii_case("json");
        }

        config.ledger.validate()?;
        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| crate::Error::Config(format!("{} is not a valid number: {}", name, value)))
}
