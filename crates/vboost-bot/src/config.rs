//! Application configuration.

use crate::direction::DirectionPolicy;
use crate::error::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vboost_executor::ExecutorConfig;
use vboost_gateway::KeySource;

/// Venue environment. Selects endpoint and chain id defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Prod,
    Testnet,
}

/// Run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Open and close every round back to back.
    #[default]
    Instant,
    /// Open rounds up to a margin limit, hold, then close them all.
    BuildHoldClose,
}

/// Endpoint overrides. Unset fields use the environment's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default)]
    pub trades_url: Option<String>,
    #[serde(default)]
    pub market_data_url: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    /// Private order stream.
    #[serde(default)]
    pub trades_ws_url: Option<String>,
    /// Public ticker stream.
    #[serde(default)]
    pub market_data_ws_url: Option<String>,
    #[serde(default)]
    pub chain_id: Option<u64>,
}

/// Fully resolved endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub trades_url: String,
    pub market_data_url: String,
    pub origin: String,
    pub trades_ws_url: String,
    pub market_data_ws_url: String,
    pub chain_id: u64,
}

impl Endpoints {
    pub fn defaults(env: Environment) -> Self {
        let (host, origin, chain_id) = match env {
            Environment::Prod => ("grvt.io", "https://grvt.io", 325),
            Environment::Testnet => ("testnet.grvt.io", "https://testnet.grvt.io", 326),
        };
        Self {
            trades_url: format!("https://trades.{host}"),
            market_data_url: format!("https://market-data.{host}"),
            origin: origin.to_string(),
            trades_ws_url: format!("wss://trades.{host}/ws/full"),
            market_data_ws_url: format!("wss://market-data.{host}/ws/full"),
            chain_id,
        }
    }
}

impl EndpointsConfig {
    pub fn resolve(&self, env: Environment) -> Endpoints {
        let d = Endpoints::defaults(env);
        Endpoints {
            trades_url: self.trades_url.clone().unwrap_or(d.trades_url),
            market_data_url: self.market_data_url.clone().unwrap_or(d.market_data_url),
            origin: self.origin.clone().unwrap_or(d.origin),
            trades_ws_url: self.trades_ws_url.clone().unwrap_or(d.trades_ws_url),
            market_data_ws_url: self.market_data_ws_url.clone().unwrap_or(d.market_data_ws_url),
            chain_id: self.chain_id.unwrap_or(d.chain_id),
        }
    }
}

/// Where a secret is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretConfig {
    /// Environment variable name.
    Env(String),
    /// File path (recommend 0600 permissions).
    File(PathBuf),
}

impl From<&SecretConfig> for KeySource {
    fn from(cfg: &SecretConfig) -> Self {
        match cfg {
            SecretConfig::Env(var_name) => KeySource::EnvVar {
                var_name: var_name.clone(),
            },
            SecretConfig::File(path) => KeySource::File { path: path.clone() },
        }
    }
}

/// One of the two trading accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    /// Sent as `X-Grvt-Account-Id`.
    pub main_account_id: String,
    /// Numeric sub-account id orders are signed for.
    pub sub_account_id: String,
    /// Session cookie (`gravity=`).
    pub session_token: SecretConfig,
    /// Session signing key (hex).
    pub signing_key: SecretConfig,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    /// Account 1 then account 2.
    pub accounts: Vec<AccountConfig>,
    pub instrument: String,
    /// Base size per order. Exactly one of `size` and `notional_usd`.
    #[serde(default)]
    pub size: Option<Decimal>,
    /// USD notional per order, converted at the current mid.
    #[serde(default)]
    pub notional_usd: Option<Decimal>,
    #[serde(default)]
    pub mode: RunMode,
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    /// Instant mode: wait between open and close (seconds).
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,
    /// Build/hold/close mode: hold time (minutes).
    #[serde(default = "default_hold_minutes")]
    pub hold_minutes: u64,
    /// Build/hold/close mode: stop opening once either account's margin
    /// ratio exceeds this.
    #[serde(default = "default_max_margin_ratio")]
    pub max_margin_ratio: Decimal,
    #[serde(default)]
    pub direction: DirectionPolicy,
    /// Total attempts per open or close (instant mode).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Stop the run after a round that needed a recovery flatten.
    #[serde(default)]
    pub halt_on_external_fill: bool,
    /// Judge stability from the public ticker stream.
    #[serde(default = "default_use_price_feed")]
    pub use_price_feed: bool,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

fn default_rounds() -> u32 {
    10
}

fn default_delay_secs() -> f64 {
    1.0
}

fn default_hold_minutes() -> u64 {
    30
}

fn default_max_margin_ratio() -> Decimal {
    Decimal::new(15, 2)
}

fn default_max_retries() -> u32 {
    3
}

fn default_use_price_feed() -> bool {
    true
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate().map_err(AppError::Config)?;
        Ok(config)
    }

    pub fn endpoints(&self) -> Endpoints {
        self.endpoints.resolve(self.environment)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.accounts.len() != 2 {
            return Err(format!(
                "exactly two accounts required, got {}",
                self.accounts.len()
            ));
        }
        if self.accounts[0].sub_account_id == self.accounts[1].sub_account_id {
            return Err("accounts must use different sub-accounts".to_string());
        }
        for account in &self.accounts {
            if account.sub_account_id.parse::<u64>().is_err() {
                return Err(format!(
                    "{}: sub_account_id must be numeric, got {:?}",
                    account.name, account.sub_account_id
                ));
            }
        }
        if self.instrument.is_empty() {
            return Err("instrument must be set".to_string());
        }
        match (self.size, self.notional_usd) {
            (Some(_), Some(_)) => return Err("set either size or notional_usd, not both".to_string()),
            (None, None) => return Err("one of size or notional_usd is required".to_string()),
            (Some(v), None) | (None, Some(v)) if v <= Decimal::ZERO => {
                return Err(format!("order size must be positive, got {v}"));
            }
            _ => {}
        }
        if self.rounds == 0 {
            return Err("rounds must be at least 1".to_string());
        }
        if !(self.delay_secs.is_finite() && self.delay_secs >= 0.0) {
            return Err(format!("delay_secs must be >= 0, got {}", self.delay_secs));
        }
        if self.max_margin_ratio <= Decimal::ZERO {
            return Err("max_margin_ratio must be positive".to_string());
        }
        if self.max_retries == 0 {
            return Err("max_retries must be at least 1".to_string());
        }
        self.executor.validate()
    }
}
