//! Deployment configuration
//!
//! Loaded from environment variables, with `.env` support for local runs.
//!
//! | variable                    | default          |
//! |-----------------------------|------------------|
//! | `MARKET_ENV`                | `development`    |
//! | `MARKET_DB_PATH`            | `freight-market.db` |
//! | `MARKET_CURRENCY`           | `eur`            |
//! | `MARKET_SUBSCRIPTION_PRICE` | `4.99`           |
//! | `MARKET_TRANSITION_POLICY`  | `permissive`     |
//! | `RUST_LOG`                  | `info`           |
use crate::billing::BillingSettings;
use crate::negotiation::TransitionPolicy;
use crate::types::Amount;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid amount for {name}: '{value}'")]
    InvalidAmount { name: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{s}'. Expected: dev, staging, or prod"
            ))),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub environment: Environment,

    /// Directory of the sled database
    pub db_path: PathBuf,

    /// Lower-case ISO currency code used for checkout
    pub currency: String,

    /// Price of one month of transporter subscription
    pub subscription_price: Amount,

    pub transition_policy: TransitionPolicy,

    /// Log filter directive (RUST_LOG)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let billing = BillingSettings::default();
        Self {
            environment: Environment::Development,
            db_path: PathBuf::from("freight-market.db"),
            currency: billing.currency,
            subscription_price: billing.subscription_price,
            transition_policy: TransitionPolicy::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let environment = lookup("MARKET_ENV")
            .map(|s| Environment::parse(&s))
            .transpose()?
            .unwrap_or(defaults.environment);

        let db_path = lookup("MARKET_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let currency = lookup("MARKET_CURRENCY")
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .unwrap_or(defaults.currency);

        let subscription_price = match lookup("MARKET_SUBSCRIPTION_PRICE") {
            Some(raw) => parse_price("MARKET_SUBSCRIPTION_PRICE", &raw)?,
            None => defaults.subscription_price,
        };

        let transition_policy = lookup("MARKET_TRANSITION_POLICY")
            .map(|s| s.parse::<TransitionPolicy>().map_err(ConfigError::InvalidValue))
            .transpose()?
            .unwrap_or(defaults.transition_policy);

        let log_level = lookup("RUST_LOG").unwrap_or(defaults.log_level);

        Ok(Self {
            environment,
            db_path,
            currency,
            subscription_price,
            transition_policy,
            log_level,
        })
    }

    pub fn billing(&self) -> BillingSettings {
        BillingSettings {
            currency: self.currency.clone(),
            subscription_price: self.subscription_price,
        }
    }
}

fn parse_price(name: &str, raw: &str) -> Result<Amount, ConfigError> {
    raw.trim()
        .parse::<Amount>()
        .ok()
        .filter(|a| a.is_positive())
        .ok_or_else(|| ConfigError::InvalidAmount {
            name: name.to_string(),
            value: raw.to_string(),
        })
}
