//! Rating engine configuration
//!
//! Configuration is layered with the `config` crate: built-in defaults,
//! then optional `config/default` and `config/{RUN_MODE}` files, then
//! `APOLO__*` environment variables.

use crate::error::BillingError;
use crate::utils::Rounding;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use validator::Validate;

/// Main configuration
#[derive(Debug, Deserialize, Clone, Validate, Default)]
pub struct RatingConfig {
    #[validate(nested)]
    #[serde(default)]
    pub general: GeneralConfig,

    #[validate(nested)]
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Settings shared by rating and event cost computations
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct GeneralConfig {
    /// Decimal places applied by global rounding
    #[validate(range(min = 0, max = 28))]
    #[serde(default = "default_rounding_decimals")]
    pub rounding_decimals: u32,

    /// Timezone name used when parsing expiration strings
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Maximum wait on a per-account guard, 0 waits forever
    #[serde(default)]
    pub locking_timeout_ms: u64,
}

fn default_rounding_decimals() -> u32 {
    5
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            rounding_decimals: default_rounding_decimals(),
            default_timezone: default_timezone(),
            locking_timeout_ms: 0,
        }
    }
}

/// Action scheduler settings
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct SchedulerConfig {
    /// Buffer size of success/failure report channels
    #[validate(range(min = 1))]
    #[serde(default = "default_report_capacity")]
    pub report_channel_capacity: usize,

    /// TTL for resolved action lists held in the cache
    #[serde(default = "default_actions_ttl")]
    pub actions_cache_ttl_secs: u64,
}

fn default_report_capacity() -> usize {
    64
}

fn default_actions_ttl() -> u64 {
    300
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            report_channel_capacity: default_report_capacity(),
            actions_cache_ttl_secs: default_actions_ttl(),
        }
    }
}

impl RatingConfig {
    /// Load configuration from environment and optional config files
    pub fn load() -> Result<Self, BillingError> {
        dotenvy::dotenv().ok();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("APOLO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: RatingConfig = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Global rounding at the configured `general.rounding_decimals`
    pub fn rounding(&self) -> Rounding {
        Rounding::new(self.general.rounding_decimals)
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, BillingError> {
        let config = Self::builder()?
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("APOLO").separator("__"))
            .build()?;

        let cfg: RatingConfig = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn builder() -> Result<config::builder::ConfigBuilder<config::builder::DefaultState>, ConfigError>
    {
        Config::builder()
            .set_default("general.rounding_decimals", 5)?
            .set_default("general.default_timezone", "UTC")?
            .set_default("general.locking_timeout_ms", 0)?
            .set_default("scheduler.report_channel_capacity", 64)?
            .set_default("scheduler.actions_cache_ttl_secs", 300)
    }
}
