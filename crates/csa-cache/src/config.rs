//! Configuration loading and validation for the cache service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any variable is present but invalid.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::refresh::RefreshSchedule;

/// Validated cache service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Delay (milliseconds) before any cache is first populated.
    #[serde(default = "default_startup_delay")]
    pub cache_startup_delay_ms: u64,

    /// Refresh period (milliseconds) of the service catalog cache.
    #[serde(default = "default_services_period")]
    pub services_cache_period_ms: u64,

    /// Refresh period (milliseconds) of the directory cache.
    #[serde(default = "default_provider_period")]
    pub provider_cache_period_ms: u64,

    /// Refresh period (milliseconds) of the CRM cache.
    #[serde(default = "default_crm_period")]
    pub crm_cache_period_ms: u64,

    /// Pause (milliseconds) between directory calls when indexing service usage.
    #[serde(default)]
    pub services_call_delay_ms: u64,

    /// Whether to query the CRM at all. When off, a no-op CRM is used.
    #[serde(default)]
    pub crm_enabled: bool,

    /// Directory holding the JSON collaborator fixtures.
    #[serde(default = "default_fixtures_dir")]
    pub fixtures_dir: String,

    /// How often (seconds) to log the cache sizes.
    #[serde(default = "default_status_log_interval")]
    pub status_log_interval_secs: u64,

    /// OTLP endpoint for span export. Logs only when absent.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_startup_delay() -> u64 {
    0
}
fn default_services_period() -> u64 {
    300_000
}
fn default_provider_period() -> u64 {
    300_000
}
fn default_crm_period() -> u64 {
    900_000
}
fn default_fixtures_dir() -> String {
    "fixtures".into()
}
fn default_status_log_interval() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if self.services_cache_period_ms == 0 {
            anyhow::bail!("SERVICES_CACHE_PERIOD_MS must be > 0");
        }
        if self.provider_cache_period_ms == 0 {
            anyhow::bail!("PROVIDER_CACHE_PERIOD_MS must be > 0");
        }
        if self.crm_cache_period_ms == 0 {
            anyhow::bail!("CRM_CACHE_PERIOD_MS must be > 0");
        }
        if self.status_log_interval_secs == 0 {
            anyhow::bail!("STATUS_LOG_INTERVAL_SECS must be > 0");
        }
        if self.fixtures_dir.trim().is_empty() {
            anyhow::bail!("FIXTURES_DIR must not be empty");
        }
        Ok(())
    }

    fn schedule(&self, period_ms: u64) -> RefreshSchedule {
        RefreshSchedule::new(
            Duration::from_millis(self.cache_startup_delay_ms),
            Duration::from_millis(period_ms),
        )
    }

    pub fn services_schedule(&self) -> RefreshSchedule {
        self.schedule(self.services_cache_period_ms)
    }

    pub fn provider_schedule(&self) -> RefreshSchedule {
        self.schedule(self.provider_cache_period_ms)
    }

    pub fn crm_schedule(&self) -> RefreshSchedule {
        self.schedule(self.crm_cache_period_ms)
    }

    pub fn services_call_delay(&self) -> Duration {
        Duration::from_millis(self.services_call_delay_ms)
    }
}
