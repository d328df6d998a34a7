//! Worker configuration
//!
//! Loaded from an optional `config/worker` file, then overridden by
//! `WORKER_*` environment variables using `__` between nested keys, e.g.
//! `WORKER_DATABASE__URL` or `WORKER_ENGINE__MAX_EMI_RETRIES`.

use chrono::{NaiveTime, Weekday};
use serde::Deserialize;

use core_kernel::Timezone;
use credit_engine::EngineConfig;
use domain_credit::GovernmentApiConfig;
use infra_db::DatabaseConfig;

use crate::error::WorkerError;

/// Top-level worker configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub database: DatabaseConfig,
    /// Government identity and credit-bureau sandbox
    pub provider: GovernmentApiConfig,
    pub engine: EngineConfig,
    pub schedule: ScheduleConfig,
}

/// Bind address of the health endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// When each sweep runs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Zone the wall-clock times below are read in
    pub timezone: Timezone,
    pub offer_expiry_interval_secs: u64,
    pub emi_reminder_at: NaiveTime,
    pub npa_classification_at: NaiveTime,
    pub score_recalculation_day: Weekday,
    pub score_recalculation_at: NaiveTime,
}

fn at_hour(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: Timezone::default(),
            offer_expiry_interval_secs: 15 * 60,
            emi_reminder_at: at_hour(9),
            npa_classification_at: at_hour(1),
            score_recalculation_day: Weekday::Sun,
            score_recalculation_at: at_hour(2),
        }
    }
}

impl WorkerConfig {
    /// Loads configuration from `config/worker.*` (optional) and the
    /// environment
    pub fn load() -> Result<Self, WorkerError> {
        let config: WorkerConfig = config::Config::builder()
            .add_source(config::File::with_name("config/worker").required(false))
            .add_source(
                config::Environment::with_prefix("WORKER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.schedule.offer_expiry_interval_secs == 0 {
            return Err(WorkerError::InvalidConfig(
                "schedule.offer_expiry_interval_secs must be positive".into(),
            ));
        }
        if self.provider.base_url.trim().is_empty() {
            return Err(WorkerError::InvalidConfig("provider.base_url must be set".into()));
        }
        self.engine
            .validate()
            .map_err(|e| WorkerError::InvalidConfig(format!("engine: {}", e)))
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
