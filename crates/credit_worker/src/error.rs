//! Worker errors

use thiserror::Error;

use core_kernel::TemporalError;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot compute next run of {task}: {source}")]
    Schedule {
        task: &'static str,
        #[source]
        source: TemporalError,
    },
}
