//! Service Error Types
//!
//! Errors raised while bootstrapping the service: configuration, pool and
//! schema creation, tracing setup, and the event feed's IO. Runtime stats
//! operations never surface errors past the orchestrator; they use
//! [`pvpstats_core::StatsError`] internally and degrade to safe defaults.

use pvpstats_core::{ConfigError, StatsError};
use thiserror::Error;

/// Bootstrap and feed errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn database_error(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    pub fn pool_error(message: impl Into<String>) -> Self {
        Self::Pool(message.into())
    }
}

impl From<ConfigError> for ServiceError {
    fn from(err: ConfigError) -> Self {
        Self::Stats(StatsError::Config(err))
    }
}

impl From<tokio_postgres::Error> for ServiceError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for ServiceError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

/// Result type alias for service bootstrap.
pub type ServiceResult<T> = Result<T, ServiceError>;
