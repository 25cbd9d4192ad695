//! Tracing subscriber setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;
use crate::error::{ServiceError, ServiceResult};

const DEFAULT_FILTER: &str = "pvpstats_service=debug,pvpstats_storage=info,info";

/// Install the global tracing subscriber.
///
/// Filtering follows `RUST_LOG` when set. Call once at startup, before any
/// other tracing occurs.
pub fn init_tracing(format: LogFormat) -> ServiceResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| ServiceError::Telemetry(format!("Failed to set subscriber: {}", e)))
}
