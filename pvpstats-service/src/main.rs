//! PvP Stats Event Feed Entry Point
//!
//! Bootstraps logging, configuration, the connection pool and schema, then
//! feeds newline-delimited JSON events from stdin into the orchestrator until
//! EOF or Ctrl-C.

use std::sync::Arc;

use pvpstats_service::telemetry::init_tracing;
use pvpstats_service::{
    ensure_schema, serve, DbConfig, PgStatsRepository, PlaceholderResolver, ServiceConfig,
    ServiceResult, StatsEventListener, StatsOrchestrator,
};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> ServiceResult<()> {
    let config = ServiceConfig::from_env()?;
    init_tracing(config.log_format)?;

    let db_config = DbConfig::from_env()?;
    let pool = db_config.create_pool()?;
    ensure_schema(&pool).await?;

    let repo = Arc::new(PgStatsRepository::new(pool));
    let orchestrator = StatsOrchestrator::new(repo, config.stats.clone())?;
    let listener = StatsEventListener::new(orchestrator.clone());
    let placeholders = PlaceholderResolver::new(orchestrator);

    tracing::info!(
        db_host = %db_config.host,
        db_name = %db_config.dbname,
        "Reading PvP events from stdin"
    );

    let input = BufReader::new(tokio::io::stdin());
    let output = tokio::io::stdout();
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };
    serve(input, output, &listener, &placeholders, ctrl_c).await
}
