//! PvP Stats Service
//!
//! The stats orchestration layer and everything around it:
//!
//! - [`orchestrator`]: cache-fronted async reads, fire-and-forget writes and
//!   identity reconciliation over any [`pvpstats_storage::StatsRepository`].
//! - [`workers`]: the fixed-size background pool all store calls run on.
//! - [`db`]: the PostgreSQL repository, pool configuration and schema.
//! - [`placeholder`]: text-template rendering of stats with bounded waits.
//! - [`events`]: the event listener and the JSON-lines event feed.
//! - [`config`], [`telemetry`], [`error`]: bootstrap concerns for the binary.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod future;
pub mod orchestrator;
pub mod placeholder;
pub mod telemetry;
pub mod workers;

pub use config::{LogFormat, ServiceConfig};
pub use db::{ensure_schema, DbConfig, PgStatsRepository};
pub use error::{ServiceError, ServiceResult};
pub use events::{run_feed, serve, PlaceholderReply, PvpEvent, StatsEventListener};
pub use future::StatsFuture;
pub use orchestrator::{Participant, StatsOrchestrator};
pub use placeholder::{PlaceholderResolver, PlaceholderWaits};
pub use workers::WorkerPool;
