//! Event Source Adapter
//!
//! [`StatsEventListener`] is the entry point for the game-side event source:
//! joins reconcile identities, deaths update counters. All handlers are
//! fire-and-forget.
//!
//! [`run_feed`] drives a listener from newline-delimited JSON, one
//! [`PvpEvent`] per line:
//!
//! ```text
//! {"type":"join","name":"alice","stable_id":"0190b3c4-..."}
//! {"type":"death","victim":{"name":"bob","stable_id":"..."},"killer":{"name":"alice","stable_id":"..."}}
//! {"type":"placeholder","player":"alice","identifier":"kdr"}
//! ```
//!
//! Placeholder queries are answered on the output as one JSON object per line.
//! [`serve`] wraps the feed with a shutdown signal and a graceful drain.

use std::future::Future;

use pvpstats_core::StableId;
use pvpstats_storage::StatsRepository;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ServiceResult;
use crate::orchestrator::{Participant, StatsOrchestrator};
use crate::placeholder::PlaceholderResolver;

/// One line of the event feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PvpEvent {
    /// A player was observed under a display name.
    Join { name: String, stable_id: StableId },
    /// A player died, optionally at the hands of another.
    Death {
        victim: Participant,
        #[serde(default)]
        killer: Option<Participant>,
    },
    /// Resolve a placeholder and write the answer to the output.
    Placeholder { player: String, identifier: String },
}

/// Answer to a [`PvpEvent::Placeholder`] query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderReply {
    pub player: String,
    pub identifier: String,
    /// `None` when the identifier is not a stats placeholder.
    pub value: Option<String>,
}

/// Feeds game events into a [`StatsOrchestrator`].
pub struct StatsEventListener<R: StatsRepository> {
    stats: StatsOrchestrator<R>,
}

impl<R: StatsRepository> StatsEventListener<R> {
    pub fn new(stats: StatsOrchestrator<R>) -> Self {
        Self { stats }
    }

    pub fn on_identity_observed(&self, name: &str, id: StableId) {
        tracing::debug!(name, %id, "Identity observed");
        self.stats.ensure_identity(name, id);
    }

    /// Record a death by display names only.
    pub fn on_death_occurred(&self, victim: &str, killer: Option<&str>) {
        tracing::debug!(victim, killer, "Death occurred");
        self.stats.record_kill_and_death(killer, victim);
    }

    /// Record a death, reconciling both participants' identities first.
    pub fn on_player_death(&self, victim: &Participant, killer: Option<&Participant>) {
        tracing::debug!(
            victim = %victim.name,
            killer = killer.map(|k| k.name.as_str()),
            "Player death"
        );
        self.stats.record_player_death(victim, killer);
    }

    pub fn orchestrator(&self) -> &StatsOrchestrator<R> {
        &self.stats
    }
}

/// Read events from `input` until EOF, dispatching each one.
///
/// Blank lines are skipped and malformed lines are logged and skipped.
/// Returns the number of events handled.
pub async fn run_feed<R, I, O>(
    input: I,
    mut output: O,
    listener: &StatsEventListener<R>,
    placeholders: &PlaceholderResolver<R>,
) -> ServiceResult<u64>
where
    R: StatsRepository,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut handled = 0u64;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: PvpEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, line, "Skipping malformed event");
                continue;
            }
        };

        match event {
            PvpEvent::Join { name, stable_id } => {
                listener.on_identity_observed(&name, stable_id);
            }
            PvpEvent::Death { victim, killer } => {
                listener.on_player_death(&victim, killer.as_ref());
            }
            PvpEvent::Placeholder { player, identifier } => {
                let value = placeholders.resolve(&player, &identifier).await;
                let reply = PlaceholderReply {
                    player,
                    identifier,
                    value,
                };
                let mut encoded = serde_json::to_vec(&reply)?;
                encoded.push(b'\n');
                output.write_all(&encoded).await?;
                output.flush().await?;
            }
        }
        handled += 1;
    }

    tracing::info!(handled, "Event feed reached end of input");
    Ok(handled)
}

/// Run the feed until EOF or `shutdown` completes, then shut the orchestrator
/// down.
///
/// Jobs already queued are drained before this returns, also when the feed
/// itself failed. The feed's error, if any, is returned afterwards.
pub async fn serve<R, I, O, S>(
    input: I,
    output: O,
    listener: &StatsEventListener<R>,
    placeholders: &PlaceholderResolver<R>,
    shutdown: S,
) -> ServiceResult<()>
where
    R: StatsRepository,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let fed = tokio::select! {
        result = run_feed(input, output, listener, placeholders) => result.map(|_| ()),
        _ = shutdown => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    };
    if let Err(e) = &fed {
        tracing::error!(error = %e, "Event feed failed");
    }

    listener.orchestrator().shutdown().await;
    fed
}
