//! Placeholder Resolver
//!
//! Renders a player's stats as short strings for text templates. Every lookup
//! waits a bounded time and falls back to a default, so a slow store produces
//! `"0"` instead of stalling the caller.
//!
//! Supported identifiers (case-insensitive):
//!
//! | identifier                  | value                            | default |
//! |-----------------------------|----------------------------------|---------|
//! | `kills`, `deaths`, `killstreak` | counter                      | `0`     |
//! | `kdr`                       | two decimals, e.g. `1.50`        | `0`     |
//! | `topkills_personal_rank`    | 1-based rank                     | `0`     |
//! | `topkills_personal_kills`   | kills                            | `0`     |
//! | `topkills_<pos>_name`       | name at leaderboard position     | empty   |
//! | `topkills_<pos>_kills`      | kills at leaderboard position    | `0`     |
//!
//! Unknown identifiers resolve to `None`.

use std::time::Duration;

use pvpstats_storage::StatsRepository;

use crate::orchestrator::StatsOrchestrator;

/// Smallest leaderboard page requested for a position lookup.
const MIN_POSITION_FETCH: usize = 10;

/// Maximum time each lookup waits for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderWaits {
    pub stats: Duration,
    pub rank: Duration,
    pub leaderboard: Duration,
}

impl Default for PlaceholderWaits {
    fn default() -> Self {
        Self {
            stats: Duration::from_millis(150),
            rank: Duration::from_millis(200),
            leaderboard: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    Kills,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
    Kills,
    Deaths,
    Killstreak,
    Kdr,
    PersonalRank,
    PersonalKills,
    Position(usize, Field),
    /// `topkills_<pos>_*` with a non-numeric or non-positive position.
    BadPosition,
}

impl Placeholder {
    fn parse(identifier: &str) -> Option<Self> {
        let id = identifier.to_ascii_lowercase();
        let placeholder = match id.as_str() {
            "kills" => Self::Kills,
            "deaths" => Self::Deaths,
            "killstreak" => Self::Killstreak,
            "kdr" => Self::Kdr,
            "topkills_personal_rank" => Self::PersonalRank,
            "topkills_personal_kills" => Self::PersonalKills,
            other => return Self::parse_position(other),
        };
        Some(placeholder)
    }

    fn parse_position(id: &str) -> Option<Self> {
        let mut parts = id.strip_prefix("topkills_")?.split('_');
        let (pos, field) = (parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }

        let pos = match pos.parse::<i32>() {
            Ok(pos) if pos > 0 => pos,
            _ => return Some(Self::BadPosition),
        };
        let field = match field {
            "name" => Field::Name,
            "kills" => Field::Kills,
            _ => return None,
        };
        Some(Self::Position(usize::try_from(pos).ok()?, field))
    }
}

/// Resolves placeholder identifiers against a [`StatsOrchestrator`].
pub struct PlaceholderResolver<R: StatsRepository> {
    stats: StatsOrchestrator<R>,
    waits: PlaceholderWaits,
}

impl<R: StatsRepository> PlaceholderResolver<R> {
    pub fn new(stats: StatsOrchestrator<R>) -> Self {
        Self::with_waits(stats, PlaceholderWaits::default())
    }

    pub fn with_waits(stats: StatsOrchestrator<R>, waits: PlaceholderWaits) -> Self {
        Self { stats, waits }
    }

    /// Resolve `identifier` for `player`, or `None` if it is not ours.
    pub async fn resolve(&self, player: &str, identifier: &str) -> Option<String> {
        let placeholder = Placeholder::parse(identifier)?;
        let value = match placeholder {
            Placeholder::Kills | Placeholder::PersonalKills => {
                self.stat(player, |s| s.kills.to_string()).await
            }
            Placeholder::Deaths => self.stat(player, |s| s.deaths.to_string()).await,
            Placeholder::Killstreak => self.stat(player, |s| s.killstreak.to_string()).await,
            Placeholder::Kdr => self.stat(player, |s| format!("{:.2}", s.kdr())).await,
            Placeholder::PersonalRank => self
                .stats
                .get_rank(player)
                .resolve_within(self.waits.rank)
                .await
                .map(|rank| rank.to_string())
                .unwrap_or_else(zero),
            Placeholder::Position(pos, field) => self.position(pos, field).await,
            Placeholder::BadPosition => zero(),
        };
        Some(value)
    }

    async fn stat<F>(&self, player: &str, render: F) -> String
    where
        F: FnOnce(&pvpstats_core::StatsRecord) -> String,
    {
        self.stats
            .get_stats(player)
            .resolve_within(self.waits.stats)
            .await
            .as_ref()
            .map(render)
            .unwrap_or_else(zero)
    }

    async fn position(&self, pos: usize, field: Field) -> String {
        let entries = self
            .stats
            .get_leaderboard(pos.max(MIN_POSITION_FETCH))
            .resolve_within(self.waits.leaderboard)
            .await;
        match (entries.get(pos - 1), field) {
            (Some(entry), Field::Name) => entry.display_name.clone(),
            (Some(entry), Field::Kills) => entry.kills.to_string(),
            (None, Field::Name) => String::new(),
            (None, Field::Kills) => zero(),
        }
    }
}

fn zero() -> String {
    "0".to_string()
}
