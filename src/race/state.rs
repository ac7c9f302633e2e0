//! Core race state types.
//!
//! [`RaceState`] applies at two levels: once globally for the whole
//! race cycle, and once per team. The invariant connecting the two is
//! enforced by the engine: a team may only be `Running` or
//! `Completed` while the global state is.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::arena::ArenaRef;

/// Newtype wrapper for player identifiers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

impl PlayerId {
    /// Generates a fresh random player id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl From<Uuid> for PlayerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Race lifecycle state, used both globally and per team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceState {
    /// Waiting for the race to start
    #[default]
    Waiting,
    /// Race in progress
    Running,
    /// Finished (per team: crossed the line; globally: every team has)
    Completed,
}

// An unrecognized persisted value degrades to `Waiting` rather than
// refusing to load the whole document.
impl<'de> Deserialize<'de> for RaceState {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "running" => Self::Running,
            "completed" => Self::Completed,
            _ => Self::Waiting,
        })
    }
}

impl fmt::Display for RaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Completed => "completed",
        };
        write!(f, "{name}")
    }
}

/// A team participating in the race.
///
/// The struct doubles as the persisted team document; the roster is
/// responsible for keeping the durable copy in sync with this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Team {
    /// Unique, immutable team name
    name: String,
    /// Member player ids (unordered, no duplicates)
    #[serde(default)]
    members: BTreeSet<PlayerId>,
    /// Provisioned arena, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arena: Option<ArenaRef>,
    /// Per-team race state
    #[serde(default)]
    pub state: RaceState,
    /// Completion time in milliseconds; set iff `state == Completed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time_ms: Option<u64>,
    /// Display color tag for the external identity layer; irrelevant
    /// to orchestration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Team {
    /// Creates an empty team in the waiting state.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeSet::new(),
            arena: None,
            state: RaceState::Waiting,
            completion_time_ms: None,
            color: None,
        }
    }

    /// Returns the team name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the members of this team.
    #[must_use]
    pub const fn members(&self) -> &BTreeSet<PlayerId> {
        &self.members
    }

    /// Returns the number of members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Adds a member; returns `false` if already present.
    pub fn add_member(&mut self, player: PlayerId) -> bool {
        self.members.insert(player)
    }

    /// Removes a member; returns `false` if not present.
    pub fn remove_member(&mut self, player: PlayerId) -> bool {
        self.members.remove(&player)
    }

    /// Returns whether the given player is on this team.
    #[must_use]
    pub fn has_member(&self, player: PlayerId) -> bool {
        self.members.contains(&player)
    }

    /// Returns whether the team has a provisioned arena.
    #[must_use]
    pub const fn has_arena(&self) -> bool {
        self.arena.is_some()
    }

    /// Returns whether the team has finished with a recorded time.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.state, RaceState::Completed) && self.completion_time_ms.is_some()
    }

    /// Resets race progress; membership, arena, and color are kept.
    pub fn reset(&mut self) {
        self.state = RaceState::Waiting;
        self.completion_time_ms = None;
    }
}

/// Append-only record of a team finishing, used solely for
/// leaderboard ordering.
///
/// `rank` is the 1-based insertion order; ties are broken by call
/// order, not by the recorded time value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRecord {
    /// Name of the finishing team
    pub team: String,
    /// Elapsed race time at the moment of completion
    pub elapsed_ms: u64,
    /// 1-based finishing position
    pub rank: usize,
}
