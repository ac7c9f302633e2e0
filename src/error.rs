//! Error types for `timetrial`.
//!
//! Two families live here and must not be confused:
//!
//! - **Failures** (`TimetrialError` and the per-domain enums it wraps):
//!   something genuinely went wrong: a config file would not parse, a
//!   durable write failed, an arena could not be provisioned.
//! - **Guard rejections** ([`GuardRejection`], [`StartBlocked`]): a
//!   precondition was not met. These are ordinary return values with a
//!   human-readable reason, never treated as fatal and never retried
//!   automatically.

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `timetrial` CLI operations, following Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Persistence error (game data could not be read or written)
    pub const STORE_ERROR: i32 = 4;

    /// Provisioning error (arena creation/teardown failed)
    pub const ARENA_ERROR: i32 = 5;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type aggregating all domain-specific failures.
#[derive(Debug, Error)]
pub enum TimetrialError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Persistence gateway error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Arena provisioning error
    #[error(transparent)]
    Arena(#[from] ArenaError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl TimetrialError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Store(_) => ExitCode::STORE_ERROR,
            Self::Arena(_) => ExitCode::ARENA_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
            Self::Json(_) => ExitCode::ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Settings file could not be read
    #[error("cannot read settings file {path}")]
    Unreadable {
        /// Path to the settings file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    Parse {
        /// Path to the settings file
        path: PathBuf,
        /// Error message from the parser
        message: String,
    },

    /// Settings validation failed
    #[error("validation failed for {path}")]
    Validation {
        /// Path to the settings file
        path: String,
        /// List of validation issues found
        issues: Vec<ValidationIssue>,
    },
}

/// A single validation issue found during settings validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g. `clock.update-interval`)
    pub field: String,
    /// Description of the issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.field)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Prevents the settings from being used
    Error,
    /// Suspicious but not blocking
    Warning,
}

// ============================================================================
// Persistence Errors
// ============================================================================

/// Persistence gateway errors.
///
/// A failed write means the corresponding in-memory mutation was not
/// applied; callers persist first and commit after.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Game data file could not be read on startup
    #[error("cannot read game data from {path}")]
    Read {
        /// Path to the game data file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Game data file did not parse
    #[error("game data in {path} is corrupt: {message}")]
    Decode {
        /// Path to the game data file
        path: PathBuf,
        /// Error message from the parser
        message: String,
    },

    /// Game data could not be serialized
    #[error("cannot encode game data: {0}")]
    Encode(#[from] serde_yaml::Error),

    /// Durable write failed
    #[error("cannot persist game data to {path}")]
    Write {
        /// Path the write was addressed to
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Write failure injected by a test store
    #[error("persistence rejected the write")]
    Unavailable,
}

// ============================================================================
// Provisioning Errors
// ============================================================================

/// Arena provisioning errors.
///
/// The provisioner performs best-effort teardown of partially created
/// sibling zones before surfacing `CreateFailed`; nothing is retried
/// automatically.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// Arena creation failed (after sibling cleanup)
    #[error("arena creation failed for team '{team}': {reason}")]
    CreateFailed {
        /// Team the arena was being created for
        team: String,
        /// Human-readable failure reason
        reason: String,
    },

    /// Arena teardown failed
    #[error("arena teardown failed for team '{team}': {reason}")]
    DeleteFailed {
        /// Team whose arena was being torn down
        team: String,
        /// Human-readable failure reason
        reason: String,
    },
}

// ============================================================================
// Guard Rejections
// ============================================================================

/// Reasons `can_start` refuses to start a race.
///
/// Checked in order; the first failing guard is reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartBlocked {
    /// The race is not in the waiting state
    #[error("a race is already in progress")]
    AlreadyStarted,

    /// A start countdown is already ticking
    #[error("the start countdown is already running")]
    CountdownRunning,

    /// No seed has been configured
    #[error("no seed is configured; set one before starting")]
    NoSeed,

    /// There are no teams
    #[error("no teams exist")]
    NoTeams,

    /// A team has no provisioned arena
    #[error("team '{0}' has no arena; provision one first")]
    ArenaMissing(String),

    /// A team has no members
    #[error("team '{0}' has no members")]
    EmptyTeam(String),
}

/// Precondition failures for roster and setup operations.
///
/// Always returned as a value; the operation had no effect.
#[derive(Debug, Error)]
pub enum GuardRejection {
    /// Team name already in use
    #[error("a team named '{0}' already exists")]
    NameTaken(String),

    /// No team with that name
    #[error("no team named '{0}' exists")]
    UnknownTeam(String),

    /// Team is at its member capacity
    #[error("team '{0}' is already at capacity")]
    TeamFull(String),

    /// Player does not belong to any team
    #[error("player is not on any team")]
    NotOnTeam,

    /// Arena cannot be released while occupied
    #[error("arena for team '{0}' is still occupied")]
    ArenaBusy(String),

    /// Team already has a provisioned arena
    #[error("team '{0}' already has an arena")]
    AlreadyProvisioned(String),

    /// No seed configured for provisioning
    #[error("no seed is configured")]
    NoSeed,

    /// Start-eligibility guard failed
    #[error(transparent)]
    Start(#[from] StartBlocked),
}

/// Outcome of an engine or roster operation.
///
/// Separates "you may not do that" (a rejection the caller can relay
/// verbatim to whoever issued the command) from real failures in the
/// persistence or provisioning collaborators.
#[derive(Debug, Error)]
pub enum OpError {
    /// Precondition not met; nothing happened
    #[error(transparent)]
    Rejected(#[from] GuardRejection),

    /// Durable write failed; the in-memory state was not changed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Provisioning collaborator failed
    #[error(transparent)]
    Arena(#[from] ArenaError),

    /// The engine task is no longer running
    #[error("engine task has stopped")]
    EngineStopped,
}

impl From<StartBlocked> for OpError {
    fn from(blocked: StartBlocked) -> Self {
        Self::Rejected(GuardRejection::Start(blocked))
    }
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `timetrial` operations.
pub type Result<T> = std::result::Result<T, TimetrialError>;

// ============================================================================
// Tests
// ============================================================================
