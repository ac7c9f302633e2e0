//! Settings schema and loader.
//!
//! Settings are optional: a missing file yields defaults, a present
//! file is parsed and validated before the engine sees it. Durations
//! are written in humantime syntax (`1s`, `500ms`).

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, Severity, ValidationIssue};

/// Top-level settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Settings {
    /// Roster policy
    pub teams: TeamSettings,
    /// Race flow settings
    pub race: RaceSettings,
    /// Shared clock settings
    pub clock: ClockSettings,
}

/// Roster policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct TeamSettings {
    /// Maximum members per team; 0 means unlimited
    pub max_members: u32,
    /// Automatic assignment policy
    pub auto_assign: AutoAssignSettings,
}

impl Default for TeamSettings {
    fn default() -> Self {
        Self {
            max_members: 4,
            auto_assign: AutoAssignSettings::default(),
        }
    }
}

/// Automatic assignment policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct AutoAssignSettings {
    /// Whether joining players are auto-assigned to a team
    pub enabled: bool,
    /// Restrict auto-assignment to the waiting state
    pub only_when_waiting: bool,
}

impl Default for AutoAssignSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            only_when_waiting: true,
        }
    }
}

/// Race flow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RaceSettings {
    /// Countdown length in seconds; 0 starts immediately
    pub start_countdown_secs: u32,
    /// Show a GO! title to every member when the race starts
    pub show_title_on_start: bool,
    /// Goal identifiers that complete a team when reached by any
    /// member
    pub completion_goals: Vec<String>,
}

impl Default for RaceSettings {
    fn default() -> Self {
        Self {
            start_countdown_secs: 10,
            show_title_on_start: true,
            completion_goals: Vec::new(),
        }
    }
}

/// Shared clock settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ClockSettings {
    /// Live-clock broadcast period (humantime syntax)
    pub update_interval: String,
    /// Whether the live clock is broadcast at all
    pub show_live_clock: bool,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            update_interval: "1s".to_string(),
            show_live_clock: true,
        }
    }
}

impl ClockSettings {
    /// Parses the configured broadcast period.
    ///
    /// Falls back to one second (with a warning) when the value does
    /// not parse; validation reports it, but a running engine should
    /// not die over a display interval.
    #[must_use]
    pub fn update_period(&self) -> Duration {
        humantime::parse_duration(&self.update_interval).unwrap_or_else(|_| {
            warn!(
                value = %self.update_interval,
                "invalid clock.update-interval, using 1s"
            );
            Duration::from_secs(1)
        })
    }
}

impl Settings {
    /// Loads settings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Unreadable`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Loads and validates settings, treating error-severity issues as
    /// fatal.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] listing every issue when
    /// any error-severity issue is present, in addition to the load
    /// errors of [`Settings::load`].
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let settings = Self::load(path)?;
        let issues = settings.validate();
        for issue in issues.iter().filter(|i| i.severity == Severity::Warning) {
            warn!("{issue}");
        }
        if issues.iter().any(|i| i.severity == Severity::Error) {
            return Err(ConfigError::Validation {
                path: path.display().to_string(),
                issues,
            });
        }
        Ok(settings)
    }

    /// Validates the settings, returning every issue found.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if let Err(e) = humantime::parse_duration(&self.clock.update_interval) {
            issues.push(ValidationIssue {
                field: "clock.update-interval".to_string(),
                message: format!("not a duration: {e}"),
                severity: Severity::Error,
            });
        } else if self.clock.update_period() < Duration::from_millis(100) {
            issues.push(ValidationIssue {
                field: "clock.update-interval".to_string(),
                message: "update interval below 100ms floods the sink".to_string(),
                severity: Severity::Warning,
            });
        }

        if self.race.start_countdown_secs > 600 {
            issues.push(ValidationIssue {
                field: "race.start-countdown-secs".to_string(),
                message: "countdown longer than 10 minutes".to_string(),
                severity: Severity::Warning,
            });
        }

        if self.teams.max_members == 1 {
            issues.push(ValidationIssue {
                field: "teams.max-members".to_string(),
                message: "capacity 1 makes every team a solo run".to_string(),
                severity: Severity::Warning,
            });
        }

        issues
    }
}
