//! Notification sink abstraction and plain-text formatting.
//!
//! The engine never formats rich presentation; it hands plain strings,
//! rank labels, and formatted durations to a [`Notifier`] and lets the
//! identity/display layer dress them up.

use tracing::info;

use crate::race::state::PlayerId;

/// Outbound player-facing notification sink.
pub trait Notifier: Send + Sync {
    /// Sends a message to every connected player.
    fn broadcast(&self, text: &str);

    /// Sends a message to one player.
    fn send_to_player(&self, player: PlayerId, text: &str);

    /// Shows a prominent title/subtitle pair to one player.
    fn show_title(&self, player: PlayerId, title: &str, subtitle: &str);

    /// Shows a short-lived status bar line to one player.
    fn show_ephemeral_bar(&self, player: PlayerId, text: &str);
}

/// [`Notifier`] that writes everything to the tracing log.
///
/// Useful for headless runs and as a default when no real sink is
/// wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn broadcast(&self, text: &str) {
        info!(target: "timetrial::broadcast", "{text}");
    }

    fn send_to_player(&self, player: PlayerId, text: &str) {
        info!(target: "timetrial::broadcast", %player, "{text}");
    }

    fn show_title(&self, player: PlayerId, title: &str, subtitle: &str) {
        info!(target: "timetrial::broadcast", %player, subtitle, "title: {title}");
    }

    fn show_ephemeral_bar(&self, player: PlayerId, text: &str) {
        info!(target: "timetrial::broadcast", %player, "bar: {text}");
    }
}

/// Formats milliseconds as `HH:MM:SS.mmm`.
#[must_use]
pub fn format_hms(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

/// Formats milliseconds as a compact live-clock string: `MM:SS`, or
/// `H:MM:SS` once the race passes the hour mark.
#[must_use]
pub fn format_clock(ms: u64) -> String {
    let total_seconds = ms / 1_000;
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;

    if minutes >= 60 {
        let hours = minutes / 60;
        let minutes = minutes % 60;
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// English ordinal rank label: `1st`, `2nd`, `3rd`, `4th`, ...
///
/// The teens are all `th` (11th, 12th, 13th).
#[must_use]
pub fn rank_label(rank: usize) -> String {
    let suffix = match rank % 100 {
        11..=13 => "th",
        _ => match rank % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        },
    };
    format!("{rank}{suffix}")
}
