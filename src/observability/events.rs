//! Structured race event stream.
//!
//! Discrete, typed events serialized as newline-delimited JSON, each
//! wrapped with a monotonically increasing sequence number so
//! consumers can order them even across log rotation. Emission
//! failures are dropped silently; observability must never take the
//! race down.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A discrete event emitted during race orchestration.
///
/// Tagged with `"type"` when serialized so consumers can dispatch on
/// the event kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The start countdown began.
    CountdownStarted {
        /// When the countdown began
        timestamp: DateTime<Utc>,
        /// Configured countdown length
        seconds: u32,
    },

    /// The race transitioned to running.
    RaceStarted {
        /// When the race started
        timestamp: DateTime<Utc>,
        /// Seed shared by every arena this cycle
        seed: i64,
        /// Number of participating teams
        teams: usize,
    },

    /// A team crossed the finish line.
    TeamCompleted {
        /// When the completion was recorded
        timestamp: DateTime<Utc>,
        /// Finishing team
        team: String,
        /// Frozen elapsed time at completion
        elapsed_ms: u64,
        /// 1-based finishing position
        rank: usize,
    },

    /// Every team finished; the race is over.
    RaceFinished {
        /// When the race finished
        timestamp: DateTime<Utc>,
        /// Number of teams on the final leaderboard
        teams_completed: usize,
    },

    /// The race was reset back to waiting.
    RaceReset {
        /// When the reset happened
        timestamp: DateTime<Utc>,
    },
}

/// Wraps an [`Event`] with its sequence number.
#[derive(Debug, Serialize)]
struct Envelope<'a> {
    sequence: u64,
    #[serde(flatten)]
    event: &'a Event,
}

/// Thread-safe, buffered JSONL event writer.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl EventEmitter {
    /// Creates an emitter over an arbitrary writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter appending to a file.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be opened.
    pub fn to_file(path: &Path) -> std::io::Result<Self> {
        let file = File::options().create(true).append(true).open(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits one event as a JSON line and flushes.
    ///
    /// Serialization and I/O failures are ignored.
    pub fn emit(&self, event: &Event) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = Envelope { sequence, event };

        let Ok(line) = serde_json::to_string(&envelope) else {
            return;
        };
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{line}");
            let _ = writer.flush();
        }
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
