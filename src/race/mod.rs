//! Race orchestration: state machine, shared clock, roster, and the
//! serialized runtime that ties them together.

pub mod clock;
pub mod engine;
pub mod roster;
pub mod runtime;
pub mod state;

pub use clock::{RaceClock, Ticker};
pub use engine::RaceEngine;
pub use roster::Roster;
pub use runtime::{EngineEvent, EngineHandle, RuntimeOptions, spawn};
pub use state::{CompletionRecord, PlayerId, RaceState, Team};
