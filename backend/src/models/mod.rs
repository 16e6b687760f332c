//! Domain models for the game engine
//!
//! - [`Round`]: the atomic, immutable unit of game history
//! - [`Observation`]: a per-agent, per-round read-only view of that history
//! - [`GameEvent`]: telemetry emitted while a game runs

pub mod event;
pub mod observation;
pub mod round;

// Re-exports
pub use event::{EventLog, GameEvent};
pub use observation::{HistoryEntry, HorizonInfo, Observation};
pub use round::{AttemptOutcome, AttemptRecord, DecisionTrace, Round, Side};
