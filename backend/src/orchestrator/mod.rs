//! Orchestrator - game loop and run fan-out
//!
//! - `game`: one (condition, replicate) game, round by round
//! - `run`: the condition×replicate matrix, persistence and aggregation
//! - `manifest`: run metadata, unit outcomes and configuration hashing

pub mod game;
pub mod manifest;
pub mod run;

// Re-export main types for convenience
pub use game::{GameLoop, GameOutcome, UnitSeeds};
pub use manifest::{compute_config_hash, Environment, RunManifest, RunReport, UnitReport, UnitStatus};
pub use run::{aggregate, aggregate_with, preflight, run, run_with_clock, RunError};
