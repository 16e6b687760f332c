//! PDBench Core - Rust Engine
//!
//! Deterministic engine for iterated Prisoner's Dilemma experiments between
//! fixed-policy and provider-backed agents, with per-round transcripts and
//! behavioural metrics.
//!
//! # Architecture
//!
//! - **core**: Actions, payoff matrix, horizon policy, wall clock
//! - **rng**: Deterministic random number generation and seed derivation
//! - **models**: Domain types (Round, Observation, GameEvent)
//! - **transcript**: Observation windows and prompt rendering
//! - **resolver**: Raw reply → Action, with bounded retries
//! - **provider**: Text-completion providers (mock, OpenAI-compatible)
//! - **policy**: Agents (ALLC, ALLD, TFT, GTFT, GRIM, WSLS, provider-backed)
//! - **orchestrator**: Game loop and run orchestration
//! - **metrics**: Cooperation, retaliation, payoff gap, collapse
//! - **store**: Append-only transcript store
//!
//! # Critical Invariants
//!
//! 1. All randomness is deterministic (seeded per unit and stream)
//! 2. Both agents act on the same pre-round history
//! 3. Metrics are recomputable from persisted rounds alone
//!
//! # Entry points
//!
//! [`run`] executes a configuration's condition×replicate matrix;
//! [`aggregate`] recomputes the aggregate table of a run directory, including
//! one whose run was interrupted.

// Module declarations
pub mod config;
pub mod core;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod provider;
pub mod resolver;
pub mod rng;
pub mod store;
pub mod transcript;

// Re-exports for convenience
pub use config::{AgentSpec, ConfigError, ExperimentConfig};
pub use core::{Action, Clock, FixedClock, HorizonPolicy, PayoffMatrix, SystemClock};
pub use metrics::{AggregateTable, ConditionAggregate, ReplicateMetrics};
pub use models::{EventLog, GameEvent, HorizonInfo, Observation, Round, Side};
pub use orchestrator::{aggregate, aggregate_with, preflight, run, run_with_clock, RunError, RunManifest, RunReport};
pub use policy::{create_agent, Agent, Decision};
pub use provider::{MockProvider, Provider, ProviderError};
pub use rng::RngManager;
pub use store::{RoundRecord, StoreError, TranscriptStore};
