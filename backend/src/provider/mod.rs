//! Provider: an external text-completion capability
//!
//! The engine only ever talks to a provider through the Action Resolver, so a
//! slow or failing provider degrades into invalid attempts, never a failed game.
//!
//! # Variants
//!
//! - [`MockProvider`]: deterministic, seed-derived replies for tests and dry runs
//! - `OpenAiProvider` (feature `openai`): OpenAI-compatible chat completions

mod mock;
#[cfg(feature = "openai")]
mod openai;

pub use mock::{MockConfig, MockMode, MockProvider};
#[cfg(feature = "openai")]
pub use openai::OpenAiProvider;

use std::time::Duration;
use thiserror::Error;

/// One completion request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Deadline for the whole call
    pub timeout: Duration,
}

/// Failure to obtain any text from a provider
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("no reply within {0} ms")]
    Timeout(u64),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("API key not found in environment variable `{0}`")]
    MissingApiKey(String),

    #[error("provider `{0}` is not available in this build")]
    Unavailable(String),
}

/// Text-completion capability
///
/// Implementations must be `Send` so that each unit's agents can live on a
/// worker thread. A provider is owned by exactly one agent.
///
/// # Deadline
///
/// `complete` runs on the unit's own thread and nothing can interrupt it, so
/// every implementation must give up once `request.timeout` has elapsed and
/// return [`ProviderError::Timeout`]. A reply that arrives late anyway is
/// still treated as a timeout by the resolver.
pub trait Provider: Send {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Forget per-game state and reseed
    fn reset(&mut self, seed: u64);

    /// Produce a completion for the request, within `request.timeout`
    fn complete(&mut self, request: &CompletionRequest<'_>) -> Result<String, ProviderError>;
}
