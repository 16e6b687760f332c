//! Bounded retry protocol
//!
//! ```text
//! Request(0) ──valid──▶ Resolved
//!     │ invalid / provider error / timeout
//!     ▼
//! Request(1) ── ... ──▶ Request(max_retries) ──invalid──▶ Exhausted ──▶ fallback action
//! ```
//!
//! Retries re-send the original round prompt followed by the correction
//! instruction. Every attempt is recorded on the returned trace.
//!
//! The per-attempt timeout travels with the request; providers enforce it
//! (see [`Provider`]).

use super::parse::{parse_action, OutputFormat};
use crate::config::OutputConfig;
use crate::core::Action;
use crate::models::{AttemptOutcome, AttemptRecord, DecisionTrace};
use crate::provider::{CompletionRequest, Provider, ProviderError};
use crate::transcript::correction_prompt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolverState {
    Requesting { attempt: usize },
    Resolved(Action),
    Exhausted,
}

/// Outcome of one resolution: the action plus how it was reached
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub action: Action,
    pub trace: DecisionTrace,
}

impl Resolution {
    pub fn resolved_by_fallback(&self) -> bool {
        self.trace.resolved_by_fallback
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionResolver {
    format: OutputFormat,
    max_retries: usize,
    fallback: Action,
    timeout: Duration,
}

impl ActionResolver {
    pub fn new(format: OutputFormat, max_retries: usize, fallback: Action, timeout: Duration) -> Self {
        Self {
            format,
            max_retries,
            fallback,
            timeout,
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(
            config.format,
            config.max_retries,
            config.fallback_action,
            Duration::from_millis(config.timeout_ms),
        )
    }

    /// Drive the retry state machine to a canonical action
    ///
    /// Never fails: once `max_retries + 1` attempts are spent the configured
    /// fallback action is returned and the trace is flagged.
    pub fn resolve(
        &self,
        provider: &mut dyn Provider,
        system: &str,
        round_prompt: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Resolution {
        let mut attempts: Vec<AttemptRecord> = Vec::with_capacity(self.max_retries + 1);
        let mut state = ResolverState::Requesting { attempt: 0 };

        loop {
            state = match state {
                ResolverState::Requesting { attempt } => {
                    let prompt = if attempt == 0 {
                        round_prompt.to_string()
                    } else {
                        correction_prompt(round_prompt)
                    };
                    let request = CompletionRequest {
                        system,
                        prompt: &prompt,
                        temperature,
                        max_tokens,
                        timeout: self.timeout,
                    };
                    let (raw_response, outcome) = self.attempt(provider, &request);

                    let next = match &outcome {
                        AttemptOutcome::Parsed { action } => ResolverState::Resolved(*action),
                        _ if attempt < self.max_retries => ResolverState::Requesting {
                            attempt: attempt + 1,
                        },
                        _ => ResolverState::Exhausted,
                    };
                    if !outcome.is_valid() {
                        log::debug!(
                            "{}: attempt {} rejected: {:?}",
                            provider.name(),
                            attempt,
                            outcome
                        );
                    }
                    attempts.push(AttemptRecord {
                        attempt,
                        prompt,
                        raw_response,
                        outcome,
                    });
                    next
                }
                ResolverState::Resolved(action) => {
                    return Resolution {
                        action,
                        trace: DecisionTrace {
                            system_prompt: system.to_string(),
                            attempts,
                            resolved_by_fallback: false,
                        },
                    };
                }
                ResolverState::Exhausted => {
                    log::warn!(
                        "{}: no valid action after {} attempts, falling back to {}",
                        provider.name(),
                        attempts.len(),
                        self.fallback
                    );
                    return Resolution {
                        action: self.fallback,
                        trace: DecisionTrace {
                            system_prompt: system.to_string(),
                            attempts,
                            resolved_by_fallback: true,
                        },
                    };
                }
            };
        }
    }

    fn attempt(
        &self,
        provider: &mut dyn Provider,
        request: &CompletionRequest<'_>,
    ) -> (Option<String>, AttemptOutcome) {
        let started = Instant::now();
        let result = provider.complete(request);
        let late = started.elapsed() > self.timeout;
        let timed_out = AttemptOutcome::Timeout {
            timeout_ms: self.timeout.as_millis() as u64,
        };

        match result {
            Err(ProviderError::Timeout(_)) => (None, timed_out),
            Err(e) => (
                None,
                AttemptOutcome::ProviderError {
                    message: e.to_string(),
                },
            ),
            Ok(raw) if late => (Some(raw), timed_out),
            Ok(raw) => {
                let outcome = match parse_action(&raw, self.format) {
                    Ok(action) => AttemptOutcome::Parsed { action },
                    Err(e) => AttemptOutcome::Invalid {
                        reason: e.to_string(),
                    },
                };
                (Some(raw), outcome)
            }
        }
    }
}
