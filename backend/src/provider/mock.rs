//! Deterministic mock provider
//!
//! Three modes:
//! - `fixed`: always `fixed_output`
//! - `scripted`: cycles through `scripted_outputs` (falls back to
//!   `fixed_output` when the list is empty)
//! - `seeded`: `C` with probability `cooperate_prob`, drawn from a generator
//!   seeded by SHA-256 of (seed, system, prompt). Identical inputs under the
//!   same seed always give the same reply.

use super::{CompletionRequest, Provider, ProviderError};
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockMode {
    #[default]
    Fixed,
    Scripted,
    Seeded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockConfig {
    #[serde(default)]
    pub mode: MockMode,

    #[serde(default = "default_fixed_output")]
    pub fixed_output: String,

    #[serde(default)]
    pub scripted_outputs: Vec<String>,

    #[serde(default = "default_cooperate_prob")]
    pub cooperate_prob: f64,

    /// Simulated latency per call
    #[serde(default)]
    pub delay_ms: u64,
}

fn default_fixed_output() -> String {
    "C".to_string()
}

fn default_cooperate_prob() -> f64 {
    0.5
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            mode: MockMode::Fixed,
            fixed_output: default_fixed_output(),
            scripted_outputs: Vec::new(),
            cooperate_prob: default_cooperate_prob(),
            delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockProvider {
    config: MockConfig,
    seed: u64,
    call_count: usize,
    scripted_index: usize,
}

impl MockProvider {
    pub fn new(config: MockConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            call_count: 0,
            scripted_index: 0,
        }
    }

    /// Calls to `complete` since the last reset
    pub fn call_count(&self) -> usize {
        self.call_count
    }

    fn seeded_reply(&self, request: &CompletionRequest<'_>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(request.system.as_bytes());
        hasher.update([0u8]);
        hasher.update(request.prompt.as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let mut rng = RngManager::new(u64::from_le_bytes(bytes));
        if rng.chance(self.config.cooperate_prob) {
            "C".to_string()
        } else {
            "D".to_string()
        }
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn reset(&mut self, seed: u64) {
        self.seed = seed;
        self.call_count = 0;
        self.scripted_index = 0;
    }

    fn complete(&mut self, request: &CompletionRequest<'_>) -> Result<String, ProviderError> {
        self.call_count += 1;
        if self.config.delay_ms > 0 {
            let delay = Duration::from_millis(self.config.delay_ms);
            if delay > request.timeout {
                std::thread::sleep(request.timeout);
                return Err(ProviderError::Timeout(request.timeout.as_millis() as u64));
            }
            std::thread::sleep(delay);
        }

        let reply = match self.config.mode {
            MockMode::Fixed => self.config.fixed_output.clone(),
            MockMode::Scripted => {
                if self.config.scripted_outputs.is_empty() {
                    self.config.fixed_output.clone()
                } else {
                    let i = self.scripted_index % self.config.scripted_outputs.len();
                    self.scripted_index += 1;
                    self.config.scripted_outputs[i].clone()
                }
            }
            MockMode::Seeded => self.seeded_reply(request),
        };
        Ok(reply)
    }
}
