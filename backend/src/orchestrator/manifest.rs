//! Run Manifest
//!
//! Metadata for one orchestrated run: identity, seed, a snapshot and hash of
//! the resolved configuration, the environment and collapse parameters.
//! Written exactly once, before any unit plays, and never modified.
//!
//! Unit outcomes are recorded separately, one [`UnitReport`] per
//! (condition, replicate), as each unit ends. A run killed midway therefore
//! still has a manifest and can be aggregated from whatever rounds it stored.

use crate::config::{CollapseConfig, ExperimentConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub seed: u64,
    /// SHA-256 of the canonical JSON form of `config`
    pub config_hash: String,
    pub config: ExperimentConfig,
    pub environment: Environment,
    pub collapse: CollapseConfig,
    pub started_at: DateTime<Utc>,
}

impl RunManifest {
    pub fn replicates(&self) -> usize {
        self.config.experiment.replicates
    }

    /// Condition names in configuration order
    pub fn condition_names(&self) -> Vec<&str> {
        self.config
            .experiment
            .conditions
            .iter()
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// What a finished run hands back to its caller
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub manifest: RunManifest,
    /// One entry per unit, ordered by condition then replicate
    pub units: Vec<UnitReport>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn run_id(&self) -> &str {
        &self.manifest.run_id
    }

    pub fn completed_units(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|u| u.is_completed())
    }

    pub fn failed_units(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|u| !u.is_completed())
    }
}

/// Where the run executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub engine_version: String,
    pub os: String,
    pub arch: String,
    pub parallelism: usize,
}

impl Environment {
    pub fn capture(parallelism: usize) -> Self {
        Self {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            parallelism,
        }
    }
}

/// Outcome of one (condition, replicate) unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    pub condition: String,
    pub replicate: usize,
    /// Round partition, relative to the run directory
    pub partition: String,
    #[serde(flatten)]
    pub status: UnitStatus,
}

impl UnitReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, UnitStatus::Completed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    Completed {
        rounds: usize,
        horizon_cap_hit: bool,
        fallbacks_a: usize,
        fallbacks_b: usize,
    },
    Failed {
        reason: String,
    },
}

/// Compute SHA256 hash of a configuration for reproducibility checks
///
/// Keys are sorted recursively before hashing, so the hash depends only on
/// content, never on field or map ordering.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, serde_json::Error> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    let value = serde_json::to_value(config)?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value))?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_hash_ignores_key_order() {
        let a = json!({"seed": 1, "horizon": {"type": "fixed", "n_rounds": 10}});
        let b = json!({"horizon": {"n_rounds": 10, "type": "fixed"}, "seed": 1});
        assert_eq!(compute_config_hash(&a).unwrap(), compute_config_hash(&b).unwrap());
    }

    #[test]
    fn test_config_hash_changes_with_content() {
        let a = json!({"seed": 1});
        let b = json!({"seed": 2});
        let hash = compute_config_hash(&a).unwrap();
        assert_eq!(hash.len(), 64);
        assert_ne!(hash, compute_config_hash(&b).unwrap());
    }

    #[test]
    fn test_unit_status_flattened() {
        let report = UnitReport {
            condition: "c".to_string(),
            replicate: 2,
            partition: "rounds/c/replicate_2.jsonl".to_string(),
            status: UnitStatus::Failed {
                reason: "disk full".to_string(),
            },
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["reason"], "disk full");
        assert!(!report.is_completed());

        let back: UnitReport = serde_json::from_value(value).unwrap();
        assert_eq!(back, report);
    }
}
