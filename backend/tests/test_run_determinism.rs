//! Run Orchestrator determinism tests
//!
//! A run is a pure function of its configuration (and the injected clock):
//! the same config must produce byte-identical round partitions regardless of
//! worker count, and aggregates must be recomputable from stored rounds, even
//! when the run was interrupted.

use pdbench_core_rs::config::{
    AgentSpec, CollapseConfig, ConditionConfig, ExperimentConfig, ExperimentMatrix, GameSettings,
    HorizonConfig, LlmAgentConfig, MetricsConfig, PolicyAgentConfig, PolicyKind, PolicyParams,
    RunSettings,
};
use pdbench_core_rs::orchestrator::{aggregate, aggregate_with, run_with_clock, RunError, UnitStatus};
use pdbench_core_rs::provider::{MockConfig, MockMode};
use pdbench_core_rs::store::{partition_relpath, RoundRecord, StoreError, AGGREGATES_FILE, UNITS_DIR};
use pdbench_core_rs::{FixedClock, ReplicateMetrics, TranscriptStore};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

fn policy(kind: PolicyKind) -> AgentSpec {
    AgentSpec::Policy(PolicyAgentConfig {
        policy: kind,
        policy_params: PolicyParams::default(),
    })
}

fn seeded_mock(cooperate_prob: f64) -> AgentSpec {
    AgentSpec::Llm(LlmAgentConfig {
        mock: MockConfig {
            mode: MockMode::Seeded,
            cooperate_prob,
            ..MockConfig::default()
        },
        ..LlmAgentConfig::default()
    })
}

fn condition(name: &str, agent_a: AgentSpec, agent_b: AgentSpec) -> ConditionConfig {
    ConditionConfig {
        name: name.to_string(),
        agent_a,
        agent_b,
    }
}

fn experiment(output_dir: &Path, horizon: HorizonConfig, parallelism: usize) -> ExperimentConfig {
    ExperimentConfig {
        run: RunSettings {
            run_id: Some("determinism".to_string()),
            seed: 1337,
            output_dir: output_dir.to_path_buf(),
            parallelism: Some(parallelism),
            ..RunSettings::default()
        },
        game: GameSettings::default(),
        horizon,
        experiment: ExperimentMatrix {
            replicates: 3,
            conditions: vec![
                condition("TFT_vs_ALLD", policy(PolicyKind::TitForTat), policy(PolicyKind::AlwaysDefect)),
                condition("GTFT_vs_mock", policy(PolicyKind::GenerousTitForTat), seeded_mock(0.6)),
                condition("WSLS_vs_GRIM", policy(PolicyKind::WinStayLoseShift), policy(PolicyKind::GrimTrigger)),
            ],
        },
        metrics: MetricsConfig::default(),
    }
}

fn geometric() -> HorizonConfig {
    HorizonConfig::Geometric {
        stop_prob: 0.1,
        max_rounds: 200,
    }
}

fn run_dir(config: &ExperimentConfig) -> PathBuf {
    config.run.output_dir.join("determinism")
}

fn read_partition_bytes(config: &ExperimentConfig, name: &str, replicate: usize) -> Vec<u8> {
    fs::read(run_dir(config).join(partition_relpath(name, replicate))).unwrap()
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_same_config_produces_identical_partitions() {
    let dir = TempDir::new().unwrap();
    let clock = FixedClock::epoch();

    let serial = experiment(&dir.path().join("serial"), geometric(), 1);
    let parallel = experiment(&dir.path().join("parallel"), geometric(), 4);

    let serial_report = run_with_clock(&serial, &clock).unwrap();
    let parallel_report = run_with_clock(&parallel, &clock).unwrap();

    assert_eq!(serial_report.units.len(), 9);
    assert_eq!(serial_report.units, parallel_report.units);

    for c in &serial.experiment.conditions {
        for r in 0..serial.experiment.replicates {
            assert_eq!(
                read_partition_bytes(&serial, &c.name, r),
                read_partition_bytes(&parallel, &c.name, r),
                "partition ({}, {}) differs",
                c.name,
                r
            );
        }
    }

    assert_eq!(
        fs::read(run_dir(&serial).join(AGGREGATES_FILE)).unwrap(),
        fs::read(run_dir(&parallel).join(AGGREGATES_FILE)).unwrap()
    );
}

#[test]
fn test_different_seed_changes_rounds() {
    let dir = TempDir::new().unwrap();
    let clock = FixedClock::epoch();

    let first = experiment(&dir.path().join("first"), geometric(), 2);
    let mut second = experiment(&dir.path().join("second"), geometric(), 2);
    second.run.seed = 4242;

    run_with_clock(&first, &clock).unwrap();
    run_with_clock(&second, &clock).unwrap();

    let differs = first.experiment.conditions.iter().any(|c| {
        (0..first.experiment.replicates)
            .any(|r| read_partition_bytes(&first, &c.name, r) != read_partition_bytes(&second, &c.name, r))
    });
    assert!(differs);
}

#[test]
fn test_fixed_horizon_every_unit_has_n_rounds() {
    let dir = TempDir::new().unwrap();
    let config = experiment(dir.path(), HorizonConfig::Fixed { n_rounds: 17 }, 3);

    let report = run_with_clock(&config, &FixedClock::epoch()).unwrap();
    for unit in &report.units {
        match &unit.status {
            UnitStatus::Completed {
                rounds,
                horizon_cap_hit,
                ..
            } => {
                assert_eq!(*rounds, 17);
                assert!(!horizon_cap_hit);
            }
            other => panic!("unit failed: {:?}", other),
        }
        let text = fs::read_to_string(run_dir(&config).join(&unit.partition)).unwrap();
        assert_eq!(text.lines().count(), 17);
    }
}

#[test]
fn test_generated_run_id() {
    let dir = TempDir::new().unwrap();
    let mut config = experiment(dir.path(), HorizonConfig::Fixed { n_rounds: 3 }, 1);
    config.run.run_id = None;

    let report = run_with_clock(&config, &FixedClock::epoch()).unwrap();
    let run_id = report.run_id();
    assert!(!run_id.is_empty());
    assert_eq!(report.manifest.config.run.run_id.as_deref(), Some(run_id));

    let stored = TranscriptStore::open(dir.path().join(run_id))
        .unwrap()
        .read_manifest()
        .unwrap();
    assert_eq!(stored.run_id, run_id);
    assert_eq!(stored.config_hash, report.manifest.config_hash);
    assert_eq!(stored.started_at, report.manifest.started_at);
}

#[test]
fn test_every_unit_records_its_outcome() {
    let dir = TempDir::new().unwrap();
    let config = experiment(dir.path(), HorizonConfig::Fixed { n_rounds: 4 }, 2);
    let report = run_with_clock(&config, &FixedClock::epoch()).unwrap();

    let store = TranscriptStore::open(run_dir(&config)).unwrap();
    for unit in &report.units {
        let recorded = store.read_unit_report(&unit.condition, unit.replicate).unwrap();
        assert_eq!(recorded.as_ref(), Some(unit));
    }
}

// ============================================================================
// Aggregation
// ============================================================================

#[test]
fn test_aggregate_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let config = experiment(dir.path(), geometric(), 2);
    run_with_clock(&config, &FixedClock::epoch()).unwrap();

    let path = run_dir(&config);
    let written = fs::read(path.join(AGGREGATES_FILE)).unwrap();

    let first = aggregate(&path).unwrap();
    let second = aggregate(&path).unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read(path.join(AGGREGATES_FILE)).unwrap(), written);

    let stored = TranscriptStore::open(&path).unwrap().read_aggregates().unwrap();
    assert_eq!(stored, first);
    assert_eq!(first.replicates.len(), 9);
    assert_eq!(first.conditions.len(), 3);
}

#[test]
fn test_aggregate_collapse_override() {
    let dir = TempDir::new().unwrap();
    let config = experiment(dir.path(), HorizonConfig::Fixed { n_rounds: 20 }, 1);
    run_with_clock(&config, &FixedClock::epoch()).unwrap();

    // TFT vs ALLD: round 0 is (C, D), mutual defection from round 1 on
    let table = aggregate_with(
        &run_dir(&config),
        Some(CollapseConfig {
            k: 1,
            threshold: 0.0,
        }),
    )
    .unwrap();
    let metrics = table.replicate("TFT_vs_ALLD", 0).unwrap();
    assert_eq!(metrics.time_to_collapse, Some(1));
    assert_eq!(table.collapse.k, 1);

    let invalid = aggregate_with(
        &run_dir(&config),
        Some(CollapseConfig {
            k: 0,
            threshold: 0.2,
        }),
    );
    assert!(matches!(invalid, Err(RunError::Config(_))));
}

/// Rounds a partition holds, parsed independently of the store; a torn final
/// line is dropped
fn parse_rounds(path: &Path) -> Vec<RoundRecord> {
    let text = fs::read_to_string(path).unwrap();
    text.split_inclusive('\n')
        .filter(|line| line.ends_with('\n'))
        .map(|line| serde_json::from_str(line.trim_end()).unwrap())
        .collect()
}

#[test]
fn test_aggregate_interrupted_run_uses_stored_rounds() {
    let dir = TempDir::new().unwrap();
    let config = experiment(dir.path(), HorizonConfig::Fixed { n_rounds: 12 }, 2);
    run_with_clock(&config, &FixedClock::epoch()).unwrap();
    let path = run_dir(&config);

    // Rewind the directory to a run killed midway: no unit outcomes, no
    // aggregates, some units never started, one cut off mid-append
    fs::remove_dir_all(path.join(UNITS_DIR)).unwrap();
    fs::remove_file(path.join(AGGREGATES_FILE)).unwrap();
    for (name, replicate) in [("TFT_vs_ALLD", 2), ("WSLS_vs_GRIM", 1), ("WSLS_vs_GRIM", 2)] {
        fs::remove_file(path.join(partition_relpath(name, replicate))).unwrap();
    }
    let cut = path.join(partition_relpath("GTFT_vs_mock", 0));
    let text = fs::read_to_string(&cut).unwrap();
    let kept: String = text.split_inclusive('\n').take(5).collect();
    fs::write(&cut, format!("{}{{\"run_id\":\"determ", kept)).unwrap();

    let table = aggregate(&path).unwrap();

    assert_eq!(table.replicates.len(), 6);
    assert_eq!(table.condition("TFT_vs_ALLD").unwrap().replicates, 2);
    assert_eq!(table.condition("GTFT_vs_mock").unwrap().replicates, 3);
    assert_eq!(table.condition("WSLS_vs_GRIM").unwrap().replicates, 1);
    assert!(table.replicate("WSLS_vs_GRIM", 1).is_none());
    assert_eq!(table.replicate("GTFT_vs_mock", 0).unwrap().n_rounds, 5);

    for metrics in &table.replicates {
        let rounds = parse_rounds(&path.join(partition_relpath(&metrics.condition, metrics.replicate)));
        let expected = ReplicateMetrics::compute(
            &metrics.condition,
            metrics.replicate,
            &rounds,
            &table.collapse,
        );
        assert_eq!(metrics, &expected);
    }
    assert!(path.join(AGGREGATES_FILE).is_file());
}

#[test]
fn test_aggregate_requires_manifest() {
    let dir = TempDir::new().unwrap();
    let result = aggregate(dir.path());
    assert!(matches!(
        result,
        Err(RunError::Store(StoreError::MissingManifest(_)))
    ));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_rerun_into_same_directory_rejected() {
    let dir = TempDir::new().unwrap();
    let config = experiment(dir.path(), HorizonConfig::Fixed { n_rounds: 5 }, 1);
    run_with_clock(&config, &FixedClock::epoch()).unwrap();

    let again = run_with_clock(&config, &FixedClock::epoch());
    assert!(matches!(
        again,
        Err(RunError::Store(StoreError::ManifestExists(_)))
    ));
}

#[test]
fn test_invalid_config_runs_nothing() {
    let dir = TempDir::new().unwrap();
    let mut config = experiment(dir.path(), HorizonConfig::Fixed { n_rounds: 5 }, 1);
    config.experiment.replicates = 0;

    let result = run_with_clock(&config, &FixedClock::epoch());
    assert!(matches!(result, Err(RunError::Config(_))));
    assert!(!run_dir(&config).exists());
}

#[test]
fn test_failed_unit_isolated() {
    let dir = TempDir::new().unwrap();
    let config = experiment(dir.path(), HorizonConfig::Fixed { n_rounds: 6 }, 2);

    // A stale partition makes exactly one unit fail to open its writer
    let stale = run_dir(&config).join(partition_relpath("WSLS_vs_GRIM", 1));
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "").unwrap();

    let report = run_with_clock(&config, &FixedClock::epoch()).unwrap();
    let failed: Vec<_> = report.failed_units().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].condition, "WSLS_vs_GRIM");
    assert_eq!(failed[0].replicate, 1);
    assert_eq!(report.completed_units().count(), 8);

    // Stale partition untouched
    assert_eq!(fs::read_to_string(&stale).unwrap(), "");

    let table = aggregate(&run_dir(&config)).unwrap();
    assert_eq!(table.condition("WSLS_vs_GRIM").unwrap().replicates, 2);
    assert_eq!(table.condition("TFT_vs_ALLD").unwrap().replicates, 3);
}

#[cfg(not(feature = "openai"))]
#[test]
fn test_openai_agent_unavailable_without_feature() {
    use pdbench_core_rs::config::ProviderKind;

    let dir = TempDir::new().unwrap();
    let mut config = experiment(dir.path(), HorizonConfig::Fixed { n_rounds: 5 }, 1);
    config.experiment.conditions[0].agent_b = AgentSpec::Llm(LlmAgentConfig {
        provider: ProviderKind::Openai,
        ..LlmAgentConfig::default()
    });

    let result = run_with_clock(&config, &FixedClock::epoch());
    assert!(matches!(result, Err(RunError::Provider(_))));
}
