//! Run Orchestrator
//!
//! Writes the manifest, fans the condition×replicate matrix out into
//! independent games, persists their rounds and outcomes, and derives the
//! aggregate table.
//!
//! Units share nothing mutable: each derives its own seeds from
//! (run seed, condition, replicate) and owns its own store partition, so the
//! degree of parallelism never changes the results.

use super::game::{GameLoop, UnitSeeds};
use super::manifest::{compute_config_hash, Environment, RunManifest, RunReport, UnitReport, UnitStatus};
use crate::config::{CollapseConfig, ConditionConfig, ConfigError, ExperimentConfig};
use crate::core::{Clock, HorizonPolicy, PayoffMatrix, SystemClock};
use crate::metrics::{AggregateTable, ConditionAggregate, ReplicateMetrics};
use crate::policy::create_agent;
use crate::provider::ProviderError;
use crate::store::{condition_slug, partition_relpath, RecordContext, RoundRecord, StoreError, TranscriptStore};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("failed to serialize configuration: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

/// Everything a unit needs, shared read-only across workers
struct RunContext<'a> {
    config: &'a ExperimentConfig,
    payoff_matrix: PayoffMatrix,
    run_id: String,
    store: TranscriptStore,
    clock: &'a dyn Clock,
}

/// Validate a configuration and construct every agent once, without playing
///
/// Surfaces configuration and provider errors (e.g. a missing API key)
/// before any game executes.
pub fn preflight(config: &ExperimentConfig) -> Result<PayoffMatrix, RunError> {
    config.validate()?;
    let payoff_matrix = config.payoff_matrix()?;

    let mut slugs: HashMap<String, &str> = HashMap::new();
    for (i, condition) in config.experiment.conditions.iter().enumerate() {
        if let Some(other) = slugs.insert(condition_slug(&condition.name), &condition.name) {
            return Err(ConfigError::invalid(
                format!("experiment.conditions[{}].name", i),
                format!("maps to the same output directory as `{}`", other),
            )
            .into());
        }
        create_agent(&condition.agent_a)?;
        create_agent(&condition.agent_b)?;
    }

    Ok(payoff_matrix)
}

/// Execute the full condition×replicate matrix with the system clock
pub fn run(config: &ExperimentConfig) -> Result<RunReport, RunError> {
    run_with_clock(config, &SystemClock)
}

/// Execute the full condition×replicate matrix
///
/// Writes the manifest first, then every unit's rounds followed by its
/// outcome record, then the aggregate table. A unit that fails (e.g. a
/// storage error) is recorded as failed; other units are unaffected.
pub fn run_with_clock(config: &ExperimentConfig, clock: &dyn Clock) -> Result<RunReport, RunError> {
    let payoff_matrix = preflight(config)?;

    let run_id = config
        .run
        .run_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut resolved = config.clone();
    resolved.run.run_id = Some(run_id.clone());
    let config_hash = compute_config_hash(&resolved)?;

    let store = TranscriptStore::create(resolved.run.output_dir.join(&run_id))?;

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = resolved.run.parallelism {
        builder = builder.num_threads(threads);
    }
    let pool = builder
        .build()
        .map_err(|e| RunError::ThreadPool(e.to_string()))?;

    let manifest = RunManifest {
        run_id: run_id.clone(),
        seed: resolved.run.seed,
        config_hash,
        config: resolved.clone(),
        environment: Environment::capture(pool.current_num_threads()),
        collapse: resolved.metrics.collapse,
        started_at: clock.now(),
    };
    store.write_manifest(&manifest)?;

    let units: Vec<(&ConditionConfig, usize)> = resolved
        .experiment
        .conditions
        .iter()
        .flat_map(|c| (0..resolved.experiment.replicates).map(move |r| (c, r)))
        .collect();

    log::info!(
        "run {}: {} conditions × {} replicates on {} threads (config {})",
        run_id,
        resolved.experiment.conditions.len(),
        resolved.experiment.replicates,
        pool.current_num_threads(),
        &manifest.config_hash[..12]
    );

    let ctx = RunContext {
        config: &resolved,
        payoff_matrix,
        run_id: run_id.clone(),
        store,
        clock,
    };
    let reports: Vec<UnitReport> = pool.install(|| {
        units
            .par_iter()
            .map(|(condition, replicate)| run_unit(&ctx, condition, *replicate))
            .collect()
    });

    let table = compute_aggregates(&ctx.store, &manifest, manifest.collapse)?;
    ctx.store.write_aggregates(&table)?;

    let report = RunReport {
        manifest,
        units: reports,
        finished_at: clock.now(),
    };
    let failed = report.failed_units().count();
    if failed > 0 {
        log::warn!("run {}: {} of {} units failed", run_id, failed, report.units.len());
    }
    log::info!("run {} finished in {}", run_id, ctx.store.run_dir().display());
    Ok(report)
}

fn run_unit(ctx: &RunContext<'_>, condition: &ConditionConfig, replicate: usize) -> UnitReport {
    let status = match play_unit(ctx, condition, replicate) {
        Ok(status) => status,
        Err(e) => {
            log::error!("unit ({}, {}) failed: {}", condition.name, replicate, e);
            UnitStatus::Failed {
                reason: e.to_string(),
            }
        }
    };
    let report = UnitReport {
        condition: condition.name.clone(),
        replicate,
        partition: partition_relpath(&condition.name, replicate),
        status,
    };
    if let Err(e) = ctx.store.write_unit_report(&report) {
        log::error!("unit ({}, {}): outcome not recorded: {}", condition.name, replicate, e);
    }
    report
}

fn play_unit(ctx: &RunContext<'_>, condition: &ConditionConfig, replicate: usize) -> Result<UnitStatus, RunError> {
    let seeds = UnitSeeds::derive(ctx.config.run.seed, &condition.name, replicate);
    let agent_a = create_agent(&condition.agent_a)?;
    let agent_b = create_agent(&condition.agent_b)?;
    let horizon = HorizonPolicy::from_config(&ctx.config.horizon, seeds.horizon);

    let record_ctx = RecordContext {
        run_id: ctx.run_id.clone(),
        condition: condition.name.clone(),
        replicate,
        horizon: horizon.info(),
        store_prompts: ctx.config.run.store_prompts,
        store_raw_responses: ctx.config.run.store_raw_responses,
    };
    let mut writer = ctx.store.create_partition(&condition.name, replicate)?;

    let mut game = GameLoop::new(&ctx.payoff_matrix, horizon, agent_a, agent_b, ctx.clock, seeds);
    while let Some(round) = game.play_round() {
        writer.append(&RoundRecord::from_round(round, &record_ctx))?;
    }
    let rounds = writer.finish()?;
    let (fallbacks_a, fallbacks_b) = game.event_log().fallback_counts();

    log::debug!(
        "unit ({}, {}) completed: {} rounds, {} fallbacks",
        condition.name,
        replicate,
        rounds,
        fallbacks_a + fallbacks_b
    );
    Ok(UnitStatus::Completed {
        rounds,
        horizon_cap_hit: game.horizon_cap_hit(),
        fallbacks_a,
        fallbacks_b,
    })
}

/// Recompute aggregates from the rounds stored in `run_dir`
///
/// Idempotent: the table depends only on persisted rounds, unit outcomes and
/// the manifest. Also works on a run that never finished: units without an
/// outcome record contribute whatever rounds their partition holds.
pub fn aggregate(run_dir: &Path) -> Result<AggregateTable, RunError> {
    aggregate_with(run_dir, None)
}

/// As [`aggregate`], optionally overriding the manifest's collapse parameters
pub fn aggregate_with(run_dir: &Path, collapse: Option<CollapseConfig>) -> Result<AggregateTable, RunError> {
    if let Some(collapse) = &collapse {
        collapse.validate().map_err(|e| e.within("collapse"))?;
    }
    let store = TranscriptStore::open(run_dir)?;
    let manifest = store.read_manifest()?;
    let collapse = collapse.unwrap_or(manifest.collapse);

    let table = compute_aggregates(&store, &manifest, collapse)?;
    store.write_aggregates(&table)?;
    log::info!(
        "aggregated {} replicates across {} conditions for run {}",
        table.replicates.len(),
        table.conditions.len(),
        table.run_id
    );
    Ok(table)
}

fn compute_aggregates(
    store: &TranscriptStore,
    manifest: &RunManifest,
    collapse: CollapseConfig,
) -> Result<AggregateTable, StoreError> {
    let mut replicates = Vec::new();
    let mut conditions = Vec::new();

    for name in manifest.condition_names() {
        let mut metrics = Vec::new();
        for replicate in 0..manifest.replicates() {
            match store.read_unit_report(name, replicate)? {
                Some(unit) if !unit.is_completed() => {
                    log::warn!("skipping failed unit ({}, {}) in aggregates", name, replicate);
                    continue;
                }
                Some(_) => {}
                None if store.has_partition(name, replicate) => {
                    log::warn!(
                        "unit ({}, {}) has no outcome record; aggregating its stored rounds",
                        name,
                        replicate
                    );
                }
                None => {
                    log::warn!("unit ({}, {}) never started; skipping", name, replicate);
                    continue;
                }
            }

            let rounds = store.read_partition(name, replicate)?;
            if rounds.is_empty() {
                log::warn!("unit ({}, {}) stored no rounds; skipping", name, replicate);
                continue;
            }
            metrics.push(ReplicateMetrics::compute(name, replicate, &rounds, &collapse));
        }

        conditions.push(ConditionAggregate::from_replicates(name, &metrics));
        replicates.extend(metrics);
    }

    Ok(AggregateTable {
        run_id: manifest.run_id.clone(),
        collapse,
        replicates,
        conditions,
    })
}
