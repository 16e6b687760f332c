//! pdbench - command line front end for the Prisoner's Dilemma benchmark
//!
//! ```text
//! pdbench validate <config.yaml>
//! pdbench run <config.yaml> [--replicates N] [--output-dir DIR] [--dry-run]
//! pdbench aggregate <run_dir> [--collapse-k K] [--collapse-threshold T]
//! ```

mod loader;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pdbench_core_rs::config::CollapseConfig;
use pdbench_core_rs::{aggregate_with, preflight, run, TranscriptStore};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pdbench", version, about = "Iterated Prisoner's Dilemma benchmark")]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check an experiment configuration without running it
    Validate {
        /// Experiment YAML
        config: PathBuf,
    },

    /// Run every condition×replicate unit of an experiment
    Run {
        /// Experiment YAML
        config: PathBuf,

        /// Override the number of replicates per condition
        #[arg(long)]
        replicates: Option<usize>,

        /// Override the output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Validate and list the units without playing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Recompute aggregates of a run from its stored rounds
    Aggregate {
        /// Run directory (contains manifest.json)
        run_dir: PathBuf,

        /// Override the collapse window size
        #[arg(long)]
        collapse_k: Option<usize>,

        /// Override the collapse cooperation threshold
        #[arg(long)]
        collapse_threshold: Option<f64>,
    },
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    simplelog::TermLogger::init(
        level,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .context("failed to initialize logger")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Command::Validate { config } => {
            let experiment = loader::load_experiment(&config)?;
            preflight(&experiment)?;
            println!(
                "Config valid: {} ({} conditions × {} replicates)",
                config.display(),
                experiment.experiment.conditions.len(),
                experiment.experiment.replicates
            );
        }

        Command::Run {
            config,
            replicates,
            output_dir,
            dry_run,
        } => {
            let mut experiment = loader::load_experiment(&config)?;
            if let Some(replicates) = replicates {
                experiment.experiment.replicates = replicates;
            }
            if let Some(output_dir) = output_dir {
                experiment.run.output_dir = output_dir;
            }

            if dry_run {
                preflight(&experiment)?;
                for condition in &experiment.experiment.conditions {
                    println!(
                        "{}: {} vs {} × {} replicates",
                        condition.name,
                        condition.agent_a.label(),
                        condition.agent_b.label(),
                        experiment.experiment.replicates
                    );
                }
                return Ok(());
            }

            let report = run(&experiment)?;
            let failed = report.failed_units().count();
            println!(
                "Run {} complete: {} units, {} failed",
                report.run_id(),
                report.units.len(),
                failed
            );
            println!(
                "Output: {}",
                experiment.run.output_dir.join(report.run_id()).display()
            );
            if failed > 0 {
                anyhow::bail!("{} units failed", failed);
            }
        }

        Command::Aggregate {
            run_dir,
            collapse_k,
            collapse_threshold,
        } => {
            let collapse = match (collapse_k, collapse_threshold) {
                (None, None) => None,
                (k, threshold) => {
                    let manifest = TranscriptStore::open(&run_dir)?.read_manifest()?;
                    Some(CollapseConfig {
                        k: k.unwrap_or(manifest.collapse.k),
                        threshold: threshold.unwrap_or(manifest.collapse.threshold),
                    })
                }
            };

            let table = aggregate_with(&run_dir, collapse)?;
            for condition in &table.conditions {
                let pooled = condition
                    .cooperation_rate_pooled
                    .as_ref()
                    .map(|s| format!("{:.3}", s.mean))
                    .unwrap_or_else(|| "n/a".to_string());
                println!(
                    "{}: {} replicates, pooled cooperation {}, {} collapsed",
                    condition.condition, condition.replicates, pooled, condition.collapsed_replicates
                );
            }
        }
    }

    Ok(())
}
