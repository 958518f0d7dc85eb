//! spotter - companion CLI
//!
//! Subcommands:
//! - `spotter simulate` - Replay a workout plan against a simulated wearable
//! - `spotter config` - Show the effective configuration and its sources
//! - `spotter history list|show` - Browse archived workouts

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use spotconf::SpotConfig;
use spotproto::SessionId;
use spotter::history::{Access, HistoryArchive};
use spotter::plan::WorkoutPlan;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "spotter")]
#[command(about = "Workout session companion")]
#[command(version)]
struct Cli {
    /// Config file (replaces ./spotter.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a plan end to end with a simulated wearable and lifter
    Simulate {
        /// Workout plan (TOML); the built-in demo plan if omitted
        #[arg(short, long)]
        plan: Option<PathBuf>,

        /// Keep the record in memory instead of the history directory
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the effective configuration
    Config,

    /// Browse archived workouts
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List archived workouts, oldest first
    List,

    /// Summarize one archived workout
    Show {
        /// Session id
        id: String,

        /// Show premium telemetry fields
        #[arg(long)]
        premium: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, sources) = SpotConfig::load_with_sources_from(cli.config.as_deref())
        .context("failed to load configuration")?;
    spotter::telemetry::init(&config.telemetry.log_level)?;

    match cli.command {
        Commands::Simulate { plan, dry_run } => simulate(&config, plan, dry_run),
        Commands::Config => {
            for file in &sources.files {
                println!("# loaded {}", file.display());
            }
            for var in &sources.env_overrides {
                println!("# override {var}");
            }
            print!("{}", config.to_toml());
            Ok(())
        }
        Commands::History { action } => history(&config, action),
    }
}

fn simulate(config: &SpotConfig, plan: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let plan = match plan {
        Some(path) => WorkoutPlan::load(&path)?,
        None => WorkoutPlan::demo(),
    };
    let archive = if dry_run {
        HistoryArchive::in_memory()
    } else {
        HistoryArchive::open(&config.paths.history_dir)?
    };

    // Paused clock: timers and sampling run on virtual time.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .context("failed to build runtime")?;
    info!(plan = %plan.title, exercises = plan.exercises.len(), "simulating workout");
    let report = runtime.block_on(spotter::sim::simulate(config, plan, archive))?;

    println!("{}", serde_json::to_string_pretty(&report.record)?);
    eprintln!(
        "session {} archived as {} ({} sets, {} reps, {} migration issues, context rev {} acked)",
        report.record.id,
        report.hash.as_deref().unwrap_or("-"),
        report.record.sets().count(),
        report.record.total_reps,
        report.migration_issues,
        report.context_revisions_acked,
    );
    Ok(())
}

fn history(config: &SpotConfig, action: HistoryAction) -> Result<()> {
    let archive = HistoryArchive::open_read_only(&config.paths.history_dir);
    match action {
        HistoryAction::List => {
            let entries = archive.list()?;
            if entries.is_empty() {
                println!("no archived workouts in {}", config.paths.history_dir.display());
            }
            for entry in entries {
                println!(
                    "{}  {}  {}  {} bytes",
                    entry.stored_at.format("%Y-%m-%d %H:%M"),
                    entry.key,
                    entry.hash,
                    entry.size
                );
            }
        }
        HistoryAction::Show { id, premium } => {
            let id: SessionId = id
                .parse()
                .with_context(|| format!("invalid session id {id:?}"))?;
            let Some(record) = archive.load(id)? else {
                bail!("no archived workout {id}");
            };
            let access = Access::from_premium(premium);
            println!(
                "{} ({}), {} to {}, {} reps, volume {:.1}",
                record.plan_title,
                record.status,
                record.started_at.format("%Y-%m-%d %H:%M"),
                record.ended_at.format("%H:%M"),
                record.total_reps,
                record.total_volume
            );
            for exercise in &record.exercises {
                println!("  {} ({})", exercise.name, exercise.status);
                for set in &exercise.sets {
                    let view = set.view(access);
                    let motion = view
                        .motion
                        .map(|m| format!(", {} samples", m.samples))
                        .unwrap_or_default();
                    println!(
                        "    set {}: {}/{} reps at {:.1}{}",
                        set.order, set.achieved_reps, set.target_reps, set.weight, motion
                    );
                }
            }
        }
    }
    Ok(())
}
