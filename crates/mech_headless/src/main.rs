//! Headless mech battle runner.
//!
//! Runs battles without presentation. Tick reports go to stdout as JSON
//! lines, logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Single seeded battle
//! cargo run -p mech_headless -- run --scenario duel --seed 7
//!
//! # Run batch balance test
//! cargo run -p mech_headless -- batch --scenario skirmish_3v3 --count 1000 --output results/
//!
//! # Verify the same seed always ends identically
//! cargo run -p mech_headless -- verify --scenario skirmish_3v3 --seed 12345 --runs 5
//! ```

use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mech_headless::{
    batch::{run_batch, verify_determinism, BatchConfig},
    runner::{BattleRunner, DEFAULT_MAX_TICKS},
    scenario::{Scenario, BUILTIN_SCENARIOS},
};

#[derive(Parser)]
#[command(name = "mech_headless")]
#[command(about = "Headless mech battle runner for AI testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single battle and stream its events
    Run {
        /// Scenario file or built-in name
        #[arg(short, long, default_value = "skirmish_3v3")]
        scenario: String,

        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Stop after this many ticks
        #[arg(long, default_value_t = DEFAULT_MAX_TICKS)]
        max_ticks: u64,

        /// Only print the final summary
        #[arg(short, long)]
        quiet: bool,
    },

    /// Run batch of battles for balance testing
    Batch {
        /// Scenario file or built-in name
        #[arg(short, long, default_value = "skirmish_3v3")]
        scenario: String,

        /// Number of battles to run
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Maximum parallel battles (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Starting random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Stop each battle after this many ticks
        #[arg(long, default_value_t = DEFAULT_MAX_TICKS)]
        max_ticks: u64,
    },

    /// Verify determinism by running same seed multiple times
    Verify {
        /// Scenario file or built-in name
        #[arg(short, long, default_value = "skirmish_3v3")]
        scenario: String,

        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,

        /// Stop each battle after this many ticks
        #[arg(long, default_value_t = DEFAULT_MAX_TICKS)]
        max_ticks: u64,
    },

    /// List the built-in scenarios
    Scenarios,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries JSON lines
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let result = match cli.command {
        Commands::Run {
            scenario,
            seed,
            max_ticks,
            quiet,
        } => cmd_run(&scenario, seed, max_ticks, quiet),
        Commands::Batch {
            scenario,
            count,
            parallel,
            output,
            seed,
            max_ticks,
        } => cmd_batch(BatchConfig {
            scenario,
            game_count: count,
            parallel_games: parallel,
            output_dir: output,
            seed_start: seed,
            max_ticks,
        }),
        Commands::Verify {
            scenario,
            seed,
            runs,
            max_ticks,
        } => cmd_verify(&scenario, seed, runs, max_ticks),
        Commands::Scenarios => {
            for name in BUILTIN_SCENARIOS {
                println!("{name}");
            }
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            tracing::error!("{message}");
            ExitCode::FAILURE
        }
    }
}

/// Run a single battle
fn cmd_run(scenario: &str, seed: u64, max_ticks: u64, quiet: bool) -> Result<(), String> {
    let scenario = Scenario::resolve(scenario).map_err(|e| e.to_string())?;
    tracing::info!(scenario = %scenario.name, seed, max_ticks, "starting battle");

    let runner = BattleRunner::new(&scenario, seed, max_ticks).map_err(|e| e.to_string())?;
    if quiet {
        let metrics = runner.run();
        let json = serde_json::to_string(&metrics).map_err(|e| e.to_string())?;
        println!("{json}");
        return Ok(());
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    runner
        .run_streaming(&mut out)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Run batch of battles for balance testing
fn cmd_batch(config: BatchConfig) -> Result<(), String> {
    let output = config.output_dir.clone();
    std::fs::create_dir_all(&output).map_err(|e| {
        format!("Cannot create output directory '{}': {e}", output.display())
    })?;

    let results = run_batch(config).map_err(|e| e.to_string())?;

    let results_path = output.join("batch_results.json");
    results
        .save(&results_path)
        .map_err(|e| format!("Failed to save results: {e}"))?;

    let summary = &results.summary;
    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Battles played: {}", summary.total_games);
    if !results.errors.is_empty() {
        eprintln!("Battles failed: {}", results.errors.len());
    }
    eprintln!("Duration: {:.1}s", results.duration_seconds);
    eprintln!("Avg length: {:.0} ticks", summary.avg_duration_ticks);
    eprintln!("Draws: {}  Timeouts: {}", summary.draws, summary.timeouts);
    for (team, rate) in &summary.win_rates {
        eprintln!("Team {team} win rate: {:.1}%", rate * 100.0);
    }
    if let Some(team) = summary.dominant_team(0.1) {
        eprintln!("WARNING: team {team} dominates this matchup");
    }
    eprintln!("Results saved to: {}", results_path.display());

    if results.errors.is_empty() {
        Ok(())
    } else {
        Err(format!("{} battles failed", results.errors.len()))
    }
}

/// Verify determinism by running same seed multiple times
fn cmd_verify(scenario: &str, seed: u64, runs: u32, max_ticks: u64) -> Result<(), String> {
    let scenario = Scenario::resolve(scenario).map_err(|e| e.to_string())?;
    tracing::info!(
        "Verifying determinism: {} with seed {} ({} runs)",
        scenario.name,
        seed,
        runs
    );

    let report =
        verify_determinism(&scenario, seed, runs, max_ticks).map_err(|e| e.to_string())?;
    if report.deterministic {
        eprintln!("PASS: All {runs} runs produced identical results");
        Ok(())
    } else {
        Err(format!("Non-determinism detected: hashes {:?}", report.hashes))
    }
}
