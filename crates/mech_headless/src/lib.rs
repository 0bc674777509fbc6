//! Headless battle runner for AI testing, balance batches and CI.
//!
//! This crate drives the battle core without any presentation layer:
//!
//! - **Single runs**: one seeded battle, tick reports streamed as JSON lines
//! - **Batches**: many seeds in parallel with a win-rate summary
//! - **Determinism checks**: the same seed replayed must hash identically
//!
//! # Output
//!
//! - **stdout**: JSON lines (tick reports, then a summary)
//! - **stderr**: logs (human-readable)
//!
//! # Example
//!
//! ```bash
//! # Run a built-in scenario
//! cargo run -p mech_headless -- run --scenario duel --seed 7
//!
//! # Run a scenario file
//! cargo run -p mech_headless -- run --scenario my_scenario.ron
//!
//! # Balance batch
//! cargo run -p mech_headless -- batch --scenario skirmish_3v3 --count 500 --output results/
//!
//! # Verify determinism
//! cargo run -p mech_headless -- verify --seed 12345 --runs 5
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod metrics;
pub mod runner;
pub mod scenario;

pub use batch::{run_batch, verify_determinism, BatchConfig, BatchResults, DeterminismReport};
pub use metrics::{BatchSummary, GameMetrics, MetricsCollector, TeamMetrics};
pub use runner::{run_battle, BattleRunner, RunError, DEFAULT_MAX_TICKS};
pub use scenario::{Scenario, ScenarioError, BUILTIN_SCENARIOS};
