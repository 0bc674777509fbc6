//! Batch battle runner for balance testing.
//!
//! Runs many seeded battles in parallel using rayon to collect balance
//! metrics, and checks determinism by replaying one seed several times.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use mech_core::components::TeamId;

use crate::metrics::{BatchSummary, GameMetrics};
use crate::runner::{run_battle, DEFAULT_MAX_TICKS};
use crate::scenario::{Scenario, ScenarioError};

/// Configuration for a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Scenario file path or built-in name.
    pub scenario: String,
    /// Number of battles to run.
    pub game_count: u32,
    /// Worker threads (0 = rayon default).
    pub parallel_games: u32,
    /// Output directory for results.
    pub output_dir: PathBuf,
    /// Seed of the first battle; battle `i` uses `seed_start + i`.
    pub seed_start: u64,
    /// Maximum ticks per battle.
    pub max_ticks: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenario: "skirmish_3v3".to_string(),
            game_count: 100,
            parallel_games: 0,
            output_dir: PathBuf::from("results"),
            seed_start: 0,
            max_ticks: DEFAULT_MAX_TICKS,
        }
    }
}

impl BatchConfig {
    /// Create config for a specific scenario.
    #[must_use]
    pub fn new(scenario: &str, game_count: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            game_count,
            ..Default::default()
        }
    }

    /// Set output directory.
    #[must_use]
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// Set seed start.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Set the per-battle tick limit.
    #[must_use]
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }
}

/// Results from a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used.
    pub config: BatchConfig,
    /// Individual battle metrics, in seed order.
    pub games: Vec<GameMetrics>,
    /// Aggregate summary.
    pub summary: BatchSummary,
    /// Total runtime.
    pub duration_seconds: f64,
    /// Errors encountered.
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to a JSON file.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from a JSON file.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// A battle that could not be run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    /// Battle index.
    pub game_index: u32,
    /// Seed used.
    pub seed: u64,
    /// Error message.
    pub message: String,
}

// ============================================================================
// Progress
// ============================================================================

/// Progress tracking for batch runs.
#[derive(Debug)]
pub struct BatchProgress {
    /// Total battles.
    pub total: u32,
    completed: AtomicU32,
    start_time: Instant,
    partial_wins: Mutex<BTreeMap<TeamId, u32>>,
}

impl BatchProgress {
    /// Create new progress tracker.
    #[must_use]
    pub fn new(total: u32) -> Self {
        Self {
            total,
            completed: AtomicU32::new(0),
            start_time: Instant::now(),
            partial_wins: Mutex::new(BTreeMap::new()),
        }
    }

    /// Record a completed battle.
    pub fn record_completion(&self, winner: Option<TeamId>) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if let Some(team) = winner {
            if let Ok(mut wins) = self.partial_wins.lock() {
                *wins.entry(team).or_insert(0) += 1;
            }
        }
    }

    /// Current completion count.
    pub fn current(&self) -> u32 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Completion percentage.
    pub fn percentage(&self) -> f64 {
        f64::from(self.current()) / f64::from(self.total.max(1)) * 100.0
    }

    /// Estimated time remaining.
    pub fn eta(&self) -> Duration {
        let completed = self.current();
        if completed == 0 {
            return Duration::from_secs(0);
        }
        let per_game = self.start_time.elapsed().as_secs_f64() / f64::from(completed);
        let remaining = self.total.saturating_sub(completed);
        Duration::from_secs_f64(per_game * f64::from(remaining))
    }

    /// Win rates of the battles completed so far.
    pub fn current_win_rates(&self) -> BTreeMap<TeamId, f64> {
        let completed = self.current();
        if completed == 0 {
            return BTreeMap::new();
        }
        self.partial_wins
            .lock()
            .map(|wins| {
                wins.iter()
                    .map(|(team, w)| (*team, f64::from(*w) / f64::from(completed)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Display progress to stderr.
    pub fn display(&self) {
        let eta = self.eta();
        eprintln!(
            "Batch progress: {}/{} ({:.1}%), ETA {}m {}s",
            self.current(),
            self.total,
            self.percentage(),
            eta.as_secs() / 60,
            eta.as_secs() % 60
        );
        for (team, rate) in self.current_win_rates() {
            eprintln!("  team {team}: {:.1}%", rate * 100.0);
        }
    }
}

// ============================================================================
// Running
// ============================================================================

/// Run a batch of battles.
///
/// The scenario is resolved once; a scenario that cannot be loaded fails
/// the whole batch, while a battle that fails to start is recorded in
/// [`BatchResults::errors`].
pub fn run_batch(config: BatchConfig) -> Result<BatchResults, ScenarioError> {
    let scenario = Scenario::resolve(&config.scenario)?;
    let start = Instant::now();
    let progress = BatchProgress::new(config.game_count);

    info!(
        games = config.game_count,
        scenario = %scenario.name,
        seed_start = config.seed_start,
        "starting batch run"
    );

    let run_all = || -> Vec<Result<GameMetrics, BatchError>> {
        (0..config.game_count)
            .into_par_iter()
            .map(|i| {
                let seed = config.seed_start.wrapping_add(u64::from(i));
                match run_battle(&scenario, seed, config.max_ticks) {
                    Ok(metrics) => {
                        progress.record_completion(metrics.winner);
                        let completed = progress.current();
                        if completed % 10 == 0 {
                            debug!("progress: {}/{}", completed, config.game_count);
                        }
                        if completed % 100 == 0 {
                            progress.display();
                        }
                        Ok(metrics)
                    }
                    Err(e) => {
                        warn!(game = i, seed, error = %e, "battle failed");
                        Err(BatchError {
                            game_index: i,
                            seed,
                            message: e.to_string(),
                        })
                    }
                }
            })
            .collect()
    };

    let results = if config.parallel_games > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_games as usize)
            .build()
        {
            Ok(pool) => pool.install(run_all),
            Err(e) => {
                warn!(error = %e, "could not build thread pool, using the global one");
                run_all()
            }
        }
    } else {
        run_all()
    };

    let (games, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let games: Vec<GameMetrics> = games.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();

    let summary = BatchSummary::from_games(&games);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        "batch complete: {} battles in {:.1}s ({:.1} battles/sec)",
        games.len(),
        duration_seconds,
        games.len() as f64 / duration_seconds.max(f64::EPSILON)
    );

    Ok(BatchResults {
        config,
        games,
        summary,
        duration_seconds,
        errors,
    })
}

/// Outcome of replaying one seed several times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterminismReport {
    /// Seed replayed.
    pub seed: u64,
    /// Final state hash of each run.
    pub hashes: Vec<u64>,
    /// Whether every run ended identically.
    pub deterministic: bool,
}

/// Verify determinism by running the same seed `runs` times.
pub fn verify_determinism(
    scenario: &Scenario,
    seed: u64,
    runs: u32,
    max_ticks: u64,
) -> Result<DeterminismReport, ScenarioError> {
    let results = (0..runs)
        .map(|_| run_battle(scenario, seed, max_ticks))
        .collect::<Result<Vec<_>, _>>()?;

    let deterministic = results.windows(2).all(|pair| {
        pair[0].final_state_hash == pair[1].final_state_hash
            && pair[0].winner == pair[1].winner
            && pair[0].duration_ticks == pair[1].duration_ticks
    });
    if !deterministic {
        warn!(seed, "runs diverged");
    }
    Ok(DeterminismReport {
        seed,
        hashes: results.iter().map(|m| m.final_state_hash).collect(),
        deterministic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_config_default() {
        let config = BatchConfig::default();
        assert_eq!(config.game_count, 100);
        assert_eq!(config.scenario, "skirmish_3v3");
    }

    #[test]
    fn test_batch_config_builder() {
        let config = BatchConfig::new("duel", 500)
            .with_output(PathBuf::from("/tmp/results"))
            .with_seed(12345)
            .with_max_ticks(10);

        assert_eq!(config.scenario, "duel");
        assert_eq!(config.game_count, 500);
        assert_eq!(config.seed_start, 12345);
        assert_eq!(config.max_ticks, 10);
    }

    #[test]
    fn test_progress_tracking() {
        let progress = BatchProgress::new(100);
        assert_eq!(progress.current(), 0);
        assert_eq!(progress.percentage(), 0.0);

        progress.record_completion(Some(0));
        progress.record_completion(Some(1));
        progress.record_completion(Some(0));
        progress.record_completion(None);

        assert_eq!(progress.current(), 4);
        let rates = progress.current_win_rates();
        assert!((rates[&0] - 0.5).abs() < 1e-9);
        assert!((rates[&1] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_run_batch_small() {
        let results = run_batch(BatchConfig::new("duel", 10)).unwrap();

        assert_eq!(results.games.len(), 10);
        assert!(results.errors.is_empty());
        assert_eq!(results.summary.total_games, 10);
        let seeds: Vec<u64> = results.games.iter().map(|g| g.seed).collect();
        assert_eq!(seeds, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_run_batch_unknown_scenario() {
        assert!(matches!(
            run_batch(BatchConfig::new("nowhere", 1)),
            Err(ScenarioError::UnknownScenario(_))
        ));
    }

    #[test]
    fn test_verify_determinism() {
        let scenario = Scenario::builtin("skirmish_3v3").unwrap();
        let report = verify_determinism(&scenario, 12345, 3, 2_000).unwrap();
        assert!(report.deterministic);
        assert_eq!(report.hashes.len(), 3);
    }

    #[test]
    fn test_batch_results_save_load() {
        let results = run_batch(BatchConfig::new("duel", 4).with_seed(50)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        results.save(&path).unwrap();
        assert!(path.exists());

        let loaded = BatchResults::load(&path).unwrap();
        assert_eq!(loaded.games.len(), 4);
        assert_eq!(loaded.config, results.config);
        assert_eq!(loaded.summary.wins, results.summary.wins);
    }
}
