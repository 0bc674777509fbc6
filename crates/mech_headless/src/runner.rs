//! Single-battle runner.
//!
//! Drives [`Battle::tick`] at the configured interval and optionally
//! streams every non-empty tick report as one JSON object per line:
//!
//! ```text
//! {"type":"tick","tick":12,"events":[...],"visuals":[...],"results":[...]}
//! {"type":"summary","game_id":"duel_7","winner":0,...}
//! ```

use std::io::Write;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use mech_core::events::TickReport;
use mech_core::simulation::Battle;

use crate::metrics::{GameMetrics, MetricsCollector};
use crate::scenario::{Scenario, ScenarioError};

/// Default tick limit: ten simulated minutes at 20 ms per tick.
pub const DEFAULT_MAX_TICKS: u64 = 30_000;

/// Error type for battle runs.
#[derive(Error, Debug)]
pub enum RunError {
    /// The scenario could not be turned into a battle.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    /// Writing output failed.
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),
    /// Serializing output failed.
    #[error("Failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

/// One line of streamed output.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputLine<'a> {
    Tick(&'a TickReport),
    Summary(&'a GameMetrics),
}

/// Runs one seeded battle to completion.
#[derive(Debug)]
pub struct BattleRunner {
    battle: Battle,
    collector: MetricsCollector,
    max_ticks: u64,
}

impl BattleRunner {
    /// Start a battle from a scenario.
    pub fn new(scenario: &Scenario, seed: u64, max_ticks: u64) -> Result<Self, ScenarioError> {
        let battle = scenario.start(seed)?;
        let game_id = format!("{}_{seed}", scenario.name);
        let collector = MetricsCollector::new(&battle, game_id, scenario.name.clone());
        Ok(Self {
            battle,
            collector,
            max_ticks,
        })
    }

    /// The battle being run.
    #[must_use]
    pub fn battle(&self) -> &Battle {
        &self.battle
    }

    /// Whether another tick should run.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.battle.is_over() && self.battle.current_tick() < self.max_ticks
    }

    /// Advance one tick at the configured interval.
    pub fn step(&mut self) -> TickReport {
        let delta = u64::from(self.battle.config().update_interval_ms);
        let report = self.battle.tick(delta);
        self.collector.record(&report);
        report
    }

    /// Run without output and return the metrics.
    #[must_use]
    pub fn run(mut self) -> GameMetrics {
        while self.is_running() {
            if self.stalled() {
                break;
            }
            self.step();
        }
        self.finish()
    }

    /// Run, writing each non-empty tick report and a final summary as JSON
    /// lines.
    pub fn run_streaming<W: Write>(mut self, out: &mut W) -> Result<GameMetrics, RunError> {
        while self.is_running() {
            if self.stalled() {
                break;
            }
            let report = self.step();
            if !report.is_empty() {
                write_line(out, &OutputLine::Tick(&report))?;
            }
        }
        let metrics = self.finish();
        write_line(out, &OutputLine::Summary(&metrics))?;
        out.flush()?;
        Ok(metrics)
    }

    fn stalled(&self) -> bool {
        let waiting = self.battle.awaiting_input();
        if waiting.is_empty() {
            return false;
        }
        warn!(?waiting, "battle is waiting for input, stopping");
        true
    }

    fn finish(self) -> GameMetrics {
        let metrics = self.collector.finish(&self.battle);
        if metrics.finished {
            info!(
                game = %metrics.game_id,
                winner = ?metrics.winner,
                ticks = metrics.duration_ticks,
                "battle finished"
            );
        } else {
            info!(game = %metrics.game_id, ticks = metrics.duration_ticks, "battle timed out");
        }
        debug!(hash = metrics.final_state_hash, "final state hash");
        metrics
    }
}

fn write_line<W: Write>(out: &mut W, line: &OutputLine<'_>) -> Result<(), RunError> {
    serde_json::to_writer(&mut *out, line)?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Run one battle without output.
pub fn run_battle(
    scenario: &Scenario,
    seed: u64,
    max_ticks: u64,
) -> Result<GameMetrics, ScenarioError> {
    Ok(BattleRunner::new(scenario, seed, max_ticks)?.run())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duel_finishes() {
        let scenario = Scenario::builtin("duel").unwrap();
        let metrics = run_battle(&scenario, 7, DEFAULT_MAX_TICKS).unwrap();
        assert!(metrics.finished);
        assert!(metrics.duration_ticks > 0);
        assert_eq!(metrics.teams.len(), 2);
        assert_eq!(metrics.game_id, "duel_7");
    }

    #[test]
    fn test_tick_limit_stops_run() {
        let scenario = Scenario::builtin("skirmish_3v3").unwrap();
        let metrics = run_battle(&scenario, 1, 5).unwrap();
        assert!(!metrics.finished);
        assert_eq!(metrics.duration_ticks, 5);
        assert_eq!(metrics.winner, None);
    }

    #[test]
    fn test_streaming_writes_json_lines() {
        let scenario = Scenario::builtin("duel").unwrap();
        let runner = BattleRunner::new(&scenario, 3, DEFAULT_MAX_TICKS).unwrap();
        let mut out = Vec::new();
        let metrics = runner.run_streaming(&mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert!(lines.len() > 1);
        assert!(lines[..lines.len() - 1].iter().all(|l| l["type"] == "tick"));
        let summary = &lines[lines.len() - 1];
        assert_eq!(summary["type"], "summary");
        assert_eq!(summary["final_state_hash"], metrics.final_state_hash);
    }
}
