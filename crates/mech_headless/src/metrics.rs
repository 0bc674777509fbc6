//! Battle metrics collection for balance analysis.
//!
//! A [`MetricsCollector`] folds the tick reports of one battle into a
//! [`GameMetrics`]; [`BatchSummary`] aggregates many of those.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use mech_core::components::{EntityId, TeamId};
use mech_core::events::{BattleEvent, TickReport};
use mech_core::simulation::Battle;

/// Complete metrics for a single battle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameMetrics {
    /// Unique game identifier.
    pub game_id: String,
    /// Scenario name.
    pub scenario: String,
    /// Random seed used.
    pub seed: u64,
    /// Total battle duration in ticks.
    pub duration_ticks: u64,
    /// Simulated time in milliseconds.
    pub elapsed_ms: u64,
    /// Winning team. `None` for a draw or a timeout.
    pub winner: Option<TeamId>,
    /// Whether the battle reached game over before the tick limit.
    pub finished: bool,
    /// Per-team metrics.
    pub teams: BTreeMap<TeamId, TeamMetrics>,
    /// Final battle state hash (for determinism validation).
    pub final_state_hash: u64,
}

impl GameMetrics {
    /// Create a new game metrics instance.
    #[must_use]
    pub fn new(game_id: impl Into<String>, scenario: impl Into<String>, seed: u64) -> Self {
        Self {
            game_id: game_id.into(),
            scenario: scenario.into(),
            seed,
            ..Default::default()
        }
    }

    /// Get or create team metrics.
    pub fn team_mut(&mut self, team: TeamId) -> &mut TeamMetrics {
        self.teams.entry(team).or_insert_with(|| TeamMetrics::new(team))
    }
}

/// Metrics for one team in a battle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMetrics {
    /// Team identifier.
    pub team: TeamId,
    /// Actions that resolved.
    pub actions_executed: u32,
    /// Actions cancelled before resolving.
    pub actions_cancelled: u32,
    /// HP removed from enemy parts.
    pub damage_dealt: u64,
    /// HP lost by this team's parts.
    pub damage_taken: u64,
    /// HP restored by this team.
    pub healing_done: u64,
    /// This team's parts that broke.
    pub parts_lost: u32,
    /// This team's combatants that were defeated.
    pub combatants_lost: u32,
    /// Attacks this team's guardians intercepted.
    pub guard_interceptions: u32,
    /// Tick of this team's first executed action.
    pub first_action_tick: Option<u64>,
}

impl TeamMetrics {
    /// Create new team metrics.
    #[must_use]
    pub fn new(team: TeamId) -> Self {
        Self {
            team,
            ..Default::default()
        }
    }
}

// ============================================================================
// Collector
// ============================================================================

/// Accumulates metrics from tick reports.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    metrics: GameMetrics,
    teams_by_entity: BTreeMap<EntityId, TeamId>,
}

impl MetricsCollector {
    /// Start collecting for a battle. Every team gets an entry up front.
    #[must_use]
    pub fn new(battle: &Battle, game_id: impl Into<String>, scenario: impl Into<String>) -> Self {
        let mut metrics = GameMetrics::new(game_id, scenario, battle.config().seed);
        let teams_by_entity: BTreeMap<EntityId, TeamId> =
            battle.roster().iter().map(|c| (c.id, c.team)).collect();
        for team in teams_by_entity.values() {
            metrics.team_mut(*team);
        }
        Self {
            metrics,
            teams_by_entity,
        }
    }

    /// Fold one tick report in.
    pub fn record(&mut self, report: &TickReport) {
        for event in &report.events {
            self.record_event(event);
        }
        for result in &report.results {
            let Some(team) = self.team_of(result.actor_id) else {
                continue;
            };
            let metrics = self.metrics.team_mut(team);
            if result.cancelled.is_some() {
                continue;
            }
            metrics.actions_executed += 1;
            metrics.damage_dealt += u64::from(result.damage_dealt);
            metrics.healing_done += u64::from(result.healing_done);
            metrics.first_action_tick.get_or_insert(report.tick);
        }
    }

    fn record_event(&mut self, event: &BattleEvent) {
        match *event {
            BattleEvent::HpChanged {
                entity_id,
                old_hp,
                new_hp,
                is_heal: false,
                ..
            } => {
                if let Some(team) = self.team_of(entity_id) {
                    self.metrics.team_mut(team).damage_taken +=
                        u64::from(old_hp.saturating_sub(new_hp));
                }
            }
            BattleEvent::PartBroken { entity_id, .. } => {
                if let Some(team) = self.team_of(entity_id) {
                    self.metrics.team_mut(team).parts_lost += 1;
                }
            }
            BattleEvent::CombatantDefeated { team, .. } => {
                self.metrics.team_mut(team).combatants_lost += 1;
            }
            BattleEvent::ActionCancelled { entity_id, .. } => {
                if let Some(team) = self.team_of(entity_id) {
                    self.metrics.team_mut(team).actions_cancelled += 1;
                }
            }
            BattleEvent::GuardIntercepted { guardian_id, .. } => {
                if let Some(team) = self.team_of(guardian_id) {
                    self.metrics.team_mut(team).guard_interceptions += 1;
                }
            }
            _ => {}
        }
    }

    fn team_of(&self, id: EntityId) -> Option<TeamId> {
        self.teams_by_entity.get(&id).copied()
    }

    /// Finalize with the battle's end state.
    #[must_use]
    pub fn finish(mut self, battle: &Battle) -> GameMetrics {
        self.metrics.duration_ticks = battle.current_tick();
        self.metrics.elapsed_ms = battle.elapsed_ms();
        self.metrics.finished = battle.is_over();
        self.metrics.winner = battle.outcome().and_then(|o| o.winning_team);
        self.metrics.final_state_hash = battle.state_hash();
        self.metrics
    }
}

// ============================================================================
// Batch Summary
// ============================================================================

/// Aggregate statistics across many battles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Battles played.
    pub total_games: u32,
    /// Wins per team.
    pub wins: BTreeMap<TeamId, u32>,
    /// Win rate per team (0.0 to 1.0).
    pub win_rates: BTreeMap<TeamId, f64>,
    /// Battles where every team fell together.
    pub draws: u32,
    /// Battles cut off by the tick limit.
    pub timeouts: u32,
    /// Mean battle length in ticks.
    pub avg_duration_ticks: f64,
    /// Shortest battle in ticks.
    pub min_duration_ticks: u64,
    /// Longest battle in ticks.
    pub max_duration_ticks: u64,
    /// Mean damage dealt per battle, per team.
    pub avg_damage_dealt: BTreeMap<TeamId, f64>,
    /// Mean actions cancelled per battle, per team.
    pub avg_actions_cancelled: BTreeMap<TeamId, f64>,
}

impl BatchSummary {
    /// Calculate summary from game metrics.
    #[must_use]
    pub fn from_games(games: &[GameMetrics]) -> Self {
        let mut summary = Self {
            total_games: games.len() as u32,
            ..Default::default()
        };
        if games.is_empty() {
            return summary;
        }

        let mut damage: BTreeMap<TeamId, u64> = BTreeMap::new();
        let mut cancelled: BTreeMap<TeamId, u64> = BTreeMap::new();
        let mut total_ticks = 0u64;
        summary.min_duration_ticks = u64::MAX;

        for game in games {
            match (game.finished, game.winner) {
                (true, Some(team)) => *summary.wins.entry(team).or_insert(0) += 1,
                (true, None) => summary.draws += 1,
                (false, _) => summary.timeouts += 1,
            }
            for (team, metrics) in &game.teams {
                summary.wins.entry(*team).or_insert(0);
                *damage.entry(*team).or_insert(0) += metrics.damage_dealt;
                *cancelled.entry(*team).or_insert(0) += u64::from(metrics.actions_cancelled);
            }
            total_ticks += game.duration_ticks;
            summary.min_duration_ticks = summary.min_duration_ticks.min(game.duration_ticks);
            summary.max_duration_ticks = summary.max_duration_ticks.max(game.duration_ticks);
        }

        let n = games.len() as f64;
        summary.avg_duration_ticks = total_ticks as f64 / n;
        summary.win_rates = summary
            .wins
            .iter()
            .map(|(team, wins)| (*team, f64::from(*wins) / n))
            .collect();
        summary.avg_damage_dealt = damage
            .into_iter()
            .map(|(team, total)| (team, total as f64 / n))
            .collect();
        summary.avg_actions_cancelled = cancelled
            .into_iter()
            .map(|(team, total)| (team, total as f64 / n))
            .collect();
        summary
    }

    /// Whether every team's win rate is within `threshold` of an even split.
    #[must_use]
    pub fn is_balanced(&self, threshold: f64) -> bool {
        if self.win_rates.is_empty() {
            return true;
        }
        let even = 1.0 / self.win_rates.len() as f64;
        self.win_rates
            .values()
            .all(|rate| (rate - even).abs() <= threshold)
    }

    /// The team winning more than `threshold` above an even split, if any.
    #[must_use]
    pub fn dominant_team(&self, threshold: f64) -> Option<TeamId> {
        if self.win_rates.is_empty() {
            return None;
        }
        let even = 1.0 / self.win_rates.len() as f64;
        self.win_rates
            .iter()
            .find(|(_, rate)| **rate - even > threshold)
            .map(|(team, _)| *team)
    }
}
