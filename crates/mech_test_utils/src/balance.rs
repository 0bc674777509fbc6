//! Balance testing utilities for headless simulation.
//!
//! Tools for running many seeded battles to check that loadouts and
//! personalities are balanced, plus static hits-to-break estimates.

use mech_core::combat::{calculate_damage, DamageInput};
use mech_core::components::{PartKey, TeamId};
use mech_core::config::BattleConfig;
use mech_core::data::{CombatantData, PartData, RosterData};
use mech_core::error::Result;
use mech_core::simulation::Battle;

/// Result of a simulated battle.
#[derive(Debug, Clone)]
pub struct BattleResult {
    /// The winning team (None if draw/timeout).
    pub winner: Option<TeamId>,
    /// Ticks elapsed.
    pub ticks: u64,
    /// Remaining HP of team A, summed over all parts.
    pub remaining_hp_a: u32,
    /// Remaining HP of team B, summed over all parts.
    pub remaining_hp_b: u32,
}

/// Statistics for a set of battles between team A and team B.
#[derive(Debug, Clone, Default)]
pub struct BattleStats {
    /// Total battles run.
    pub total_battles: u32,
    /// Wins for team A.
    pub wins_a: u32,
    /// Wins for team B.
    pub wins_b: u32,
    /// Draws (timeouts or simultaneous elimination).
    pub draws: u32,
    /// Average ticks to resolution.
    pub avg_ticks: f64,
}

impl BattleStats {
    /// Fold one result in. `team_a` identifies team A.
    pub fn record(&mut self, result: &BattleResult, team_a: TeamId) {
        let n = f64::from(self.total_battles);
        self.avg_ticks = (self.avg_ticks * n + result.ticks as f64) / (n + 1.0);
        self.total_battles += 1;
        match result.winner {
            Some(team) if team == team_a => self.wins_a += 1,
            Some(_) => self.wins_b += 1,
            None => self.draws += 1,
        }
    }

    /// Calculate win rate for team A (0.0 to 1.0).
    pub fn win_rate_a(&self) -> f64 {
        if self.total_battles == 0 {
            return 0.5;
        }
        f64::from(self.wins_a) / f64::from(self.total_battles)
    }

    /// Calculate win rate for team B (0.0 to 1.0).
    pub fn win_rate_b(&self) -> f64 {
        if self.total_battles == 0 {
            return 0.5;
        }
        f64::from(self.wins_b) / f64::from(self.total_battles)
    }

    /// Check if matchup is balanced (within acceptable range).
    pub fn is_balanced(&self, min_rate: f64, max_rate: f64) -> bool {
        let rate = self.win_rate_a();
        rate >= min_rate && rate <= max_rate
    }
}

fn team_hp(battle: &Battle, team: TeamId) -> u32 {
    battle
        .roster()
        .iter()
        .filter(|c| c.team == team)
        .map(|c| c.parts.total_hp())
        .sum()
}

/// Run one battle to completion with the given seed.
pub fn run_battle(roster: &RosterData, seed: u64, max_ticks: u64) -> Result<BattleResult> {
    let config = BattleConfig {
        seed,
        ..BattleConfig::default()
    };
    let mut battle = Battle::new(config, roster)?;
    let outcome = battle.run_to_completion(max_ticks);
    let (team_a, team_b) = (roster.teams[0].id, roster.teams[1].id);
    Ok(BattleResult {
        winner: outcome.and_then(|o| o.winning_team),
        ticks: battle.current_tick(),
        remaining_hp_a: team_hp(&battle, team_a),
        remaining_hp_b: team_hp(&battle, team_b),
    })
}

/// Run a matchup across `seeds` and collect statistics for the first team.
pub fn run_matchup(
    roster: &RosterData,
    seeds: impl IntoIterator<Item = u64>,
    max_ticks: u64,
) -> Result<BattleStats> {
    let mut stats = BattleStats::default();
    let team_a = roster.teams.first().map_or(0, |t| t.id);
    for seed in seeds {
        stats.record(&run_battle(roster, seed, max_ticks)?, team_a);
    }
    Ok(stats)
}

/// Non-critical hits `attacker` needs to break `key` on `defender`, or
/// `None` when a hit deals no damage.
pub fn hits_to_break(attacker: &PartData, defender: &CombatantData, key: PartKey) -> Option<u32> {
    let target = defender.part(key);
    let damage = calculate_damage(DamageInput {
        base: attacker.stats.success,
        power: attacker.stats.might,
        defender_mobility: defender.legs.stats.mobility,
        total_defense: defender.legs.stats.defense.saturating_add(target.stats.defense),
        is_critical: false,
        defense_bypassed: attacker.traits.ignores_defense,
    });
    (damage > 0).then(|| target.max_hp.div_ceil(damage))
}
