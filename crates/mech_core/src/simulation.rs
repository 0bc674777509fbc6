//! Battle loop.
//!
//! [`Battle`] owns every piece of battle state and advances it with
//! [`Battle::tick`]. All randomness flows through one injected
//! [`RandomSource`], so a battle built from the same data and seed always
//! produces the same ticks.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ai::{self, AiContext, PersonalityRegistry};
use crate::combat::{resolve_hit_outcome, HitOutcome, HitRoll};
use crate::components::{
    Action, ActionType, Combatant, CombatantState, EntityId, PartKey, StatKind, TeamId,
};
use crate::config::BattleConfig;
use crate::data::RosterData;
use crate::effects::{run_pipeline, EffectRegistry, PipelineRequest};
use crate::error::{BattleError, Result};
use crate::events::{
    ActionChosen, ActionResult, BattleEvent, CancelReason, StateCommand, StateUpdate, TickReport,
    VisualIntent,
};
use crate::history::{record_attack, BattleHistory};
use crate::math::Fixed;
use crate::readiness::{
    apply_state_update, apply_state_updates, check_queued_action, update_position, Scheduler,
};
use crate::rng::{pick, RandomSource, SeededRandom};
use crate::roster::Roster;
use crate::stats::{armor, effective_stat, mobility};
use crate::targeting::{best_defense_part, resolve_target, GuardianInfo};

/// How a battle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BattleOutcome {
    /// The last team standing; `None` when every team fell together.
    pub winning_team: Option<TeamId>,
    /// Tick on which the battle ended.
    pub tick: u64,
}

/// A running battle.
///
/// # Tick Order
///
/// Each tick runs these steps in order:
/// 1. **Integrity** - cancel charging actions whose part or target broke
/// 2. **Gauges** - advance or buffer readiness gauges
/// 3. **Selection** - AI combatants choose; human combatants wait for input
/// 4. **Execution** - at most one ready action resolves
/// 5. **Game over** - a team loses when its leader or all its members fall
/// 6. **Positions** - combatants move between home and the action line
pub struct Battle {
    config: BattleConfig,
    roster: Roster,
    scheduler: Scheduler,
    history: BattleHistory,
    registry: EffectRegistry,
    personalities: PersonalityRegistry,
    rng: Box<dyn RandomSource + Send>,
    tick: u64,
    elapsed_ms: u64,
    outcome: Option<BattleOutcome>,
    awaiting_input: BTreeSet<EntityId>,
}

impl fmt::Debug for Battle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Battle")
            .field("tick", &self.tick)
            .field("elapsed_ms", &self.elapsed_ms)
            .field("combatants", &self.roster.len())
            .field("outcome", &self.outcome)
            .field("awaiting_input", &self.awaiting_input)
            .finish_non_exhaustive()
    }
}

impl Battle {
    /// Build a battle from master data with the built-in personalities.
    ///
    /// Randomness is seeded from `config.seed`.
    pub fn new(config: BattleConfig, roster: &RosterData) -> Result<Self> {
        Self::with_personalities(config, roster, PersonalityRegistry::builtin())
    }

    /// Build a battle from master data with a custom personality registry.
    pub fn with_personalities(
        config: BattleConfig,
        roster: &RosterData,
        mut personalities: PersonalityRegistry,
    ) -> Result<Self> {
        let config = config.sanitized();
        if let Err(e) = personalities.set_fallback(&config.fallback_personality) {
            warn!(error = %e, "fallback personality not registered, keeping default");
        }
        let combatants = roster.build(&config, &personalities)?;
        let mut battle = Self::from_combatants(config, combatants);
        battle.personalities = personalities;
        Ok(battle)
    }

    /// Build a battle from already constructed combatants.
    #[must_use]
    pub fn from_combatants(config: BattleConfig, combatants: Vec<Combatant>) -> Self {
        let config = config.sanitized();
        let seed = config.seed;
        info!(
            seed,
            combatants = combatants.len(),
            "battle created"
        );
        Self {
            config,
            roster: Roster::new(combatants),
            scheduler: Scheduler::new(),
            history: BattleHistory::default(),
            registry: EffectRegistry::standard(),
            personalities: PersonalityRegistry::builtin(),
            rng: Box::new(SeededRandom::new(seed)),
            tick: 0,
            elapsed_ms: 0,
            outcome: None,
            awaiting_input: BTreeSet::new(),
        }
    }

    /// Replace the random source.
    #[must_use]
    pub fn with_random(mut self, rng: impl RandomSource + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    /// Replace the effect handler registry.
    #[must_use]
    pub fn with_effect_registry(mut self, registry: EffectRegistry) -> Self {
        self.registry = registry;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Battle tuning.
    #[must_use]
    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    /// All combatants.
    #[must_use]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// One combatant.
    #[must_use]
    pub fn combatant(&self, id: EntityId) -> Option<&Combatant> {
        self.roster.get(id)
    }

    /// Attack history.
    #[must_use]
    pub fn history(&self) -> &BattleHistory {
        &self.history
    }

    /// Readiness queues and buffered time.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Ticks run so far.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Simulated milliseconds so far.
    #[must_use]
    pub const fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// How the battle ended, once it has.
    #[must_use]
    pub const fn outcome(&self) -> Option<BattleOutcome> {
        self.outcome
    }

    /// Whether the battle has ended.
    #[must_use]
    pub const fn is_over(&self) -> bool {
        self.outcome.is_some()
    }

    /// Human-controlled combatants waiting for [`submit_action`](Self::submit_action).
    #[must_use]
    pub fn awaiting_input(&self) -> Vec<EntityId> {
        self.awaiting_input.iter().copied().collect()
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advance the battle by `delta_ms` of simulated time.
    ///
    /// Returns everything observable that happened. Once the battle is
    /// over this is a no-op.
    pub fn tick(&mut self, delta_ms: u64) -> TickReport {
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };
        if self.outcome.is_some() {
            return report;
        }
        self.elapsed_ms = self.elapsed_ms.saturating_add(delta_ms);

        self.run_integrity_checks(&mut report.events);
        self.scheduler
            .update(&mut self.roster, &self.config, delta_ms, &mut report.events);
        self.run_selection(&mut report.events);
        if let Some(id) = self.scheduler.pop_execute(&self.roster) {
            let result = self.execute_action(id, &mut report);
            report.results.push(result);
        }
        self.prune_awaiting_input();
        self.check_game_over(&mut report.events);
        for combatant in self.roster.iter_mut() {
            update_position(combatant, &self.config);
        }

        self.tick += 1;
        report.tick = self.tick;

        #[cfg(feature = "debug-validation")]
        self.assert_invariants();

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            debug!(tick = self.tick, state_hash = hash, "Battle state hash");
        }

        report
    }

    /// Tick at the configured interval until the battle ends, input is
    /// needed, or `max_ticks` have run.
    pub fn run_to_completion(&mut self, max_ticks: u64) -> Option<BattleOutcome> {
        let step = u64::from(self.config.update_interval_ms);
        for _ in 0..max_ticks {
            if self.outcome.is_some() || !self.awaiting_input.is_empty() {
                break;
            }
            self.tick(step);
        }
        self.outcome
    }

    fn run_integrity_checks(&mut self, events: &mut Vec<BattleEvent>) {
        for id in self.roster.in_state(CombatantState::SelectedCharging) {
            if let Some(reason) = check_queued_action(&self.roster, id) {
                debug!(entity = id, ?reason, "queued action cancelled");
                events.push(BattleEvent::ActionCancelled {
                    entity_id: id,
                    reason,
                });
                events.extend(apply_state_update(
                    &mut self.roster,
                    StateUpdate::new(id, StateCommand::ResetToCooldown { interrupted: true }),
                    &self.config,
                ));
            }
        }
    }

    fn run_selection(&mut self, events: &mut Vec<BattleEvent>) {
        while let Some(id) = self.scheduler.pop_select(&self.roster) {
            let Some(actor) = self.roster.get(id) else {
                continue;
            };
            if !actor.ai_controlled {
                self.awaiting_input.insert(id);
                continue;
            }
            let personality = self.personalities.resolve(&actor.personality);
            let ctx = AiContext {
                roster: &self.roster,
                history: &self.history,
            };
            let chosen = ai::decide(&ctx, id, personality, self.rng.as_mut());
            let update = match chosen {
                Some(choice) => StateUpdate::new(id, StateCommand::DeclareAction(choice.into())),
                None => {
                    debug!(entity = id, "no usable part");
                    events.push(BattleEvent::ActionCancelled {
                        entity_id: id,
                        reason: CancelReason::Interrupted,
                    });
                    StateUpdate::new(id, StateCommand::ResetToCooldown { interrupted: true })
                }
            };
            events.extend(apply_state_update(&mut self.roster, update, &self.config));
        }
    }

    /// Only combatants still in `ReadySelect` can answer a prompt. One
    /// defeated by an action resolved in the same tick drops out here.
    fn prune_awaiting_input(&mut self) {
        let roster = &self.roster;
        self.awaiting_input.retain(|&id| {
            roster
                .get(id)
                .is_some_and(|c| c.state() == CombatantState::ReadySelect)
        });
    }

    // ========================================================================
    // Execution
    // ========================================================================

    fn execute_action(&mut self, id: EntityId, report: &mut TickReport) -> ActionResult {
        report.events.extend(apply_state_updates(
            &mut self.roster,
            &[
                StateUpdate::new(id, StateCommand::SnapToFixedPosition),
                StateUpdate::new(
                    id,
                    StateCommand::TransitionState(CombatantState::AwaitingAnimation),
                ),
            ],
            &self.config,
        ));

        let action = self.roster.get(id).map(|c| c.action).unwrap_or_default();
        let Some(part_key) = action.part_key else {
            return self.cancel_action(id, None, CancelReason::Interrupted, report);
        };
        let plan = match self.plan_action(id, part_key, action) {
            Ok(plan) => plan,
            Err(reason) => return self.cancel_action(id, Some(part_key), reason, report),
        };

        let turn_keys = self
            .roster
            .get(id)
            .map(|c| c.effects.turn_keys())
            .unwrap_or_default();

        let request = PipelineRequest {
            actor_id: id,
            part_key,
            target_id: plan.target_id,
            outcome: plan.outcome,
            guardian: plan.guardian,
        };
        let output = run_pipeline(
            &self.registry,
            &mut self.roster,
            &self.config,
            &request,
            self.rng.as_mut(),
        );

        report.visuals.push(VisualIntent::Animate {
            entity_id: id,
            part_key,
            target_id: plan.target_id,
        });
        if !plan.outcome.is_hit {
            report.visuals.push(VisualIntent::dialog(
                "battle.miss",
                &[("actor", id.to_string())],
            ));
        }
        report.visuals.extend(output.visuals.iter().cloned());
        report.events.extend(output.events.iter().cloned());
        report.events.extend(apply_state_updates(
            &mut self.roster,
            &output.state_updates,
            &self.config,
        ));

        if plan.offensive {
            if let (Some(target_id), Some(target_part)) =
                (plan.target_id, plan.outcome.final_target_part_key)
            {
                record_attack(
                    &mut self.history,
                    &mut self.roster,
                    id,
                    target_id,
                    target_part,
                );
            }
        }

        if self.roster.get(id).map(Combatant::state) == Some(CombatantState::AwaitingAnimation) {
            report.events.extend(apply_state_update(
                &mut self.roster,
                StateUpdate::new(id, StateCommand::ResetToCooldown { interrupted: false }),
                &self.config,
            ));
        }

        if let Some(actor) = self.roster.get_mut(id) {
            for expired in actor.effects.tick_turns(&turn_keys) {
                report.events.push(BattleEvent::EffectExpired {
                    entity_id: id,
                    status: expired.kind,
                    source_part: expired.source_part,
                });
            }
        }

        debug!(
            actor = id,
            part = ?part_key,
            target = ?plan.target_id,
            hit = plan.outcome.is_hit,
            critical = plan.outcome.is_critical,
            damage = output.damage_dealt(),
            "action resolved"
        );
        ActionResult {
            actor_id: id,
            part_key: Some(part_key),
            target_id: plan.target_id,
            target_part_key: plan.outcome.final_target_part_key,
            outcome: plan.outcome,
            guardian: plan.guardian,
            cancelled: None,
            damage_dealt: output.damage_dealt(),
            healing_done: output.healing_done(),
        }
    }

    /// Targeting and the hit roll. `Err` when the action must be cancelled.
    fn plan_action(
        &mut self,
        id: EntityId,
        part_key: PartKey,
        action: Action,
    ) -> std::result::Result<ActionPlan, CancelReason> {
        let actor = self.roster.get(id).ok_or(CancelReason::Interrupted)?;
        let part = actor.parts.get(part_key);
        if part.is_broken() {
            return Err(CancelReason::PartBroken);
        }
        let action_type = part.action_type;
        let is_support = action_type.is_support();
        let targeted = part.needs_target() || action_type.resolves_target_on_execute();
        let attacker_success = effective_stat(actor, part_key, StatKind::Success, &self.config);
        let critical_bonus = part.traits.critical_bonus;

        if !targeted {
            return Ok(ActionPlan {
                target_id: None,
                outcome: HitOutcome::certain(None),
                guardian: None,
                offensive: false,
            });
        }

        let (mut target_id, mut target_part) = (action.target_id, action.target_part_key);
        if action_type == ActionType::Melee {
            let Some(nearest) = self.nearest_enemy(id) else {
                return Err(CancelReason::TargetLost);
            };
            target_id = Some(nearest);
            target_part = None;
        }

        let resolution = resolve_target(&self.roster, id, target_id, target_part, is_support);
        if resolution.should_cancel {
            return Err(CancelReason::TargetLost);
        }
        if is_support {
            return Ok(ActionPlan {
                target_id: resolution.final_target_id,
                outcome: HitOutcome::certain(resolution.final_target_part_key),
                guardian: None,
                offensive: false,
            });
        }

        let final_id = resolution
            .final_target_id
            .ok_or(CancelReason::TargetLost)?;
        let target = self.roster.get(final_id).ok_or(CancelReason::TargetLost)?;
        let final_part = match resolution.final_target_part_key {
            Some(key) => Some(key),
            None => pick(self.rng.as_mut(), &target.parts.unbroken_keys()).copied(),
        };
        let roll = HitRoll {
            is_support: false,
            attacker_success,
            defender_mobility: mobility(target, &self.config),
            defender_armor: armor(target, &self.config),
            critical_bonus,
            target_part: final_part,
            best_defense_part: best_defense_part(&target.parts),
        };
        let outcome = resolve_hit_outcome(&roll, self.rng.as_mut());
        Ok(ActionPlan {
            target_id: Some(final_id),
            outcome,
            guardian: resolution.guardian,
            offensive: true,
        })
    }

    fn nearest_enemy(&self, id: EntityId) -> Option<EntityId> {
        let actor = self.roster.get(id)?;
        let mut best: Option<(EntityId, Fixed)> = None;
        for enemy in self.roster.living_enemies_of(actor.team) {
            let distance = actor.position.distance_squared(enemy.position);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((enemy.id, distance));
            }
        }
        best.map(|(enemy_id, _)| enemy_id)
    }

    fn cancel_action(
        &mut self,
        id: EntityId,
        part_key: Option<PartKey>,
        reason: CancelReason,
        report: &mut TickReport,
    ) -> ActionResult {
        debug!(entity = id, ?reason, "action cancelled at execution");
        report.events.push(BattleEvent::ActionCancelled {
            entity_id: id,
            reason,
        });
        report.visuals.push(VisualIntent::dialog(
            "battle.cancelled",
            &[("actor", id.to_string()), ("reason", format!("{reason:?}"))],
        ));
        report.events.extend(apply_state_update(
            &mut self.roster,
            StateUpdate::new(id, StateCommand::ResetToCooldown { interrupted: true }),
            &self.config,
        ));
        ActionResult {
            actor_id: id,
            part_key,
            target_id: None,
            target_part_key: None,
            outcome: HitOutcome {
                is_hit: false,
                ..HitOutcome::certain(None)
            },
            guardian: None,
            cancelled: Some(reason),
            damage_dealt: 0,
            healing_done: 0,
        }
    }

    fn check_game_over(&mut self, events: &mut Vec<BattleEvent>) {
        if self.outcome.is_some() {
            return;
        }
        let standing: Vec<TeamId> = self
            .roster
            .teams()
            .into_iter()
            .filter(|&team| !self.team_defeated(team))
            .collect();
        if standing.len() > 1 {
            return;
        }
        let winning_team = standing.first().copied();
        info!(tick = self.tick, ?winning_team, "game over");
        self.outcome = Some(BattleOutcome {
            winning_team,
            tick: self.tick,
        });
        events.push(BattleEvent::GameOver { winning_team });
    }

    /// A team is beaten when its leader or every member is down.
    fn team_defeated(&self, team: TeamId) -> bool {
        let members: Vec<&Combatant> = self.roster.iter().filter(|c| c.team == team).collect();
        members.iter().any(|c| c.is_leader && !c.is_alive())
            || members.iter().all(|c| !c.is_alive())
    }

    #[cfg(feature = "debug-validation")]
    fn assert_invariants(&self) {
        for c in self.roster.iter() {
            for part in c.parts.iter() {
                assert!(part.hp() <= part.max_hp(), "{} {:?} over max HP", c.id, part.key);
            }
            assert!(
                c.gauge.value >= Fixed::ZERO && c.gauge.value <= self.config.gauge_max,
                "{} gauge out of range",
                c.id
            );
            if !c.is_alive() {
                assert_eq!(c.state(), CombatantState::Broken, "{} dead but not broken", c.id);
            }
        }
    }

    // ========================================================================
    // Inbound API
    // ========================================================================

    /// Declare an action for a human-controlled combatant in `ReadySelect`.
    pub fn submit_action(
        &mut self,
        id: EntityId,
        choice: ActionChosen,
    ) -> Result<Vec<BattleEvent>> {
        let actor = self.roster.get(id).ok_or(BattleError::EntityNotFound(id))?;
        if actor.state() != CombatantState::ReadySelect {
            return Err(BattleError::InvalidState(format!(
                "combatant {id} is {:?}, not ReadySelect",
                actor.state()
            )));
        }
        if !actor.usable_parts().contains(&choice.part_key) {
            return Err(BattleError::MissingPart {
                entity: id,
                part: choice.part_key,
            });
        }
        if actor.parts.get(choice.part_key).needs_target() && choice.target_id.is_none() {
            return Err(BattleError::InvalidState(format!(
                "{:?} of combatant {id} needs a target",
                choice.part_key
            )));
        }
        if let Some(target_id) = choice.target_id {
            let target = self
                .roster
                .get(target_id)
                .ok_or(BattleError::EntityNotFound(target_id))?;
            if let Some(part) = choice.target_part_key {
                if target.parts.get(part).is_broken() {
                    return Err(BattleError::MissingPart {
                        entity: target_id,
                        part,
                    });
                }
            }
        }

        self.awaiting_input.remove(&id);
        Ok(apply_state_update(
            &mut self.roster,
            StateUpdate::new(id, StateCommand::DeclareAction(choice.into())),
            &self.config,
        ))
    }

    /// The presentation layer finished showing an action. The core never
    /// waits for this.
    pub fn presentation_complete(&self, id: EntityId) {
        debug!(entity = id, tick = self.tick, "presentation complete");
    }

    /// Compute a hash of the battle state for determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.elapsed_ms.hash(&mut hasher);
        self.scheduler.buffered_ms().hash(&mut hasher);

        // Combatants in id order, including gauges, parts and effects
        self.roster.len().hash(&mut hasher);
        for combatant in self.roster.iter() {
            combatant.hash(&mut hasher);
        }

        self.history.hash(&mut hasher);
        self.outcome.hash(&mut hasher);
        hasher.finish()
    }
}

/// Resolved target and hit roll of one action.
struct ActionPlan {
    target_id: Option<EntityId>,
    outcome: HitOutcome,
    guardian: Option<GuardianInfo>,
    offensive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ActiveEffect, EffectDef, EffectKind, Remaining, StatusKind};
    use crate::rng::ScriptedRandom;
    use crate::test_support::combatant;

    fn duel() -> Battle {
        let mut a = combatant(1, 0);
        a.is_leader = true;
        a.personality = "hunter".into();
        let mut b = combatant(2, 1);
        b.is_leader = true;
        b.personality = "hunter".into();
        Battle::from_combatants(BattleConfig::default(), vec![a, b])
    }

    #[test]
    fn test_tick_increments() {
        let mut battle = duel();
        let report = battle.tick(20);
        assert_eq!(report.tick, 1);
        assert_eq!(battle.current_tick(), 1);
        assert_eq!(battle.elapsed_ms(), 20);
    }

    #[test]
    fn test_deterministic_hash() {
        let mut first = duel();
        let mut second = duel();
        for _ in 0..200 {
            first.tick(20);
            second.tick(20);
        }
        assert_eq!(first.state_hash(), second.state_hash());
    }

    #[test]
    fn test_battle_reaches_game_over() {
        let mut battle = duel().with_random(ScriptedRandom::always());
        let outcome = battle.run_to_completion(20_000).unwrap();
        assert!(outcome.winning_team.is_some());
        let report = battle.tick(20);
        assert!(report.is_empty());
    }

    #[test]
    fn test_human_waits_for_input() {
        let mut a = combatant(1, 0);
        a.ai_controlled = false;
        let mut battle =
            Battle::from_combatants(BattleConfig::default(), vec![a, combatant(2, 1)]);
        for _ in 0..2_000 {
            battle.tick(20);
            if !battle.awaiting_input().is_empty() {
                break;
            }
        }
        assert_eq!(battle.awaiting_input(), vec![1]);
        let hash = battle.state_hash();
        battle.tick(20);
        assert_eq!(
            battle.combatant(1).map(Combatant::state),
            Some(CombatantState::ReadySelect)
        );
        assert_ne!(hash, battle.state_hash());

        let err = battle
            .submit_action(
                1,
                ActionChosen {
                    part_key: PartKey::Legs,
                    target_id: None,
                    target_part_key: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, BattleError::MissingPart { .. }));

        let events = battle
            .submit_action(
                1,
                ActionChosen {
                    part_key: PartKey::RightArm,
                    target_id: Some(2),
                    target_part_key: Some(PartKey::Head),
                },
            )
            .unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, BattleEvent::ActionDeclared { entity_id: 1, .. })));
        assert!(battle.awaiting_input().is_empty());
    }

    #[test]
    fn test_submit_rejects_wrong_state() {
        let mut battle = duel();
        let choice = ActionChosen {
            part_key: PartKey::RightArm,
            target_id: Some(2),
            target_part_key: None,
        };
        assert!(matches!(
            battle.submit_action(1, choice),
            Err(BattleError::InvalidState(_))
        ));
        assert!(matches!(
            battle.submit_action(99, choice),
            Err(BattleError::EntityNotFound(99))
        ));
    }

    /// A combatant with a full gauge about to execute `part_key`.
    fn ready_to_execute(battle: &mut Battle, id: EntityId, action: Action) {
        let c = battle.roster.get_mut(id).unwrap();
        c.gauge.value = Fixed::from_num(100);
        c.action = action;
        battle.roster.set_state(id, CombatantState::SelectedCharging);
    }

    #[test]
    fn test_defeated_human_stops_awaiting_input() {
        let mut player = combatant(1, 0);
        player.ai_controlled = false;
        player.gauge.value = Fixed::from_num(100);
        player.parts.get_mut(PartKey::Head).set_hp(1);
        let mut shooter = combatant(2, 1);
        shooter.is_leader = true;
        let mut lead = combatant(3, 0);
        lead.is_leader = true;
        let mut battle =
            Battle::from_combatants(BattleConfig::default(), vec![player, shooter, lead])
                .with_random(ScriptedRandom::never());
        ready_to_execute(
            &mut battle,
            2,
            Action {
                part_key: Some(PartKey::RightArm),
                target_id: Some(1),
                target_part_key: Some(PartKey::Head),
            },
        );

        battle.tick(20);
        assert_eq!(
            battle.combatant(1).map(Combatant::state),
            Some(CombatantState::Broken)
        );
        assert!(battle.awaiting_input().is_empty());
        assert!(!battle.is_over());

        let tick = battle.current_tick();
        battle.run_to_completion(100);
        assert!(battle.current_tick() > tick);
    }

    #[test]
    fn test_guard_action_holds_guarding() {
        let mut defender = combatant(1, 0);
        {
            let shield = defender.parts.get_mut(PartKey::LeftArm);
            shield.action_type = ActionType::Defend;
            shield.effects = vec![EffectDef::new(EffectKind::ApplyGuard)];
        }
        let mut battle = Battle::from_combatants(
            BattleConfig::default(),
            vec![defender, combatant(2, 0), combatant(3, 1)],
        )
        .with_random(ScriptedRandom::always());
        ready_to_execute(
            &mut battle,
            1,
            Action {
                part_key: Some(PartKey::LeftArm),
                target_id: None,
                target_part_key: None,
            },
        );

        let report = battle.tick(20);
        assert_eq!(report.results.len(), 1);
        assert!(report.results[0].cancelled.is_none());
        let guard = battle.combatant(1).unwrap();
        assert_eq!(guard.state(), CombatantState::Guarding);
        assert_eq!(
            guard.effects.active_guard().map(|g| g.remaining),
            Some(Remaining::Uses(2))
        );
        assert_eq!(guard.action.part_key, Some(PartKey::LeftArm));
    }

    #[test]
    fn test_lost_target_cancels_action() {
        let mut battle = duel();
        ready_to_execute(
            &mut battle,
            1,
            Action {
                part_key: Some(PartKey::RightArm),
                target_id: Some(2),
                target_part_key: Some(PartKey::Head),
            },
        );
        battle
            .roster
            .get_mut(2)
            .unwrap()
            .parts
            .get_mut(PartKey::Head)
            .set_hp(0);

        let report = battle.tick(20);
        assert!(report.events.iter().any(|e| matches!(
            e,
            BattleEvent::ActionCancelled {
                entity_id: 1,
                reason: CancelReason::TargetLost
            }
        )));
        assert_eq!(
            battle.combatant(1).map(Combatant::state),
            Some(CombatantState::Charging)
        );
    }

    #[test]
    fn test_scan_expires_after_holder_actions() {
        let mut a = combatant(1, 0);
        a.effects.insert(ActiveEffect {
            kind: StatusKind::Scan,
            value: 5,
            remaining: Remaining::Turns(1),
            source_id: 1,
            source_part: PartKey::Head,
        });
        let mut battle = Battle::from_combatants(BattleConfig::default(), vec![a, combatant(2, 1)])
            .with_random(ScriptedRandom::always());
        ready_to_execute(
            &mut battle,
            1,
            Action {
                part_key: Some(PartKey::RightArm),
                target_id: Some(2),
                target_part_key: Some(PartKey::Legs),
            },
        );

        let mut expired = false;
        for _ in 0..5 {
            let report = battle.tick(20);
            expired |= report.events.iter().any(|e| {
                matches!(
                    e,
                    BattleEvent::EffectExpired {
                        entity_id: 1,
                        status: StatusKind::Scan,
                        ..
                    }
                )
            });
        }
        assert!(expired);
        assert!(battle.combatant(1).unwrap().effects.is_empty());
    }
}
