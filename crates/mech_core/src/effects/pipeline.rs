//! Runs every effect of one action: process all, then apply in order.
//!
//! Penetration follow-ups are pushed to the front of the apply queue so
//! that a chain resolves before the next declared effect. A chain is capped
//! at one apply step per part of the target.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::combat::HitOutcome;
use crate::components::{EffectKind, EntityId, PartKey};
use crate::config::BattleConfig;
use crate::events::{BattleEvent, StateUpdate, VisualIntent};
use crate::rng::{pick, RandomSource};
use crate::roster::Roster;
use crate::targeting::GuardianInfo;

use super::{AppliedEffect, EffectContext, EffectRecord, EffectRegistry};

/// One action handed to the pipeline after targeting and the hit roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRequest {
    /// The acting combatant.
    pub actor_id: EntityId,
    /// The part being used.
    pub part_key: PartKey,
    /// Final target after redirection.
    pub target_id: Option<EntityId>,
    /// Hit roll.
    pub outcome: HitOutcome,
    /// Set when a guardian intercepted the attack.
    pub guardian: Option<GuardianInfo>,
}

/// Everything the pipeline produced, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Applied records, including penetration follow-ups and guard use.
    pub applied: Vec<AppliedEffect>,
    /// Observable facts from every application.
    pub events: Vec<BattleEvent>,
    /// Commands for the state executor.
    pub state_updates: Vec<StateUpdate>,
    /// Presentation directives.
    pub visuals: Vec<VisualIntent>,
}

impl PipelineOutput {
    fn absorb(&mut self, registry: &EffectRegistry, applied: AppliedEffect) {
        if let Some(handler) = registry.get(applied.record.kind) {
            self.visuals.extend((handler.visual)(&applied));
        }
        self.events.extend(applied.events.iter().cloned());
        self.state_updates.extend(applied.state_updates.iter().copied());
        self.applied.push(applied);
    }

    /// Total HP removed.
    #[must_use]
    pub fn damage_dealt(&self) -> u32 {
        self.hp_delta(EffectKind::Damage, |a| a.old_hp.saturating_sub(a.new_hp))
    }

    /// Total HP restored.
    #[must_use]
    pub fn healing_done(&self) -> u32 {
        self.hp_delta(EffectKind::Heal, |a| a.new_hp.saturating_sub(a.old_hp))
    }

    fn hp_delta(&self, kind: EffectKind, delta: impl Fn(&AppliedEffect) -> u32) -> u32 {
        self.applied
            .iter()
            .filter(|a| a.record.kind == kind)
            .map(delta)
            .fold(0u32, u32::saturating_add)
    }
}

/// Run the declared effects of the request's part.
///
/// All records are computed against the pre-action state before any is
/// applied. Kinds without a registered handler are skipped with a warning.
pub fn run_pipeline(
    registry: &EffectRegistry,
    roster: &mut Roster,
    config: &BattleConfig,
    request: &PipelineRequest,
    rng: &mut dyn RandomSource,
) -> PipelineOutput {
    let mut output = PipelineOutput::default();
    let Some(actor) = roster.get(request.actor_id) else {
        warn!(actor = request.actor_id, "pipeline actor missing");
        return output;
    };
    let defs = actor.parts.get(request.part_key).effects.clone();

    let mut queue: VecDeque<EffectRecord> = VecDeque::new();
    for def in &defs {
        let Some(handler) = registry.get(def.kind) else {
            warn!(kind = def.kind.key(), "no handler registered, effect skipped");
            continue;
        };
        let ctx = EffectContext {
            roster: &*roster,
            config,
            actor_id: request.actor_id,
            part_key: request.part_key,
            def,
            target_id: request.target_id,
            outcome: request.outcome,
        };
        queue.extend((handler.process)(&ctx));
    }

    while let Some(record) = queue.pop_front() {
        let Some(handler) = registry.get(record.kind) else {
            warn!(kind = record.kind.key(), "no handler registered, record dropped");
            continue;
        };
        let applied = (handler.apply)(&record, roster);
        if let Some(follow_up) = penetration_follow_up(&applied, roster, rng) {
            debug!(
                target = follow_up.target_id,
                part = ?follow_up.part_key,
                value = follow_up.value,
                depth = follow_up.chain_depth,
                "penetration"
            );
            queue.push_front(follow_up);
        }
        output.absorb(registry, applied);
    }

    if let Some(guardian) = request.guardian {
        output.events.push(BattleEvent::GuardIntercepted {
            guardian_id: guardian.guardian_id,
            protected_id: guardian.protected_id,
        });
        consume_guard(registry, roster, request, guardian, &mut output);
    }
    output
}

/// The synthetic follow-up carrying overkill onto another unbroken part.
fn penetration_follow_up(
    applied: &AppliedEffect,
    roster: &Roster,
    rng: &mut dyn RandomSource,
) -> Option<EffectRecord> {
    let record = &applied.record;
    if record.kind != EffectKind::Damage
        || !record.penetrates
        || !applied.is_part_broken
        || applied.overkill == 0
        || usize::from(record.chain_depth) + 1 >= PartKey::ALL.len()
    {
        return None;
    }
    let target = roster.get(record.target_id)?;
    if !target.is_alive() {
        return None;
    }
    let candidates = target.parts.unbroken_keys();
    let next_part = *pick(rng, &candidates)?;

    let mut follow_up = *record;
    follow_up.part_key = Some(next_part);
    follow_up.value = applied.overkill;
    follow_up.is_critical = false;
    follow_up.is_defended = false;
    follow_up.chain_depth = record.chain_depth + 1;
    Some(follow_up)
}

fn consume_guard(
    registry: &EffectRegistry,
    roster: &mut Roster,
    request: &PipelineRequest,
    guardian: GuardianInfo,
    output: &mut PipelineOutput,
) {
    let Some(handler) = registry.get(EffectKind::ConsumeGuard) else {
        warn!("no consume_guard handler registered, guard use not spent");
        return;
    };
    let mut record = EffectRecord::new(
        EffectKind::ConsumeGuard,
        request.actor_id,
        request.part_key,
        guardian.guardian_id,
    );
    record.value = 1;
    let applied = (handler.apply)(&record, roster);
    output.absorb(registry, applied);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{
        ActiveEffect, CombatantState, EffectDef, Remaining, StatusKind,
    };
    use crate::rng::ScriptedRandom;
    use crate::test_support::combatant;

    fn shot_request(target_part: PartKey) -> PipelineRequest {
        PipelineRequest {
            actor_id: 1,
            part_key: PartKey::RightArm,
            target_id: Some(2),
            outcome: HitOutcome::certain(Some(target_part)),
            guardian: None,
        }
    }

    fn set_rifle_damage(roster: &mut Roster, amount: i32, penetrates: bool) {
        let rifle = roster.get_mut(1).unwrap().parts.get_mut(PartKey::RightArm);
        rifle.traits.penetrates = penetrates;
        rifle.effects = vec![EffectDef::new(EffectKind::Damage).with_params(
            crate::components::CalcParams {
                amount: Some(amount),
                ..Default::default()
            },
        )];
    }

    #[test]
    fn test_plain_hit_applies_once() {
        let mut roster = Roster::new(vec![combatant(1, 0), combatant(2, 1)]);
        let config = BattleConfig::default();
        let mut rng = ScriptedRandom::always();
        let out = run_pipeline(
            &EffectRegistry::standard(),
            &mut roster,
            &config,
            &shot_request(PartKey::Legs),
            &mut rng,
        );
        assert_eq!(out.applied.len(), 1);
        assert_eq!(out.damage_dealt(), 27);
        assert_eq!(roster.get(2).unwrap().parts.get(PartKey::Legs).hp(), 13);
    }

    #[test]
    fn test_penetration_carries_overkill() {
        let mut roster = Roster::new(vec![combatant(1, 0), combatant(2, 1)]);
        set_rifle_damage(&mut roster, 50, true);
        let config = BattleConfig::default();
        // Unbroken after the legs break: Head, RightArm, LeftArm. Pick index 1.
        let mut rng = ScriptedRandom::always().with_indices([1]);
        let out = run_pipeline(
            &EffectRegistry::standard(),
            &mut roster,
            &config,
            &shot_request(PartKey::Legs),
            &mut rng,
        );
        assert_eq!(out.applied.len(), 2);
        assert_eq!(out.applied[1].record.part_key, Some(PartKey::RightArm));
        assert_eq!(out.applied[1].record.value, 10);
        assert_eq!(out.applied[1].record.chain_depth, 1);
        let target = roster.get(2).unwrap();
        assert!(target.parts.get(PartKey::Legs).is_broken());
        assert_eq!(target.parts.get(PartKey::RightArm).hp(), 30);
    }

    #[test]
    fn test_penetration_chain_is_bounded() {
        let mut roster = Roster::new(vec![combatant(1, 0), combatant(2, 1)]);
        set_rifle_damage(&mut roster, 1_000, true);
        let config = BattleConfig::default();
        // Always pick the last unbroken part so the head breaks last.
        let mut rng = ScriptedRandom::always().with_indices([2, 1, 0]);
        let out = run_pipeline(
            &EffectRegistry::standard(),
            &mut roster,
            &config,
            &shot_request(PartKey::Legs),
            &mut rng,
        );
        assert!(out.applied.len() <= PartKey::ALL.len());
        assert!(!roster.get(2).unwrap().is_alive());
    }

    #[test]
    fn test_no_penetration_without_trait() {
        let mut roster = Roster::new(vec![combatant(1, 0), combatant(2, 1)]);
        set_rifle_damage(&mut roster, 50, false);
        let config = BattleConfig::default();
        let mut rng = ScriptedRandom::always();
        let out = run_pipeline(
            &EffectRegistry::standard(),
            &mut roster,
            &config,
            &shot_request(PartKey::Legs),
            &mut rng,
        );
        assert_eq!(out.applied.len(), 1);
        assert_eq!(out.applied[0].overkill, 10);
    }

    #[test]
    fn test_missing_handler_is_skipped() {
        let mut roster = Roster::new(vec![combatant(1, 0), combatant(2, 1)]);
        let config = BattleConfig::default();
        let mut registry = EffectRegistry::standard();
        registry.unregister(EffectKind::Damage);
        let mut rng = ScriptedRandom::always();
        let out = run_pipeline(
            &registry,
            &mut roster,
            &config,
            &shot_request(PartKey::Head),
            &mut rng,
        );
        assert!(out.applied.is_empty());
        assert_eq!(roster.get(2).unwrap().parts.total_hp(), 160);
    }

    #[test]
    fn test_guardian_use_consumed_after_hit() {
        let mut guardian = combatant(3, 1);
        guardian.effects.insert(ActiveEffect {
            kind: StatusKind::Guard,
            value: 0,
            remaining: Remaining::Uses(1),
            source_id: 3,
            source_part: PartKey::LeftArm,
        });
        let mut roster = Roster::new(vec![combatant(1, 0), combatant(2, 1), guardian]);
        roster.set_state(3, CombatantState::Guarding);
        let config = BattleConfig::default();
        let mut rng = ScriptedRandom::always();
        let request = PipelineRequest {
            target_id: Some(3),
            guardian: Some(GuardianInfo {
                guardian_id: 3,
                protected_id: 2,
                guard_part: PartKey::LeftArm,
            }),
            ..shot_request(PartKey::LeftArm)
        };
        let out = run_pipeline(
            &EffectRegistry::standard(),
            &mut roster,
            &config,
            &request,
            &mut rng,
        );
        assert!(out.events.contains(&BattleEvent::GuardIntercepted {
            guardian_id: 3,
            protected_id: 2,
        }));
        assert!(roster.get(3).unwrap().effects.active_guard().is_none());
        assert_eq!(roster.get(3).unwrap().parts.get(PartKey::LeftArm).hp(), 13);
        assert_eq!(out.applied.last().unwrap().record.kind, EffectKind::ConsumeGuard);
    }
}
