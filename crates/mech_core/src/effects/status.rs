//! Standing-effect kinds: scan, glitch, guard and guard consumption.

use crate::combat::scan_value;
use crate::components::{ActiveEffect, CombatantState, EffectKind, Remaining, StatusKind};
use crate::events::{BattleEvent, CancelReason, StateCommand, StateUpdate, VisualIntent};
use crate::roster::Roster;
use crate::stats::effective_stat;

use super::{
    AppliedEffect, EffectContext, EffectHandler, EffectRecord, DEFAULT_GUARD_USES,
    DEFAULT_SCAN_DURATION,
};

pub(super) fn scan_handler() -> EffectHandler {
    EffectHandler {
        process: process_scan,
        apply: apply_scan,
        visual: overlay,
    }
}

pub(super) fn glitch_handler() -> EffectHandler {
    EffectHandler {
        process: process_glitch,
        apply: apply_glitch,
        visual: overlay,
    }
}

pub(super) fn guard_handler() -> EffectHandler {
    EffectHandler {
        process: process_guard,
        apply: apply_guard,
        visual: overlay,
    }
}

pub(super) fn consume_guard_handler() -> EffectHandler {
    EffectHandler {
        process: process_consume_guard,
        apply: apply_consume_guard,
        visual: overlay,
    }
}

fn records_for(
    ctx: &EffectContext<'_>,
    kind: EffectKind,
    value: u32,
    duration: Option<u32>,
) -> Vec<EffectRecord> {
    ctx.scope_targets()
        .into_iter()
        .filter(|&id| ctx.roster.get(id).is_some_and(|c| c.is_alive()))
        .map(|target_id| {
            let mut record = EffectRecord::new(kind, ctx.actor_id, ctx.part_key, target_id);
            record.value = value;
            record.duration = duration;
            record
        })
        .collect()
}

fn value_u32(value: i32) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(0)
}

// ============================================================================
// Scan
// ============================================================================

fn process_scan(ctx: &EffectContext<'_>) -> Vec<EffectRecord> {
    let Some(actor) = ctx.actor() else {
        return Vec::new();
    };
    let value = ctx.def.params.amount.unwrap_or_else(|| {
        scan_value(effective_stat(
            actor,
            ctx.part_key,
            ctx.def.params.power_stat,
            ctx.config,
        ))
    });
    let duration = ctx.def.params.duration.unwrap_or(DEFAULT_SCAN_DURATION);
    records_for(ctx, EffectKind::ApplyScan, value_u32(value), Some(duration))
}

/// Adds or refreshes the scan granted by this part.
fn apply_scan(record: &EffectRecord, roster: &mut Roster) -> AppliedEffect {
    let mut applied = AppliedEffect::unchanged(*record);
    let Some(holder) = roster.get_mut(record.target_id) else {
        return applied;
    };
    let value = i32::try_from(record.value).unwrap_or(i32::MAX);
    holder.effects.insert(ActiveEffect {
        kind: StatusKind::Scan,
        value,
        remaining: Remaining::Turns(record.duration.unwrap_or(DEFAULT_SCAN_DURATION)),
        source_id: record.source_id,
        source_part: record.source_part,
    });
    applied.events.push(BattleEvent::EffectApplied {
        entity_id: record.target_id,
        status: StatusKind::Scan,
        value,
    });
    applied
}

// ============================================================================
// Glitch
// ============================================================================

fn process_glitch(ctx: &EffectContext<'_>) -> Vec<EffectRecord> {
    if !ctx.outcome.is_hit {
        return Vec::new();
    }
    records_for(ctx, EffectKind::ApplyGlitch, 0, None)
}

/// Cancels a queued action or a held guard. Anything else is unaffected.
fn apply_glitch(record: &EffectRecord, roster: &mut Roster) -> AppliedEffect {
    let mut applied = AppliedEffect::unchanged(*record);
    let Some(target) = roster.get(record.target_id) else {
        return applied;
    };
    if matches!(
        target.state(),
        CombatantState::SelectedCharging | CombatantState::Guarding
    ) {
        applied.events.push(BattleEvent::ActionCancelled {
            entity_id: record.target_id,
            reason: CancelReason::Interrupted,
        });
        applied.state_updates.push(StateUpdate::new(
            record.target_id,
            StateCommand::ResetToCooldown { interrupted: true },
        ));
    }
    applied
}

// ============================================================================
// Guard
// ============================================================================

fn process_guard(ctx: &EffectContext<'_>) -> Vec<EffectRecord> {
    let uses = ctx.def.params.duration.unwrap_or(DEFAULT_GUARD_USES).max(1);
    records_for(ctx, EffectKind::ApplyGuard, uses, None)
}

/// Grants the guard and moves the holder into `Guarding`.
fn apply_guard(record: &EffectRecord, roster: &mut Roster) -> AppliedEffect {
    let mut applied = AppliedEffect::unchanged(*record);
    let Some(holder) = roster.get_mut(record.target_id) else {
        return applied;
    };
    holder.effects.insert(ActiveEffect {
        kind: StatusKind::Guard,
        value: 0,
        remaining: Remaining::Uses(record.value),
        source_id: record.source_id,
        source_part: record.source_part,
    });
    applied.events.push(BattleEvent::EffectApplied {
        entity_id: record.target_id,
        status: StatusKind::Guard,
        value: i32::try_from(record.value).unwrap_or(i32::MAX),
    });
    if record.target_id == record.source_id {
        applied.state_updates.push(StateUpdate::new(
            record.target_id,
            StateCommand::TransitionState(CombatantState::Guarding),
        ));
    }
    applied
}

// ============================================================================
// Consume Guard
// ============================================================================

fn process_consume_guard(ctx: &EffectContext<'_>) -> Vec<EffectRecord> {
    if !ctx.outcome.is_hit {
        return Vec::new();
    }
    records_for(ctx, EffectKind::ConsumeGuard, 1, None)
}

/// Spends one use of the holder's guard. When the last use goes the guard
/// expires and a guarding holder returns to cooldown.
fn apply_consume_guard(record: &EffectRecord, roster: &mut Roster) -> AppliedEffect {
    let mut applied = AppliedEffect::unchanged(*record);
    let Some(holder) = roster.get_mut(record.target_id) else {
        return applied;
    };
    let Some(key) = holder.effects.active_guard().map(ActiveEffect::key) else {
        return applied;
    };
    if holder.effects.consume_use(&key) == Some(0) {
        applied.events.push(BattleEvent::EffectExpired {
            entity_id: record.target_id,
            status: StatusKind::Guard,
            source_part: key.source_part,
        });
        if holder.state() == CombatantState::Guarding {
            applied.state_updates.push(StateUpdate::new(
                record.target_id,
                StateCommand::ResetToCooldown { interrupted: false },
            ));
        }
    }
    applied
}

fn overlay(applied: &AppliedEffect) -> Vec<VisualIntent> {
    vec![VisualIntent::ApplyVisualEffect {
        entity_id: applied.record.target_id,
        kind: applied.record.kind,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::HitOutcome;
    use crate::components::{CalcParams, EffectDef, PartKey};
    use crate::config::BattleConfig;
    use crate::test_support::combatant;

    fn ctx<'a>(
        roster: &'a Roster,
        config: &'a BattleConfig,
        def: &'a EffectDef,
        target_id: Option<u64>,
    ) -> EffectContext<'a> {
        EffectContext {
            roster,
            config,
            actor_id: 1,
            part_key: PartKey::Head,
            def,
            target_id,
            outcome: HitOutcome::certain(None),
        }
    }

    #[test]
    fn test_scan_covers_living_team() {
        let mut dead = combatant(3, 0);
        dead.parts.get_mut(PartKey::Head).apply_damage(40);
        let roster = Roster::new(vec![combatant(1, 0), combatant(2, 0), dead, combatant(4, 1)]);
        let config = BattleConfig::default();
        let def = EffectDef::new(EffectKind::ApplyScan).with_params(CalcParams {
            amount: Some(8),
            duration: Some(2),
            ..CalcParams::default()
        });
        let records = process_scan(&ctx(&roster, &config, &def, None));
        let targets: Vec<u64> = records.iter().map(|r| r.target_id).collect();
        assert_eq!(targets, vec![1, 2]);
        assert!(records.iter().all(|r| r.value == 8 && r.duration == Some(2)));
    }

    #[test]
    fn test_glitch_only_hits_queued_or_guarding() {
        let mut roster = Roster::new(vec![combatant(1, 0), combatant(2, 1)]);
        let record = EffectRecord::new(EffectKind::ApplyGlitch, 1, PartKey::Head, 2);

        let applied = apply_glitch(&record, &mut roster);
        assert!(applied.state_updates.is_empty());

        roster.set_state(2, CombatantState::SelectedCharging);
        let applied = apply_glitch(&record, &mut roster);
        assert_eq!(
            applied.state_updates,
            vec![StateUpdate::new(
                2,
                StateCommand::ResetToCooldown { interrupted: true }
            )]
        );
    }

    #[test]
    fn test_guard_consumed_to_expiry() {
        let mut roster = Roster::new(vec![combatant(1, 0)]);
        let mut grant = EffectRecord::new(EffectKind::ApplyGuard, 1, PartKey::LeftArm, 1);
        grant.value = 2;
        let applied = apply_guard(&grant, &mut roster);
        assert_eq!(
            applied.state_updates,
            vec![StateUpdate::new(
                1,
                StateCommand::TransitionState(CombatantState::Guarding)
            )]
        );
        roster.set_state(1, CombatantState::Guarding);

        let consume = EffectRecord::new(EffectKind::ConsumeGuard, 9, PartKey::Head, 1);
        let first = apply_consume_guard(&consume, &mut roster);
        assert!(first.events.is_empty());
        let second = apply_consume_guard(&consume, &mut roster);
        assert!(matches!(
            second.events.as_slice(),
            [BattleEvent::EffectExpired { entity_id: 1, .. }]
        ));
        assert_eq!(second.state_updates.len(), 1);
        assert!(roster.get(1).unwrap().effects.active_guard().is_none());
    }
}
