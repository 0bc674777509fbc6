//! Damage effect.

use crate::combat::{calculate_damage, DamageInput};
use crate::components::{EffectKind, PartKey};
use crate::events::{BattleEvent, StateCommand, StateUpdate, VisualIntent};
use crate::roster::Roster;
use crate::stats::{effective_stat, mobility, total_defense};
use crate::targeting::best_defense_part;

use super::{revoke_granted_by, AppliedEffect, EffectContext, EffectHandler, EffectRecord};

pub(super) fn handler() -> EffectHandler {
    EffectHandler {
        process,
        apply,
        visual,
    }
}

fn process(ctx: &EffectContext<'_>) -> Vec<EffectRecord> {
    if !ctx.outcome.is_hit {
        return Vec::new();
    }
    let Some(actor) = ctx.actor() else {
        return Vec::new();
    };
    let part = actor.parts.get(ctx.part_key);
    let base = effective_stat(actor, ctx.part_key, ctx.def.params.base_stat, ctx.config);
    let power = effective_stat(actor, ctx.part_key, ctx.def.params.power_stat, ctx.config);

    ctx.scope_targets()
        .into_iter()
        .filter_map(|target_id| {
            let target = ctx.roster.get(target_id)?;
            let part_key = if Some(target_id) == ctx.target_id {
                ctx.outcome.final_target_part_key?
            } else {
                best_defense_part(&target.parts).unwrap_or(PartKey::Head)
            };
            let value = match ctx.def.params.amount {
                Some(amount) => u32::try_from(amount.max(0)).unwrap_or(0),
                None => calculate_damage(DamageInput {
                    base,
                    power,
                    defender_mobility: mobility(target, ctx.config),
                    total_defense: total_defense(target, part_key, ctx.config),
                    is_critical: ctx.outcome.is_critical,
                    defense_bypassed: part.traits.ignores_defense,
                }),
            };
            let mut record =
                EffectRecord::new(EffectKind::Damage, actor.id, ctx.part_key, target_id);
            record.part_key = Some(part_key);
            record.value = value;
            record.is_critical = ctx.outcome.is_critical;
            record.is_defended = ctx.outcome.is_defended;
            record.penetrates = part.traits.penetrates;
            Some(record)
        })
        .collect()
}

/// `new_hp = max(0, old_hp - value)`. Breaking the head defeats the
/// target; breaking any part revokes the effects it granted.
fn apply(record: &EffectRecord, roster: &mut Roster) -> AppliedEffect {
    let mut applied = AppliedEffect::unchanged(*record);
    let Some(part_key) = record.part_key else {
        return applied;
    };
    let Some(target) = roster.get_mut(record.target_id) else {
        return applied;
    };
    let hit = target.parts.get_mut(part_key).apply_damage(record.value);
    applied.old_hp = hit.old_hp;
    applied.new_hp = hit.new_hp;
    applied.is_part_broken = hit.broke;
    applied.overkill = hit.overkill;
    applied.events.push(BattleEvent::HpChanged {
        entity_id: record.target_id,
        part_key,
        old_hp: hit.old_hp,
        new_hp: hit.new_hp,
        is_heal: false,
    });

    if hit.broke {
        applied.events.push(BattleEvent::PartBroken {
            entity_id: record.target_id,
            part_key,
        });
        if part_key.is_vital() {
            applied
                .state_updates
                .push(StateUpdate::new(record.target_id, StateCommand::SetDefeated));
        }
        revoke_granted_by(
            roster,
            record.target_id,
            part_key,
            &mut applied.events,
            &mut applied.state_updates,
        );
    }
    applied
}

fn visual(applied: &AppliedEffect) -> Vec<VisualIntent> {
    let record = &applied.record;
    let Some(part_key) = record.part_key else {
        return Vec::new();
    };
    let mut visuals = vec![
        VisualIntent::UiAnimation {
            entity_id: record.target_id,
            part_key,
            from_hp: applied.old_hp,
            to_hp: applied.new_hp,
        },
        VisualIntent::dialog(
            if record.chain_depth > 0 {
                "battle.damage.penetrate"
            } else if record.is_critical {
                "battle.damage.critical"
            } else if record.is_defended {
                "battle.damage.defended"
            } else {
                "battle.damage"
            },
            &[
                ("target", record.target_id.to_string()),
                ("part", format!("{part_key:?}")),
                ("value", record.value.to_string()),
            ],
        ),
    ];
    if applied.is_part_broken {
        visuals.push(VisualIntent::dialog(
            "battle.part_broken",
            &[
                ("target", record.target_id.to_string()),
                ("part", format!("{part_key:?}")),
            ],
        ));
    }
    visuals
}
