//! Heal effect.

use crate::combat::heal_value;
use crate::components::{Combatant, EffectKind, PartKey};
use crate::events::{BattleEvent, VisualIntent};
use crate::roster::Roster;
use crate::stats::effective_stat;

use super::{AppliedEffect, EffectContext, EffectHandler, EffectRecord};

pub(super) fn handler() -> EffectHandler {
    EffectHandler {
        process,
        apply,
        visual,
    }
}

/// The unbroken part missing the most HP, first in declaration order.
fn most_damaged_part(target: &Combatant) -> Option<PartKey> {
    let mut best: Option<(u32, PartKey)> = None;
    for part in target.parts.iter() {
        if part.is_broken() {
            continue;
        }
        if best.map_or(true, |(missing, _)| part.missing_hp() > missing) {
            best = Some((part.missing_hp(), part.key));
        }
    }
    best.map(|(_, key)| key)
}

fn process(ctx: &EffectContext<'_>) -> Vec<EffectRecord> {
    let Some(actor) = ctx.actor() else {
        return Vec::new();
    };
    let base = effective_stat(actor, ctx.part_key, ctx.def.params.base_stat, ctx.config);
    let power = effective_stat(actor, ctx.part_key, ctx.def.params.power_stat, ctx.config);
    let value = match ctx.def.params.amount {
        Some(amount) => u32::try_from(amount.max(0)).unwrap_or(0),
        None => heal_value(base, power),
    };

    ctx.scope_targets()
        .into_iter()
        .filter_map(|target_id| {
            let target = ctx.roster.get(target_id)?;
            if !target.is_alive() {
                return None;
            }
            let requested = ctx
                .outcome
                .final_target_part_key
                .filter(|_| Some(target_id) == ctx.target_id)
                .filter(|&key| !target.parts.get(key).is_broken());
            let part_key = requested.or_else(|| most_damaged_part(target))?;
            let mut record = EffectRecord::new(EffectKind::Heal, actor.id, ctx.part_key, target_id);
            record.part_key = Some(part_key);
            record.value = value;
            Some(record)
        })
        .collect()
}

/// Broken parts are never healed.
fn apply(record: &EffectRecord, roster: &mut Roster) -> AppliedEffect {
    let mut applied = AppliedEffect::unchanged(*record);
    let Some(part_key) = record.part_key else {
        return applied;
    };
    let Some(target) = roster.get_mut(record.target_id) else {
        return applied;
    };
    let (old_hp, new_hp) = target.parts.get_mut(part_key).heal(record.value);
    applied.old_hp = old_hp;
    applied.new_hp = new_hp;
    applied.events.push(BattleEvent::HpChanged {
        entity_id: record.target_id,
        part_key,
        old_hp,
        new_hp,
        is_heal: true,
    });
    applied
}

fn visual(applied: &AppliedEffect) -> Vec<VisualIntent> {
    let record = &applied.record;
    let Some(part_key) = record.part_key else {
        return Vec::new();
    };
    vec![
        VisualIntent::UiAnimation {
            entity_id: record.target_id,
            part_key,
            from_hp: applied.old_hp,
            to_hp: applied.new_hp,
        },
        VisualIntent::dialog(
            "battle.heal",
            &[
                ("target", record.target_id.to_string()),
                ("part", format!("{part_key:?}")),
                ("value", applied.new_hp.saturating_sub(applied.old_hp).to_string()),
            ],
        ),
    ]
}
