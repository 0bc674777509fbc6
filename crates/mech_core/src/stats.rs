//! Effective stat resolution.
//!
//! A part's effective stat is its base value plus additive modifiers from
//! its traits, from the battle config for its action type, and from the
//! owner's standing effects.

use crate::components::{Combatant, PartKey, StatKind};
use crate::config::BattleConfig;

/// Effective value of one stat on one part.
#[must_use]
pub fn effective_stat(
    combatant: &Combatant,
    part_key: PartKey,
    stat: StatKind,
    config: &BattleConfig,
) -> i32 {
    let part = combatant.parts.get(part_key);
    let type_modifier = if part_key.is_action_part() {
        config.action_type_modifier(part.action_type, stat)
    } else {
        0
    };
    part.stats
        .get(stat)
        .saturating_add(part.traits.modifier(stat))
        .saturating_add(type_modifier)
        .saturating_add(combatant.effects.stat_bonus(stat))
}

/// Defender mobility, read from the legs.
#[must_use]
pub fn mobility(combatant: &Combatant, config: &BattleConfig) -> i32 {
    effective_stat(combatant, PartKey::Legs, StatKind::Mobility, config)
}

/// Defender armor, read from the legs.
#[must_use]
pub fn armor(combatant: &Combatant, config: &BattleConfig) -> i32 {
    effective_stat(combatant, PartKey::Legs, StatKind::Armor, config)
}

/// Total defense against a hit on `part_key`: the hit part's defense plus
/// the legs' defense.
#[must_use]
pub fn total_defense(combatant: &Combatant, part_key: PartKey, config: &BattleConfig) -> i32 {
    let legs = effective_stat(combatant, PartKey::Legs, StatKind::Defense, config);
    if part_key == PartKey::Legs {
        return legs;
    }
    legs.saturating_add(combatant.parts.get(part_key).stats.defense)
}
