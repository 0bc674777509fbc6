//! Builders shared by unit tests.

use crate::components::{
    ActionType, Combatant, EffectDef, EffectKind, EntityId, Part, PartKey, PartSet, TeamId,
};

/// A plain part with no effects.
pub(crate) fn part(key: PartKey, hp: u32) -> Part {
    Part::new(key, format!("{key:?}"), hp)
}

/// A part that performs one effect.
pub(crate) fn action_part(
    key: PartKey,
    hp: u32,
    action_type: ActionType,
    kind: EffectKind,
) -> Part {
    let mut p = part(key, hp);
    p.action_type = action_type;
    p.effects.push(EffectDef::new(kind));
    p
}

/// Rifle on the right arm, medkit on the left, 40 HP everywhere.
pub(crate) fn combatant(id: EntityId, team: TeamId) -> Combatant {
    let mut rifle = action_part(PartKey::RightArm, 40, ActionType::Shoot, EffectKind::Damage);
    rifle.stats.success = 40;
    rifle.stats.might = 20;
    let mut medkit = action_part(PartKey::LeftArm, 40, ActionType::Heal, EffectKind::Heal);
    medkit.stats.success = 20;
    medkit.stats.might = 10;
    let mut legs = part(PartKey::Legs, 40);
    legs.stats.mobility = 10;
    legs.stats.propulsion = 5;
    Combatant::new(
        id,
        format!("unit-{id}"),
        team,
        PartSet::new(part(PartKey::Head, 40), rifle, medkit, legs),
    )
}
