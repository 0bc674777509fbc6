//! Test fixtures and helpers.
//!
//! Pre-built parts, combatants and rosters as master data, so tests and
//! benches build battles through the same path real data takes.

use mech_core::components::{ActionType, CalcParams, PartStats, PartTraits, TargetScope, TeamId};
use fixed::types::I32F32;
use mech_core::data::{CombatantData, EffectData, PartData, RosterData, TeamData};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// One effect with default parameters.
#[must_use]
pub fn effect(kind: &str) -> EffectData {
    EffectData {
        kind: kind.to_string(),
        params: CalcParams::default(),
        scope: None,
    }
}

fn part(name: &str, action_type: ActionType, stats: PartStats, max_hp: u32) -> PartData {
    PartData {
        name: name.to_string(),
        action_type,
        stats,
        max_hp,
        effects: Vec::new(),
        traits: PartTraits::default(),
    }
}

// ============================================================================
// Parts
// ============================================================================

/// Plain head with no action.
#[must_use]
pub fn sensor_head() -> PartData {
    part("Sensor", ActionType::Shoot, PartStats::default(), 30)
}

/// Head that scans for the whole team.
#[must_use]
pub fn scanner_head() -> PartData {
    let mut p = part(
        "Scanner",
        ActionType::Support,
        PartStats {
            might: 10,
            success: 10,
            ..PartStats::default()
        },
        30,
    );
    p.effects.push(effect("apply_scan"));
    p
}

/// Ranged arm dealing damage.
#[must_use]
pub fn rifle() -> PartData {
    let mut p = part(
        "Rifle",
        ActionType::Shoot,
        PartStats {
            might: 20,
            success: 40,
            ..PartStats::default()
        },
        40,
    );
    p.effects.push(effect("damage"));
    p
}

/// Heavy arm whose overkill penetrates to another part.
#[must_use]
pub fn cannon() -> PartData {
    let mut p = part(
        "Cannon",
        ActionType::Shoot,
        PartStats {
            might: 30,
            success: 30,
            ..PartStats::default()
        },
        45,
    );
    p.effects.push(effect("damage"));
    p.traits.penetrates = true;
    p
}

/// Melee arm that hits the nearest enemy.
#[must_use]
pub fn blade() -> PartData {
    let mut p = part(
        "Blade",
        ActionType::Melee,
        PartStats {
            might: 25,
            success: 35,
            ..PartStats::default()
        },
        40,
    );
    p.effects.push(effect("damage"));
    p.traits.critical_bonus = fixed_f(0.1);
    p
}

/// Arm that repairs an ally part.
#[must_use]
pub fn medkit() -> PartData {
    let mut p = part(
        "Medkit",
        ActionType::Heal,
        PartStats {
            might: 10,
            success: 20,
            ..PartStats::default()
        },
        35,
    );
    p.effects.push(effect("heal"));
    p
}

/// Arm that guards teammates for two intercepts.
#[must_use]
pub fn shield() -> PartData {
    let mut p = part(
        "Shield",
        ActionType::Defend,
        PartStats {
            armor: 10,
            defense: 5,
            ..PartStats::default()
        },
        50,
    );
    p.effects.push(effect("apply_guard"));
    p
}

/// Arm that disrupts an enemy's queued action.
#[must_use]
pub fn jammer() -> PartData {
    let mut p = part(
        "Jammer",
        ActionType::Interrupt,
        PartStats {
            might: 5,
            success: 30,
            ..PartStats::default()
        },
        35,
    );
    p.effects.push(effect("apply_glitch"));
    p
}

/// Medkit that repairs the whole team instead of one ally.
#[must_use]
pub fn team_medkit() -> PartData {
    let mut p = medkit();
    p.name = "Field Kit".to_string();
    p.effects = vec![EffectData {
        scope: Some(TargetScope::AllyTeam),
        ..effect("heal")
    }];
    p
}

/// Legs with middling mobility and propulsion.
#[must_use]
pub fn treads() -> PartData {
    part(
        "Treads",
        ActionType::Shoot,
        PartStats {
            mobility: 10,
            propulsion: 8,
            defense: 4,
            ..PartStats::default()
        },
        50,
    )
}

// ============================================================================
// Combatants and Rosters
// ============================================================================

/// Rifle and medkit on treads.
#[must_use]
pub fn gunner(name: &str, personality: &str, is_leader: bool) -> CombatantData {
    CombatantData {
        name: name.to_string(),
        head: sensor_head(),
        right_arm: rifle(),
        left_arm: medkit(),
        legs: treads(),
        personality: Some(personality.to_string()),
        ai_controlled: true,
        is_leader,
    }
}

/// Cannon and shield on treads.
#[must_use]
pub fn tank(name: &str, personality: &str) -> CombatantData {
    CombatantData {
        name: name.to_string(),
        head: sensor_head(),
        right_arm: cannon(),
        left_arm: shield(),
        legs: treads(),
        personality: Some(personality.to_string()),
        ai_controlled: true,
        is_leader: false,
    }
}

/// Blade and jammer with a scanner head.
#[must_use]
pub fn skirmisher(name: &str, personality: &str) -> CombatantData {
    CombatantData {
        name: name.to_string(),
        head: scanner_head(),
        right_arm: blade(),
        left_arm: jammer(),
        legs: treads(),
        personality: Some(personality.to_string()),
        ai_controlled: true,
        is_leader: false,
    }
}

/// A team of `size` members: a gunner leader, then tanks and skirmishers
/// alternating.
#[must_use]
pub fn standard_team(id: TeamId, size: usize) -> TeamData {
    let personalities = ["hunter", "crusher", "speed", "focus", "counter"];
    let members = (0..size.max(1))
        .map(|slot| {
            let name = format!("T{id}-{slot}");
            let personality = personalities[slot % personalities.len()];
            match slot {
                0 => gunner(&name, personality, true),
                s if s % 2 == 1 => tank(&name, personality),
                _ => skirmisher(&name, personality),
            }
        })
        .collect();
    TeamData { id, members }
}

/// Two identical standard teams.
#[must_use]
pub fn mirror_roster(size: usize) -> RosterData {
    RosterData {
        teams: vec![standard_team(0, size), standard_team(1, size)],
    }
}

/// One gunner leader per team.
#[must_use]
pub fn duel_roster() -> RosterData {
    RosterData {
        teams: vec![
            TeamData {
                id: 0,
                members: vec![gunner("Alpha", "hunter", true)],
            },
            TeamData {
                id: 1,
                members: vec![gunner("Bravo", "hunter", true)],
            },
        ],
    }
}

/// Pretty RON text of a roster, for writing scenario files in tests.
#[must_use]
pub fn roster_ron(roster: &RosterData) -> String {
    ron::ser::to_string_pretty(roster, ron::ser::PrettyConfig::default())
        .expect("roster data always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_parts_validate() {
        for (key, part) in [
            (mech_core::components::PartKey::Head, scanner_head()),
            (mech_core::components::PartKey::RightArm, cannon()),
            (mech_core::components::PartKey::LeftArm, jammer()),
            (mech_core::components::PartKey::Legs, treads()),
        ] {
            assert!(part.validate(key).is_empty(), "{}", part.name);
        }
    }

    #[test]
    fn test_mirror_roster_is_valid() {
        let roster = mirror_roster(5);
        assert!(roster.validate().is_empty(), "{:?}", roster.validate());
        assert_eq!(roster.combatant_count(), 10);
        assert_eq!(
            roster.teams[0].members.iter().filter(|m| m.is_leader).count(),
            1
        );
    }

    #[test]
    fn test_roster_ron_parses_back() {
        let roster = mirror_roster(2);
        let parsed = RosterData::from_ron_str(&roster_ron(&roster), "fixture").unwrap();
        assert_eq!(parsed, roster);
    }
}
