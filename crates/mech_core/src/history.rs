//! Battle-scoped attack history.
//!
//! Owned by the battle and passed by reference. Only [`record_attack`]
//! writes to it; the AI reads it to pick counter and focus targets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, PartKey, TeamId};
use crate::roster::Roster;

/// Per-team attack memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BattleHistory {
    team_last_attack: BTreeMap<TeamId, (EntityId, PartKey)>,
    leader_last_attacked_by: BTreeMap<TeamId, EntityId>,
}

impl BattleHistory {
    /// The last target a team attacked.
    #[must_use]
    pub fn team_last_attack(&self, team: TeamId) -> Option<(EntityId, PartKey)> {
        self.team_last_attack.get(&team).copied()
    }

    /// Who last hit a team's leader.
    #[must_use]
    pub fn leader_last_attacked_by(&self, team: TeamId) -> Option<EntityId> {
        self.leader_last_attacked_by.get(&team).copied()
    }
}

/// Record an offensive action from `attacker_id` on `target_id`.
///
/// Updates both the battle history and the per-combatant histories.
pub fn record_attack(
    history: &mut BattleHistory,
    roster: &mut Roster,
    attacker_id: EntityId,
    target_id: EntityId,
    part_key: PartKey,
) {
    let Some(attacker_team) = roster.get(attacker_id).map(|c| c.team) else {
        return;
    };
    let Some((target_team, target_is_leader)) =
        roster.get(target_id).map(|c| (c.team, c.is_leader))
    else {
        return;
    };
    if attacker_team == target_team {
        return;
    }

    history
        .team_last_attack
        .insert(attacker_team, (target_id, part_key));
    if target_is_leader {
        history
            .leader_last_attacked_by
            .insert(target_team, attacker_id);
    }
    if let Some(attacker) = roster.get_mut(attacker_id) {
        attacker.history.last_attack = Some((target_id, part_key));
    }
    if let Some(target) = roster.get_mut(target_id) {
        target.history.last_attacked_by = Some(attacker_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Combatant, Part, PartSet};

    fn combatant(id: EntityId, team: TeamId, leader: bool) -> Combatant {
        let part = |key| Part::new(key, "p", 10);
        let mut c = Combatant::new(
            id,
            "c",
            team,
            PartSet::new(
                part(PartKey::Head),
                part(PartKey::RightArm),
                part(PartKey::LeftArm),
                part(PartKey::Legs),
            ),
        );
        c.is_leader = leader;
        c
    }

    #[test]
    fn test_record_attack_updates_all_views() {
        let mut roster = Roster::new(vec![combatant(1, 0, false), combatant(2, 1, true)]);
        let mut history = BattleHistory::default();
        record_attack(&mut history, &mut roster, 1, 2, PartKey::Legs);

        assert_eq!(history.team_last_attack(0), Some((2, PartKey::Legs)));
        assert_eq!(history.leader_last_attacked_by(1), Some(1));
        assert_eq!(roster.get(2).unwrap().history.last_attacked_by, Some(1));
        assert_eq!(
            roster.get(1).unwrap().history.last_attack,
            Some((2, PartKey::Legs))
        );
    }

    #[test]
    fn test_friendly_actions_are_not_recorded() {
        let mut roster = Roster::new(vec![combatant(1, 0, false), combatant(2, 0, true)]);
        let mut history = BattleHistory::default();
        record_attack(&mut history, &mut roster, 1, 2, PartKey::Head);
        assert_eq!(history, BattleHistory::default());
    }
}
