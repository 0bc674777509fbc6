//! Combatant storage.
//!
//! Combatants live in a dense `Vec` in id order for deterministic
//! iteration, with an id index for lookup and a by-state index so that
//! "is anyone in state X" is a map lookup instead of a scan.

use std::collections::{BTreeMap, BTreeSet};

use crate::components::{Combatant, CombatantState, EntityId, TeamId};

/// All combatants of a battle.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    combatants: Vec<Combatant>,
    index: BTreeMap<EntityId, usize>,
    by_state: BTreeMap<CombatantState, BTreeSet<EntityId>>,
}

impl Roster {
    /// Build a roster. Combatants are kept sorted by id.
    #[must_use]
    pub fn new(mut combatants: Vec<Combatant>) -> Self {
        combatants.sort_by_key(|c| c.id);
        let index = combatants
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id, i))
            .collect();
        let mut by_state: BTreeMap<CombatantState, BTreeSet<EntityId>> = BTreeMap::new();
        for c in &combatants {
            by_state.entry(c.state).or_default().insert(c.id);
        }
        Self {
            combatants,
            index,
            by_state,
        }
    }

    /// Get a combatant.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Combatant> {
        self.index.get(&id).map(|&i| &self.combatants[i])
    }

    /// Get a combatant mutably.
    ///
    /// State changes must go through [`Roster::set_state`] to keep the
    /// by-state index current.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Combatant> {
        let i = *self.index.get(&id)?;
        Some(&mut self.combatants[i])
    }

    /// Move a combatant to a new state, returning the previous one.
    pub fn set_state(&mut self, id: EntityId, state: CombatantState) -> Option<CombatantState> {
        let i = *self.index.get(&id)?;
        let previous = self.combatants[i].state;
        if previous == state {
            return Some(previous);
        }
        if let Some(set) = self.by_state.get_mut(&previous) {
            set.remove(&id);
        }
        self.by_state.entry(state).or_default().insert(id);
        self.combatants[i].state = state;
        Some(previous)
    }

    /// Iterate combatants in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Combatant> {
        self.combatants.iter()
    }

    /// Iterate combatants mutably in id order.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Combatant> {
        self.combatants.iter_mut()
    }

    /// All ids in order.
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.combatants.iter().map(|c| c.id).collect()
    }

    /// Number of combatants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.combatants.len()
    }

    /// Whether the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.combatants.is_empty()
    }

    /// Ids of combatants in a state.
    #[must_use]
    pub fn in_state(&self, state: CombatantState) -> Vec<EntityId> {
        self.by_state
            .get(&state)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of combatants in a state.
    #[must_use]
    pub fn count_in_state(&self, state: CombatantState) -> usize {
        self.by_state.get(&state).map_or(0, BTreeSet::len)
    }

    /// Whether any combatant is in a state that pauses gauges.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.count_in_state(CombatantState::ReadySelect) > 0
            || self.count_in_state(CombatantState::ReadyExecute) > 0
    }

    /// Living members of a team.
    pub fn living_in_team(&self, team: TeamId) -> impl Iterator<Item = &Combatant> {
        self.combatants
            .iter()
            .filter(move |c| c.team == team && c.is_alive())
    }

    /// Living combatants not on a team.
    pub fn living_enemies_of(&self, team: TeamId) -> impl Iterator<Item = &Combatant> {
        self.combatants
            .iter()
            .filter(move |c| c.team != team && c.is_alive())
    }

    /// Distinct team ids in order.
    #[must_use]
    pub fn teams(&self) -> Vec<TeamId> {
        let teams: BTreeSet<TeamId> = self.combatants.iter().map(|c| c.team).collect();
        teams.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Part, PartKey, PartSet};

    fn combatant(id: EntityId, team: TeamId) -> Combatant {
        let part = |key| Part::new(key, "p", 10);
        Combatant::new(
            id,
            "c",
            team,
            PartSet::new(
                part(PartKey::Head),
                part(PartKey::RightArm),
                part(PartKey::LeftArm),
                part(PartKey::Legs),
            ),
        )
    }

    #[test]
    fn test_state_index_tracks_transitions() {
        let mut roster = Roster::new(vec![combatant(2, 0), combatant(1, 1)]);
        assert_eq!(roster.ids(), vec![1, 2]);
        assert_eq!(roster.count_in_state(CombatantState::Charging), 2);
        assert!(!roster.is_paused());

        roster.set_state(2, CombatantState::ReadySelect);
        assert!(roster.is_paused());
        assert_eq!(roster.in_state(CombatantState::ReadySelect), vec![2]);
        assert_eq!(roster.get(2).unwrap().state(), CombatantState::ReadySelect);

        roster.set_state(2, CombatantState::SelectedCharging);
        assert!(!roster.is_paused());
        assert_eq!(roster.count_in_state(CombatantState::Charging), 1);
    }

    #[test]
    fn test_team_queries_skip_defeated() {
        let mut roster = Roster::new(vec![combatant(1, 0), combatant(2, 0), combatant(3, 1)]);
        roster
            .get_mut(2)
            .unwrap()
            .parts
            .get_mut(PartKey::Head)
            .apply_damage(99);
        assert_eq!(roster.living_in_team(0).count(), 1);
        assert_eq!(roster.living_enemies_of(1).count(), 1);
        assert_eq!(roster.teams(), vec![0, 1]);
    }
}
