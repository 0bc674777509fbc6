//! Combatant, team and roster data.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ai::PersonalityRegistry;
use crate::components::{Combatant, EntityId, PartKey, PartSet, TeamId};
use crate::config::BattleConfig;
use crate::error::{BattleError, Result};

use super::part_data::PartData;

const fn default_ai_controlled() -> bool {
    true
}

/// Data-driven combatant definition: exactly four parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatantData {
    /// Display name.
    pub name: String,

    /// Head part.
    pub head: PartData,

    /// Right arm part.
    pub right_arm: PartData,

    /// Left arm part.
    pub left_arm: PartData,

    /// Legs part.
    pub legs: PartData,

    /// Personality key. Defaults to the config's fallback personality.
    #[serde(default)]
    pub personality: Option<String>,

    /// Whether the AI picks actions for this combatant.
    #[serde(default = "default_ai_controlled")]
    pub ai_controlled: bool,

    /// Whether this is the team leader.
    #[serde(default)]
    pub is_leader: bool,
}

impl CombatantData {
    /// Part data by key.
    #[must_use]
    pub fn part(&self, key: PartKey) -> &PartData {
        match key {
            PartKey::Head => &self.head,
            PartKey::RightArm => &self.right_arm,
            PartKey::LeftArm => &self.left_arm,
            PartKey::Legs => &self.legs,
        }
    }

    /// Problems with this combatant. Empty when valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("combatant name is empty".to_string());
        }
        for key in PartKey::ALL {
            errors.extend(
                self.part(key)
                    .validate(key)
                    .into_iter()
                    .map(|e| format!("{}: {e}", self.name)),
            );
        }
        errors
    }
}

/// One team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamData {
    /// Team identifier.
    pub id: TeamId,

    /// Members in slot order.
    pub members: Vec<CombatantData>,
}

/// Everyone in a battle.
///
/// # Example RON
///
/// ```ron
/// RosterData(
///     teams: [
///         (id: 0, members: [(name: "Alpha", is_leader: true, head: (...), ...)]),
///         (id: 1, members: [...]),
///     ],
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterData {
    /// Teams in the battle.
    pub teams: Vec<TeamData>,
}

impl RosterData {
    /// Parse from RON. `label` names the source in errors.
    pub fn from_ron_str(source: &str, label: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| BattleError::DataParseError {
            path: label.to_string(),
            message: e.to_string(),
        })
    }

    /// Number of combatants across all teams.
    #[must_use]
    pub fn combatant_count(&self) -> usize {
        self.teams.iter().map(|t| t.members.len()).sum()
    }

    /// Problems with the roster. Empty when valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.teams.len() < 2 {
            errors.push(format!(
                "a battle needs at least two teams, found {}",
                self.teams.len()
            ));
        }
        let mut seen = BTreeSet::new();
        for team in &self.teams {
            if !seen.insert(team.id) {
                errors.push(format!("duplicate team id {}", team.id));
            }
            if team.members.is_empty() {
                errors.push(format!("team {} has no members", team.id));
            }
            let leaders = team.members.iter().filter(|m| m.is_leader).count();
            if leaders > 1 {
                errors.push(format!("team {} has {leaders} leaders", team.id));
            }
            for member in &team.members {
                errors.extend(
                    member
                        .validate()
                        .into_iter()
                        .map(|e| format!("team {}: {e}", team.id)),
                );
            }
        }
        errors
    }

    /// Personality keys the registry does not know, with their owners.
    #[must_use]
    pub fn unknown_personalities(&self, personalities: &PersonalityRegistry) -> Vec<String> {
        self.teams
            .iter()
            .flat_map(|t| t.members.iter())
            .filter_map(|m| {
                let key = m.personality.as_deref()?;
                (!personalities.contains(key))
                    .then(|| format!("{}: unknown personality '{key}'", m.name))
            })
            .collect()
    }

    /// Deep-copy into runtime combatants.
    ///
    /// Ids are assigned from 1 in team then slot order. Home positions come
    /// from the config. Unknown personalities are replaced by the config's
    /// fallback with a warning.
    pub fn build(
        &self,
        config: &BattleConfig,
        personalities: &PersonalityRegistry,
    ) -> Result<Vec<Combatant>> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(BattleError::InvalidData(errors.join("; ")));
        }

        let mut combatants = Vec::with_capacity(self.combatant_count());
        let mut next_id: EntityId = 1;
        for team in &self.teams {
            for (slot, member) in team.members.iter().enumerate() {
                let parts = PartSet::new(
                    member.head.build(PartKey::Head),
                    member.right_arm.build(PartKey::RightArm),
                    member.left_arm.build(PartKey::LeftArm),
                    member.legs.build(PartKey::Legs),
                );
                let mut combatant = Combatant::new(next_id, member.name.clone(), team.id, parts);
                combatant.is_leader = member.is_leader;
                combatant.ai_controlled = member.ai_controlled;
                combatant.personality = match member.personality.as_deref() {
                    Some(key) if personalities.contains(key) => key.to_string(),
                    Some(key) => {
                        warn!(
                            combatant = %member.name,
                            key,
                            fallback = %config.fallback_personality,
                            "unknown personality"
                        );
                        config.fallback_personality.clone()
                    }
                    None => config.fallback_personality.clone(),
                };
                combatant.home = config.home_position(team.id, slot);
                combatant.position = combatant.home;
                combatants.push(combatant);
                next_id += 1;
            }
        }
        Ok(combatants)
    }
}
