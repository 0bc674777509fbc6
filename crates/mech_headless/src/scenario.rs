//! Scenario loading and configuration.
//!
//! A scenario is everything needed to start a battle: tuning, the roster
//! and any personalities beyond the built-in set. Scenarios are loaded
//! from RON files or picked from the built-in list by name.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use mech_core::ai::{PersonalityData, PersonalityRegistry};
use mech_core::config::BattleConfig;
use mech_core::data::RosterData;
use mech_core::error::BattleError;
use mech_core::simulation::Battle;

const CONFIG_RON: &str = include_str!("../../../data/battle_config.ron");
const PERSONALITIES_RON: &str = include_str!("../../../data/personalities.ron");
const DUEL_RON: &str = include_str!("../../../data/rosters/duel.ron");
const SKIRMISH_RON: &str = include_str!("../../../data/rosters/skirmish_3v3.ron");

/// Names of the built-in scenarios.
pub const BUILTIN_SCENARIOS: [&str; 2] = ["duel", "skirmish_3v3"];

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Neither a file nor a built-in scenario.
    #[error("Unknown scenario '{0}' (built-in: duel, skirmish_3v3)")]
    UnknownScenario(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The battle core rejected the scenario's data.
    #[error(transparent)]
    Battle(#[from] BattleError),
}

/// A complete scenario configuration.
///
/// # Example RON
///
/// ```ron
/// Scenario(
///     name: "mirror",
///     config: (update_interval_ms: 20),
///     roster: (teams: [...]),
///     personalities: [(key: "sniper", routines: [...])],
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Battle tuning. The seed is overridden per run.
    #[serde(default)]
    pub config: BattleConfig,
    /// Teams and their loadouts.
    pub roster: RosterData,
    /// Personalities registered on top of the built-ins.
    #[serde(default)]
    pub personalities: Vec<PersonalityData>,
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Parse a scenario from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        Ok(ron::from_str(ron)?)
    }

    /// A built-in scenario by name.
    pub fn builtin(name: &str) -> Result<Self, ScenarioError> {
        let (description, roster_ron) = match name {
            "duel" => ("One gunner leader per side", DUEL_RON),
            "skirmish_3v3" => ("Leader, tank and skirmisher per side", SKIRMISH_RON),
            _ => return Err(ScenarioError::UnknownScenario(name.to_string())),
        };
        let label = format!("builtin:{name}");
        let roster = RosterData::from_ron_str(roster_ron, &label)?;
        let personalities: Vec<PersonalityData> = ron::from_str(PERSONALITIES_RON)?;
        Ok(Self {
            name: name.to_string(),
            description: description.to_string(),
            config: BattleConfig::from_ron_str(CONFIG_RON)?,
            roster,
            personalities,
        })
    }

    /// A file path if one exists, otherwise a built-in name.
    pub fn resolve(name_or_path: &str) -> Result<Self, ScenarioError> {
        let path = Path::new(name_or_path);
        if path.exists() {
            info!(path = %path.display(), "loading scenario file");
            Self::load(path)
        } else {
            Self::builtin(name_or_path)
        }
    }

    /// The built-in personalities plus this scenario's own.
    #[must_use]
    pub fn personality_registry(&self) -> PersonalityRegistry {
        let mut registry = PersonalityRegistry::builtin();
        for data in &self.personalities {
            let unknown = data.unknown_keys();
            if !unknown.is_empty() {
                warn!(personality = %data.key, ?unknown, "unknown strategy keys");
            }
            registry.register(data.build());
        }
        registry
    }

    /// Start a battle with the given seed.
    ///
    /// Nobody answers input in a headless run, so every combatant is put
    /// under AI control.
    pub fn start(&self, seed: u64) -> Result<Battle, ScenarioError> {
        let mut config = self.config.clone();
        config.seed = seed;

        let mut roster = self.roster.clone();
        for member in roster.teams.iter_mut().flat_map(|t| t.members.iter_mut()) {
            if !member.ai_controlled {
                warn!(combatant = %member.name, "human-controlled combatant driven by AI");
                member.ai_controlled = true;
            }
        }

        Ok(Battle::with_personalities(
            config,
            &roster,
            self.personality_registry(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_scenarios_load() {
        for name in BUILTIN_SCENARIOS {
            let scenario = Scenario::builtin(name).unwrap();
            assert!(scenario.roster.validate().is_empty(), "{name}");
            assert!(scenario.start(1).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_skirmish_scenario() {
        let scenario = Scenario::builtin("skirmish_3v3").unwrap();
        assert_eq!(scenario.roster.teams.len(), 2);
        assert_eq!(scenario.roster.combatant_count(), 6);
        let registry = scenario.personality_registry();
        assert!(registry.contains("sniper"));
        assert!(registry.contains("hunter"));
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(matches!(
            Scenario::resolve("no_such_scenario"),
            Err(ScenarioError::UnknownScenario(_))
        ));
    }

    #[test]
    fn test_parse_from_ron() {
        let ron = r#"Scenario(
            name: "inline",
            config: (update_interval_ms: 10),
            roster: (teams: [
                (id: 0, members: [(name: "A", is_leader: true,
                    head: (name: "H", max_hp: 10),
                    right_arm: (name: "R", max_hp: 10, effects: [(kind: "damage")]),
                    left_arm: (name: "L", max_hp: 10),
                    legs: (name: "G", max_hp: 10))]),
                (id: 1, members: [(name: "B", is_leader: true,
                    head: (name: "H", max_hp: 10),
                    right_arm: (name: "R", max_hp: 10, effects: [(kind: "damage")]),
                    left_arm: (name: "L", max_hp: 10),
                    legs: (name: "G", max_hp: 10))]),
            ]),
        )"#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        assert_eq!(scenario.name, "inline");
        assert_eq!(scenario.config.update_interval_ms, 10);
        assert!(scenario.personalities.is_empty());

        let battle = scenario.start(99).unwrap();
        assert_eq!(battle.config().seed, 99);
    }

    #[test]
    fn test_malformed_ron() {
        assert!(matches!(
            Scenario::from_ron_str("Scenario(name: "),
            Err(ScenarioError::ParseError(_))
        ));
    }
}
