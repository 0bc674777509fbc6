//! Personalities: ordered routine lists keyed by name.
//!
//! Built-ins ship with the crate; more can be loaded from RON. Unknown
//! strategy keys in data are logged and the routine is dropped. Unknown
//! personality keys resolve to the fallback personality.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BattleError, Result};

use super::part_strategy::PartStrategy;
use super::target_strategy::TargetStrategy;

/// Which combatants a routine may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CandidatePool {
    /// Living enemies.
    #[default]
    Enemies,
    /// Living teammates other than the actor.
    AlliesExcludingSelf,
    /// Living teammates including the actor.
    AlliesIncludingSelf,
}

impl CandidatePool {
    /// Whether the pool holds enemies.
    #[must_use]
    pub const fn is_enemy_pool(self) -> bool {
        matches!(self, CandidatePool::Enemies)
    }
}

/// One (part, target, pool) attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Routine {
    /// Part selection.
    pub part: PartStrategy,
    /// Target selection.
    pub target: TargetStrategy,
    /// Candidate pool.
    pub pool: CandidatePool,
}

impl Routine {
    const fn new(part: PartStrategy, target: TargetStrategy, pool: CandidatePool) -> Self {
        Self { part, target, pool }
    }

    const fn attack(target: TargetStrategy) -> Self {
        Self::new(PartStrategy::PowerfulAttack, target, CandidatePool::Enemies)
    }
}

/// A named AI behavior profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Personality {
    /// Lookup key.
    pub key: String,
    /// Routines in priority order.
    pub routines: Vec<Routine>,
}

// ============================================================================
// Data Form
// ============================================================================

/// Routine as written in data files, with string strategy keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineData {
    /// Part strategy key, e.g. `"powerful_attack"`.
    pub part: String,
    /// Target strategy key, e.g. `"weakest_part"`.
    pub target: String,
    /// Candidate pool.
    #[serde(default)]
    pub pool: CandidatePool,
}

/// Personality as written in data files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalityData {
    /// Lookup key.
    pub key: String,
    /// Routines in priority order.
    pub routines: Vec<RoutineData>,
}

impl PersonalityData {
    /// Unknown strategy keys, for validation tooling.
    #[must_use]
    pub fn unknown_keys(&self) -> Vec<String> {
        let mut unknown = Vec::new();
        for routine in &self.routines {
            if PartStrategy::from_key(&routine.part).is_none() {
                unknown.push(routine.part.clone());
            }
            if TargetStrategy::from_key(&routine.target).is_none() {
                unknown.push(routine.target.clone());
            }
        }
        unknown
    }

    /// Convert to a runtime personality, dropping routines with unknown keys.
    #[must_use]
    pub fn build(&self) -> Personality {
        let routines = self
            .routines
            .iter()
            .filter_map(|r| {
                let part = PartStrategy::from_key(&r.part);
                let target = TargetStrategy::from_key(&r.target);
                match (part, target) {
                    (Some(part), Some(target)) => Some(Routine::new(part, target, r.pool)),
                    _ => {
                        warn!(
                            personality = %self.key,
                            part = %r.part,
                            target = %r.target,
                            "unknown strategy key, routine dropped"
                        );
                        None
                    }
                }
            })
            .collect();
        Personality {
            key: self.key.clone(),
            routines,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Personality lookup with a guaranteed fallback.
#[derive(Debug, Clone)]
pub struct PersonalityRegistry {
    personalities: BTreeMap<String, Personality>,
    fallback: Personality,
}

impl PersonalityRegistry {
    /// Key of the personality used when a lookup fails.
    pub const FALLBACK_KEY: &'static str = "random";

    /// The built-in personalities.
    #[must_use]
    pub fn builtin() -> Self {
        use CandidatePool::{AlliesIncludingSelf, Enemies};
        use TargetStrategy as T;

        let random = Routine::new(PartStrategy::Random, T::Random, Enemies);
        let table: [(&str, Vec<Routine>); 11] = [
            ("hunter", vec![Routine::attack(T::WeakestPart)]),
            ("crusher", vec![Routine::attack(T::StrongestPart)]),
            ("speed", vec![Routine::attack(T::Speed)]),
            ("joker", vec![random]),
            ("counter", vec![Routine::attack(T::Counter), Routine::attack(T::Random)]),
            ("guard", vec![Routine::attack(T::GuardLeader), Routine::attack(T::Random)]),
            ("focus", vec![Routine::attack(T::Focus), Routine::attack(T::Random)]),
            (
                "leader_hunter",
                vec![Routine::attack(T::EnemyLeader), Routine::attack(T::Random)],
            ),
            ("brawler", vec![Routine::attack(T::Nearest)]),
            (
                "healer",
                vec![
                    Routine::new(
                        PartStrategy::PowerfulHeal,
                        T::MostDamagedAlly,
                        AlliesIncludingSelf,
                    ),
                    Routine::attack(T::Random),
                ],
            ),
            (Self::FALLBACK_KEY, vec![random]),
        ];

        let personalities: BTreeMap<String, Personality> = table
            .into_iter()
            .map(|(key, routines)| {
                (
                    key.to_string(),
                    Personality {
                        key: key.to_string(),
                        routines,
                    },
                )
            })
            .collect();
        let fallback = Personality {
            key: Self::FALLBACK_KEY.to_string(),
            routines: vec![random],
        };
        Self {
            personalities,
            fallback,
        }
    }

    /// Built-ins plus every personality in a RON list of [`PersonalityData`].
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let entries: Vec<PersonalityData> =
            ron::from_str(source).map_err(|e| BattleError::DataParseError {
                path: "<personalities>".to_string(),
                message: e.to_string(),
            })?;
        let mut registry = Self::builtin();
        for entry in &entries {
            registry.register(entry.build());
        }
        Ok(registry)
    }

    /// Add or replace a personality.
    pub fn register(&mut self, personality: Personality) {
        self.personalities
            .insert(personality.key.clone(), personality);
    }

    /// Use another registered personality as the fallback.
    pub fn set_fallback(&mut self, key: &str) -> Result<()> {
        let personality = self
            .get(key)
            .cloned()
            .ok_or_else(|| BattleError::UnknownPersonality(key.to_string()))?;
        self.fallback = personality;
        Ok(())
    }

    /// Exact lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Personality> {
        self.personalities.get(key)
    }

    /// Whether a key is registered.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.personalities.contains_key(key)
    }

    /// Registered keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.personalities.keys().map(String::as_str)
    }

    /// Lookup that never fails: unknown keys log a warning and get the
    /// fallback.
    #[must_use]
    pub fn resolve(&self, key: &str) -> &Personality {
        self.get(key).unwrap_or_else(|| {
            warn!(key, fallback = %self.fallback.key, "unknown personality");
            &self.fallback
        })
    }
}

impl Default for PersonalityRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
