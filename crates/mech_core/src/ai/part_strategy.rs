//! Which part to use.

use serde::{Deserialize, Serialize};

use crate::components::{Combatant, EffectKind, Part, PartKey};
use crate::rng::{pick, RandomSource};

use super::personality::CandidatePool;

/// Part-selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartStrategy {
    /// Highest might among offensive parts.
    PowerfulAttack,
    /// Highest might among healing parts.
    PowerfulHeal,
    /// Any usable part whose role fits the candidate pool.
    Random,
}

impl PartStrategy {
    /// Parse a data key such as `"powerful_attack"`.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "powerful_attack" => Some(PartStrategy::PowerfulAttack),
            "powerful_heal" => Some(PartStrategy::PowerfulHeal),
            "random" => Some(PartStrategy::Random),
            _ => None,
        }
    }

    /// Pick a part of `actor`, or `None` when nothing qualifies.
    pub fn select(
        self,
        actor: &Combatant,
        pool: CandidatePool,
        rng: &mut dyn RandomSource,
    ) -> Option<PartKey> {
        let usable: Vec<&Part> = actor
            .usable_parts()
            .into_iter()
            .map(|key| actor.parts.get(key))
            .collect();
        match self {
            PartStrategy::PowerfulAttack => {
                strongest(usable.into_iter().filter(|p| is_offensive(p)))
            }
            PartStrategy::PowerfulHeal => {
                strongest(usable.into_iter().filter(|p| p.has_effect(EffectKind::Heal)))
            }
            PartStrategy::Random => {
                let fitting: Vec<PartKey> = usable
                    .into_iter()
                    .filter(|p| pool.is_enemy_pool() == is_offensive(p))
                    .map(|p| p.key)
                    .collect();
                pick(rng, &fitting).copied()
            }
        }
    }
}

fn is_offensive(part: &Part) -> bool {
    !part.action_type.is_support()
}

/// Highest might; the first in declaration order wins ties.
fn strongest<'a>(parts: impl Iterator<Item = &'a Part>) -> Option<PartKey> {
    let mut best: Option<&Part> = None;
    for part in parts {
        if best.map_or(true, |b| part.stats.might > b.stats.might) {
            best = Some(part);
        }
    }
    best.map(|p| p.key)
}
