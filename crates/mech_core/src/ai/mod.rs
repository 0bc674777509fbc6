//! AI decision layer.
//!
//! A [`Personality`] is an ordered list of routines. Each routine pairs a
//! [`PartStrategy`] with a [`TargetStrategy`] over a [`CandidatePool`]; the
//! first routine producing both a usable part and a target wins. When every
//! routine fails a random usable part is aimed at a random enemy.

pub mod part_strategy;
pub mod personality;
pub mod target_strategy;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::components::{Combatant, EntityId, PartKey};
use crate::events::ActionChosen;
use crate::history::BattleHistory;
use crate::rng::{pick, RandomSource};
use crate::roster::Roster;

pub use part_strategy::PartStrategy;
pub use personality::{
    CandidatePool, Personality, PersonalityData, PersonalityRegistry, Routine, RoutineData,
};
pub use target_strategy::TargetStrategy;

/// Read-only battle view handed to strategies.
#[derive(Debug, Clone, Copy)]
pub struct AiContext<'a> {
    /// All combatants.
    pub roster: &'a Roster,
    /// Battle-scoped attack history.
    pub history: &'a BattleHistory,
}

// ============================================================================
// Target Selection
// ============================================================================

/// A resolved target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetChoice {
    /// Target combatant.
    pub target_id: EntityId,
    /// Target part.
    pub part_key: PartKey,
}

/// One entry of a weighted candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeightedCandidate {
    /// The candidate.
    pub choice: TargetChoice,
    /// Relative preference.
    pub weight: u32,
}

/// What a targeting strategy returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetSelection {
    /// Already decided.
    Single(TargetChoice),
    /// Highest weight wins; ties are broken at random.
    Weighted(Vec<WeightedCandidate>),
}

impl TargetSelection {
    /// Reduce to one winner.
    pub fn normalize(self, rng: &mut dyn RandomSource) -> Option<TargetChoice> {
        match self {
            TargetSelection::Single(choice) => Some(choice),
            TargetSelection::Weighted(candidates) => {
                let top = candidates.iter().map(|c| c.weight).max()?;
                let best: Vec<TargetChoice> = candidates
                    .iter()
                    .filter(|c| c.weight == top)
                    .map(|c| c.choice)
                    .collect();
                pick(rng, &best).copied()
            }
        }
    }
}

// ============================================================================
// Decision
// ============================================================================

/// Choose an action for a combatant waiting in `ReadySelect`.
///
/// Returns `None` only when the combatant has no usable part.
pub fn decide(
    ctx: &AiContext<'_>,
    actor_id: EntityId,
    personality: &Personality,
    rng: &mut dyn RandomSource,
) -> Option<ActionChosen> {
    let actor = ctx.roster.get(actor_id)?;
    for (index, routine) in personality.routines.iter().enumerate() {
        let Some(part_key) = routine.part.select(actor, routine.pool, rng) else {
            continue;
        };
        if let Some(chosen) = complete(ctx, actor, part_key, routine, rng) {
            debug!(
                actor = actor_id,
                personality = %personality.key,
                routine = index,
                part = ?chosen.part_key,
                target = ?chosen.target_id,
                "ai decided"
            );
            return Some(chosen);
        }
    }
    fallback(ctx, actor, rng)
}

fn complete(
    ctx: &AiContext<'_>,
    actor: &Combatant,
    part_key: PartKey,
    routine: &Routine,
    rng: &mut dyn RandomSource,
) -> Option<ActionChosen> {
    if !actor.parts.get(part_key).needs_target() {
        return Some(untargeted(part_key));
    }
    let choice = routine
        .target
        .select(ctx, actor, routine.pool)?
        .normalize(rng)?;
    Some(ActionChosen {
        part_key,
        target_id: Some(choice.target_id),
        target_part_key: Some(choice.part_key),
    })
}

fn untargeted(part_key: PartKey) -> ActionChosen {
    ActionChosen {
        part_key,
        target_id: None,
        target_part_key: None,
    }
}

fn fallback(
    ctx: &AiContext<'_>,
    actor: &Combatant,
    rng: &mut dyn RandomSource,
) -> Option<ActionChosen> {
    let part_key = *pick(rng, &actor.usable_parts())?;
    let part = actor.parts.get(part_key);
    if !part.needs_target() {
        return Some(untargeted(part_key));
    }
    if part.action_type.is_support() {
        return Some(ActionChosen {
            part_key,
            target_id: Some(actor.id),
            target_part_key: None,
        });
    }
    let enemies: Vec<&Combatant> = ctx.roster.living_enemies_of(actor.team).collect();
    let Some(target) = pick(rng, &enemies) else {
        return Some(untargeted(part_key));
    };
    let target_part = pick(rng, &target.parts.unbroken_keys()).copied();
    debug!(actor = actor.id, part = ?part_key, target = target.id, "ai fallback");
    Some(ActionChosen {
        part_key,
        target_id: Some(target.id),
        target_part_key: target_part,
    })
}
