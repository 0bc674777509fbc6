//! Targeting resolver.
//!
//! Turns an intended target into the one actually hit: validity checks
//! for offensive actions, then guard redirection onto at most one
//! guardian.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::components::{Combatant, EntityId, PartKey, PartSet};
use crate::roster::Roster;

/// A guardian that took a hit for a teammate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuardianInfo {
    /// The guardian.
    pub guardian_id: EntityId,
    /// The teammate that was originally targeted.
    pub protected_id: EntityId,
    /// Part that granted the guard; the redirected hit lands here.
    pub guard_part: PartKey,
}

/// Result of target resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetResolution {
    /// Combatant actually targeted.
    pub final_target_id: Option<EntityId>,
    /// Part actually targeted.
    pub final_target_part_key: Option<PartKey>,
    /// Set when a guardian intercepted.
    pub guardian: Option<GuardianInfo>,
    /// The intended target is no longer valid.
    pub should_cancel: bool,
}

impl TargetResolution {
    fn cancelled() -> Self {
        Self {
            final_target_id: None,
            final_target_part_key: None,
            guardian: None,
            should_cancel: true,
        }
    }
}

/// A target is valid while its head is unbroken.
#[must_use]
pub fn is_valid_target(target: &Combatant) -> bool {
    target.is_alive()
}

/// Resolve the final target of an action.
///
/// Support actions pass through untouched. Offensive actions cancel when
/// the target is defeated or the requested part is broken, and otherwise
/// may be redirected to a guardian on the target's team.
#[must_use]
pub fn resolve_target(
    roster: &Roster,
    attacker_id: EntityId,
    intended_target: Option<EntityId>,
    intended_part: Option<PartKey>,
    is_support: bool,
) -> TargetResolution {
    if is_support {
        return TargetResolution {
            final_target_id: intended_target,
            final_target_part_key: intended_part,
            guardian: None,
            should_cancel: false,
        };
    }

    let Some(target) = intended_target.and_then(|id| roster.get(id)) else {
        return TargetResolution::cancelled();
    };
    if !is_valid_target(target) {
        return TargetResolution::cancelled();
    }
    if intended_part.is_some_and(|key| target.parts.get(key).is_broken()) {
        return TargetResolution::cancelled();
    }

    if let Some(guardian) = find_guardian(roster, attacker_id, target) {
        debug!(
            attacker = attacker_id,
            protected = target.id,
            guardian = guardian.guardian_id,
            "Guard redirect"
        );
        return TargetResolution {
            final_target_id: Some(guardian.guardian_id),
            final_target_part_key: Some(guardian.guard_part),
            guardian: Some(guardian),
            should_cancel: false,
        };
    }

    TargetResolution {
        final_target_id: Some(target.id),
        final_target_part_key: intended_part,
        guardian: None,
        should_cancel: false,
    }
}

/// Find the guardian for an attack on `target`.
///
/// Candidates are the target's living teammates (never the target or the
/// attacker) holding a guard with uses left whose granting part is
/// unbroken. The one with the most HP on its guard part wins; the first
/// found wins ties.
#[must_use]
pub fn find_guardian(
    roster: &Roster,
    attacker_id: EntityId,
    target: &Combatant,
) -> Option<GuardianInfo> {
    let mut best: Option<(u32, GuardianInfo)> = None;
    for candidate in roster.living_in_team(target.team) {
        if candidate.id == target.id || candidate.id == attacker_id {
            continue;
        }
        let Some(guard) = candidate.effects.active_guard() else {
            continue;
        };
        let part = candidate.parts.get(guard.source_part);
        if guard.source_id != candidate.id || part.is_broken() {
            continue;
        }
        if best.as_ref().map_or(true, |(hp, _)| part.hp() > *hp) {
            best = Some((
                part.hp(),
                GuardianInfo {
                    guardian_id: candidate.id,
                    protected_id: target.id,
                    guard_part: guard.source_part,
                },
            ));
        }
    }
    best.map(|(_, info)| info)
}

/// The unbroken non-head part with the most HP, first in declaration order
/// on ties.
#[must_use]
pub fn best_defense_part(parts: &PartSet) -> Option<PartKey> {
    let mut best: Option<(u32, PartKey)> = None;
    for part in parts.iter() {
        if part.key == PartKey::Head || part.is_broken() {
            continue;
        }
        if best.map_or(true, |(hp, _)| part.hp() > hp) {
            best = Some((part.hp(), part.key));
        }
    }
    best.map(|(_, key)| key)
}
