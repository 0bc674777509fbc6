//! Effect pipeline.
//!
//! Every effect kind has a handler with two phases:
//!
//! - **process** reads the battle and produces zero or more
//!   [`EffectRecord`]s. It never mutates.
//! - **apply** commits one record against the roster and reports what
//!   happened as an [`AppliedEffect`]: observable events plus
//!   state-update commands for the executor.
//!
//! Handlers are plain function pointers looked up by [`EffectKind`] in an
//! [`EffectRegistry`]. Kinds without a handler are logged and skipped.

mod damage;
mod heal;
pub mod pipeline;
mod status;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::combat::HitOutcome;
use crate::components::{
    Combatant, CombatantState, EffectDef, EffectKind, EntityId, PartKey, StatusKind, TargetScope,
};
use crate::config::BattleConfig;
use crate::events::{BattleEvent, StateCommand, StateUpdate, VisualIntent};
use crate::roster::Roster;

pub use pipeline::{run_pipeline, PipelineOutput, PipelineRequest};

/// Guard uses granted when the data names none.
pub const DEFAULT_GUARD_USES: u32 = 2;

/// Scan duration, in the holder's completed actions, when the data names none.
pub const DEFAULT_SCAN_DURATION: u32 = 3;

// ============================================================================
// Records
// ============================================================================

/// A computed effect waiting to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectRecord {
    /// Effect kind.
    pub kind: EffectKind,
    /// Combatant that caused it.
    pub source_id: EntityId,
    /// Part that caused it.
    pub source_part: PartKey,
    /// Combatant it lands on.
    pub target_id: EntityId,
    /// Part it lands on, for part-level effects.
    pub part_key: Option<PartKey>,
    /// Magnitude: damage, healing, bonus or uses.
    pub value: u32,
    /// Duration in the holder's completed actions.
    pub duration: Option<u32>,
    /// Critical hit.
    pub is_critical: bool,
    /// Deflected onto the best-defense part.
    pub is_defended: bool,
    /// Overkill carries over to another part.
    pub penetrates: bool,
    /// Penetration follow-ups before this one.
    pub chain_depth: u8,
}

impl EffectRecord {
    /// A record with no hit modifiers.
    #[must_use]
    pub fn new(
        kind: EffectKind,
        source_id: EntityId,
        source_part: PartKey,
        target_id: EntityId,
    ) -> Self {
        Self {
            kind,
            source_id,
            source_part,
            target_id,
            part_key: None,
            value: 0,
            duration: None,
            is_critical: false,
            is_defended: false,
            penetrates: false,
            chain_depth: 0,
        }
    }
}

/// Result of applying one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedEffect {
    /// The applied record.
    pub record: EffectRecord,
    /// HP of the affected part before.
    pub old_hp: u32,
    /// HP of the affected part after.
    pub new_hp: u32,
    /// Whether this application broke the part.
    pub is_part_broken: bool,
    /// Damage beyond the part's remaining HP.
    pub overkill: u32,
    /// Observable facts.
    pub events: Vec<BattleEvent>,
    /// Commands for the state executor.
    pub state_updates: Vec<StateUpdate>,
}

impl AppliedEffect {
    /// An application that changed no HP.
    #[must_use]
    pub fn unchanged(record: EffectRecord) -> Self {
        Self {
            record,
            old_hp: 0,
            new_hp: 0,
            is_part_broken: false,
            overkill: 0,
            events: Vec::new(),
            state_updates: Vec::new(),
        }
    }
}

// ============================================================================
// Context
// ============================================================================

/// Read-only view handed to process functions.
#[derive(Debug, Clone, Copy)]
pub struct EffectContext<'a> {
    /// All combatants.
    pub roster: &'a Roster,
    /// Battle tuning.
    pub config: &'a BattleConfig,
    /// The acting combatant.
    pub actor_id: EntityId,
    /// The part being used.
    pub part_key: PartKey,
    /// The effect being processed.
    pub def: &'a EffectDef,
    /// Final target after redirection.
    pub target_id: Option<EntityId>,
    /// Hit roll, including the final target part.
    pub outcome: HitOutcome,
}

impl<'a> EffectContext<'a> {
    /// The actor.
    #[must_use]
    pub fn actor(&self) -> Option<&'a Combatant> {
        self.roster.get(self.actor_id)
    }

    /// The final target.
    #[must_use]
    pub fn target(&self) -> Option<&'a Combatant> {
        self.target_id.and_then(|id| self.roster.get(id))
    }

    /// Combatants this effect lands on, per its scope.
    #[must_use]
    pub fn scope_targets(&self) -> Vec<EntityId> {
        match self.def.scope {
            TargetScope::Enemy => self.target_id.into_iter().collect(),
            TargetScope::Ally => vec![self.target_id.unwrap_or(self.actor_id)],
            TargetScope::SelfOnly => vec![self.actor_id],
            TargetScope::AllyTeam => self.actor().map_or_else(Vec::new, |actor| {
                self.roster
                    .living_in_team(actor.team)
                    .map(|c| c.id)
                    .collect()
            }),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Computes records from the battle state.
pub type ProcessFn = fn(&EffectContext<'_>) -> Vec<EffectRecord>;
/// Commits one record.
pub type ApplyFn = fn(&EffectRecord, &mut Roster) -> AppliedEffect;
/// Describes an application for the presentation layer.
pub type VisualFn = fn(&AppliedEffect) -> Vec<VisualIntent>;

/// Process, apply and visual functions for one effect kind.
#[derive(Debug, Clone, Copy)]
pub struct EffectHandler {
    /// Process phase.
    pub process: ProcessFn,
    /// Apply phase.
    pub apply: ApplyFn,
    /// Visual resolution.
    pub visual: VisualFn,
}

/// Maps effect kinds to their handlers.
#[derive(Debug, Clone, Default)]
pub struct EffectRegistry {
    handlers: BTreeMap<EffectKind, EffectHandler>,
}

impl EffectRegistry {
    /// A registry with no handlers.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry with every built-in handler.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(EffectKind::Damage, damage::handler());
        registry.register(EffectKind::Heal, heal::handler());
        registry.register(EffectKind::ApplyScan, status::scan_handler());
        registry.register(EffectKind::ApplyGlitch, status::glitch_handler());
        registry.register(EffectKind::ApplyGuard, status::guard_handler());
        registry.register(EffectKind::ConsumeGuard, status::consume_guard_handler());
        registry
    }

    /// Register or replace a handler.
    pub fn register(&mut self, kind: EffectKind, handler: EffectHandler) {
        self.handlers.insert(kind, handler);
    }

    /// Remove a handler.
    pub fn unregister(&mut self, kind: EffectKind) -> Option<EffectHandler> {
        self.handlers.remove(&kind)
    }

    /// Look up a handler.
    #[must_use]
    pub fn get(&self, kind: EffectKind) -> Option<&EffectHandler> {
        self.handlers.get(&kind)
    }
}

// ============================================================================
// Shared Apply Helpers
// ============================================================================

/// Revoke every standing effect granted by one part, on every holder.
///
/// A holder that loses its guard while guarding drops back to cooldown.
pub(crate) fn revoke_granted_by(
    roster: &mut Roster,
    source_id: EntityId,
    source_part: PartKey,
    events: &mut Vec<BattleEvent>,
    updates: &mut Vec<StateUpdate>,
) {
    for holder in roster.iter_mut() {
        let revoked = holder.effects.revoke_from_part(source_id, source_part);
        let mut lost_guard = false;
        for effect in revoked {
            lost_guard |= effect.kind == StatusKind::Guard;
            events.push(BattleEvent::EffectExpired {
                entity_id: holder.id,
                status: effect.kind,
                source_part: effect.source_part,
            });
        }
        if lost_guard && holder.state() == CombatantState::Guarding {
            updates.push(StateUpdate::new(
                holder.id,
                StateCommand::ResetToCooldown { interrupted: false },
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_covers_all_kinds() {
        let registry = EffectRegistry::standard();
        for kind in EffectKind::ALL {
            assert!(registry.get(kind).is_some(), "missing handler for {kind:?}");
        }
    }

    #[test]
    fn test_unregister() {
        let mut registry = EffectRegistry::standard();
        assert!(registry.unregister(EffectKind::Heal).is_some());
        assert!(registry.get(EffectKind::Heal).is_none());
    }
}
