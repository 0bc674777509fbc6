//! Battle events, visual intents and state-update commands.
//!
//! The core never renders or formats text. It reports observable facts
//! as [`BattleEvent`]s, tells the presentation layer what to show with
//! [`VisualIntent`]s, and expresses every lifecycle change as a
//! [`StateUpdate`] for the executor in [`crate::readiness`].

use serde::{Deserialize, Serialize};

use crate::combat::HitOutcome;
use crate::components::{
    Action, CombatantState, EffectKind, EntityId, PartKey, StatusKind, TeamId,
};
use crate::targeting::GuardianInfo;

/// Why a queued or starting action was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CancelReason {
    /// The reserved part broke.
    PartBroken,
    /// The target became invalid.
    TargetLost,
    /// Disrupted, or the action data was incomplete.
    Interrupted,
}

/// Inbound action choice from a player or the AI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionChosen {
    /// Part to use.
    pub part_key: PartKey,
    /// Target, if the part needs one.
    pub target_id: Option<EntityId>,
    /// Target part; `None` resolves at execution.
    pub target_part_key: Option<PartKey>,
}

impl From<ActionChosen> for Action {
    fn from(choice: ActionChosen) -> Self {
        Action {
            part_key: Some(choice.part_key),
            target_id: choice.target_id,
            target_part_key: choice.target_part_key,
        }
    }
}

/// Observable battle facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleEvent {
    /// A combatant is waiting for an action choice.
    EntityReady {
        /// The combatant.
        entity_id: EntityId,
    },
    /// An action was chosen and is charging.
    ActionDeclared {
        /// The actor.
        entity_id: EntityId,
        /// The chosen action.
        action: Action,
    },
    /// A combatant changed lifecycle state.
    StateChanged {
        /// The combatant.
        entity_id: EntityId,
        /// Previous state.
        from: CombatantState,
        /// New state.
        to: CombatantState,
    },
    /// A part's HP changed.
    HpChanged {
        /// Owner of the part.
        entity_id: EntityId,
        /// The part.
        part_key: PartKey,
        /// HP before.
        old_hp: u32,
        /// HP after.
        new_hp: u32,
        /// Whether this was a heal.
        is_heal: bool,
    },
    /// A part reached zero HP.
    PartBroken {
        /// Owner of the part.
        entity_id: EntityId,
        /// The part.
        part_key: PartKey,
    },
    /// A combatant's head broke.
    CombatantDefeated {
        /// The combatant.
        entity_id: EntityId,
        /// Its team.
        team: TeamId,
    },
    /// A standing effect was granted.
    EffectApplied {
        /// Holder.
        entity_id: EntityId,
        /// Status kind.
        status: StatusKind,
        /// Magnitude.
        value: i32,
    },
    /// A standing effect ran out or was revoked.
    EffectExpired {
        /// Holder.
        entity_id: EntityId,
        /// Status kind.
        status: StatusKind,
        /// Granting part.
        source_part: PartKey,
    },
    /// A guardian intercepted an attack.
    GuardIntercepted {
        /// The guardian.
        guardian_id: EntityId,
        /// The teammate it protected.
        protected_id: EntityId,
    },
    /// An action was cancelled before resolving.
    ActionCancelled {
        /// The actor.
        entity_id: EntityId,
        /// Why.
        reason: CancelReason,
    },
    /// The battle ended.
    GameOver {
        /// The surviving team, if any.
        winning_team: Option<TeamId>,
    },
}

/// Declarative presentation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisualIntent {
    /// Play an action animation.
    Animate {
        /// The actor.
        entity_id: EntityId,
        /// Part being used.
        part_key: PartKey,
        /// Target, if any.
        target_id: Option<EntityId>,
    },
    /// Show a message by template key.
    Dialog {
        /// Template key.
        key: String,
        /// Template parameters.
        params: Vec<(String, String)>,
    },
    /// Tween an HP bar.
    UiAnimation {
        /// Owner of the part.
        entity_id: EntityId,
        /// The part.
        part_key: PartKey,
        /// HP to tween from.
        from_hp: u32,
        /// HP to tween to.
        to_hp: u32,
    },
    /// Show an effect overlay.
    ApplyVisualEffect {
        /// Combatant to decorate.
        entity_id: EntityId,
        /// Effect being shown.
        kind: EffectKind,
    },
}

impl VisualIntent {
    /// Build a dialog intent.
    #[must_use]
    pub fn dialog(key: &str, params: &[(&str, String)]) -> Self {
        VisualIntent::Dialog {
            key: key.to_string(),
            params: params
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        }
    }
}

/// Lifecycle commands applied by the state executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateCommand {
    /// Move to a state.
    TransitionState(CombatantState),
    /// Store an action and start charging it.
    DeclareAction(Action),
    /// Return to cooldown; interrupted resets keep partial credit.
    ResetToCooldown {
        /// Whether the gauge is inverted instead of zeroed.
        interrupted: bool,
    },
    /// The combatant is defeated.
    SetDefeated,
    /// Place the combatant on its action line.
    SnapToFixedPosition,
    /// Empty the action slot.
    ClearAction,
}

/// A command addressed to one combatant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Target combatant.
    pub entity_id: EntityId,
    /// The command.
    pub command: StateCommand,
}

impl StateUpdate {
    /// Address a command.
    #[must_use]
    pub const fn new(entity_id: EntityId, command: StateCommand) -> Self {
        Self { entity_id, command }
    }
}

/// Summary of one executed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// The actor.
    pub actor_id: EntityId,
    /// Part used; `None` when the action slot was empty.
    pub part_key: Option<PartKey>,
    /// Final target.
    pub target_id: Option<EntityId>,
    /// Final target part.
    pub target_part_key: Option<PartKey>,
    /// Hit roll.
    pub outcome: HitOutcome,
    /// Guardian that intercepted, if any.
    pub guardian: Option<GuardianInfo>,
    /// Set when the action was cancelled instead of resolved.
    pub cancelled: Option<CancelReason>,
    /// Total damage dealt.
    pub damage_dealt: u32,
    /// Total HP restored.
    pub healing_done: u32,
}

/// Everything a tick produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Tick number after the update.
    pub tick: u64,
    /// Facts, in order.
    pub events: Vec<BattleEvent>,
    /// Presentation requests, in order.
    pub visuals: Vec<VisualIntent>,
    /// Executed actions.
    pub results: Vec<ActionResult>,
}

impl TickReport {
    /// Whether the tick produced nothing observable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.visuals.is_empty() && self.results.is_empty()
    }
}
