//! Combatant data model.
//!
//! Components are pure data with no battle behavior. A [`Combatant`] is
//! composed of four [`Part`]s, a [`Gauge`], a discrete [`CombatantState`],
//! an [`Action`] slot and its [`ActiveEffects`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::math::{fixed_decimal, fixed_serde, Fixed, Vec2Fixed};

/// Unique identifier for combatants.
pub type EntityId = u64;

/// Team identifier.
pub type TeamId = u8;

// ============================================================================
// Parts and Stats
// ============================================================================

/// One of the four body locations of a combatant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PartKey {
    /// Head. Vital: breaking it defeats the combatant.
    Head,
    /// Right arm.
    RightArm,
    /// Left arm.
    LeftArm,
    /// Legs. Source of mobility, propulsion and defensive stats.
    Legs,
}

impl PartKey {
    /// All part keys in declaration order.
    pub const ALL: [PartKey; 4] = [
        PartKey::Head,
        PartKey::RightArm,
        PartKey::LeftArm,
        PartKey::Legs,
    ];

    /// Declaration-order index.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            PartKey::Head => 0,
            PartKey::RightArm => 1,
            PartKey::LeftArm => 2,
            PartKey::Legs => 3,
        }
    }

    /// Whether the part can be chosen to perform an action.
    #[must_use]
    pub const fn is_action_part(self) -> bool {
        !matches!(self, PartKey::Legs)
    }

    /// Whether breaking this part defeats the combatant.
    #[must_use]
    pub const fn is_vital(self) -> bool {
        matches!(self, PartKey::Head)
    }
}

/// Stat identifiers, used by effect parameters and modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatKind {
    /// Offensive power.
    Might,
    /// Accuracy; raises hit and critical chances.
    Success,
    /// Raises the chance to deflect onto the best-defense part.
    Armor,
    /// Evasion and damage reduction.
    Mobility,
    /// Turn-order priority and gauge top speed.
    Propulsion,
    /// Reserved for knockback-style effects.
    Stability,
    /// Flat damage reduction.
    Defense,
}

/// Stat block of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PartStats {
    /// Offensive power.
    pub might: i32,
    /// Accuracy.
    pub success: i32,
    /// Deflection.
    pub armor: i32,
    /// Evasion.
    pub mobility: i32,
    /// Turn-order priority.
    pub propulsion: i32,
    /// Stability.
    pub stability: i32,
    /// Flat damage reduction.
    pub defense: i32,
}

impl PartStats {
    /// Read a stat by kind.
    #[must_use]
    pub const fn get(&self, stat: StatKind) -> i32 {
        match stat {
            StatKind::Might => self.might,
            StatKind::Success => self.success,
            StatKind::Armor => self.armor,
            StatKind::Mobility => self.mobility,
            StatKind::Propulsion => self.propulsion,
            StatKind::Stability => self.stability,
            StatKind::Defense => self.defense,
        }
    }
}

/// Additive stat modifier contributed by traits, action types or effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatModifier {
    /// Stat being modified.
    pub stat: StatKind,
    /// Amount added to the stat.
    pub value: i32,
}

/// What a part does when used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum ActionType {
    /// Ranged attack on a chosen target.
    #[default]
    Shoot,
    /// Close attack; the target is resolved at execution time.
    Melee,
    /// Restores HP on an ally part.
    Heal,
    /// Buffs allies.
    Support,
    /// Disrupts an enemy's queued action.
    Interrupt,
    /// Protects allies by intercepting attacks.
    Defend,
}

impl ActionType {
    /// Support actions always hit and are never redirected.
    #[must_use]
    pub const fn is_support(self) -> bool {
        matches!(self, ActionType::Heal | ActionType::Support | ActionType::Defend)
    }

    /// Whether the target is picked when the action executes instead of
    /// when it is declared.
    #[must_use]
    pub const fn resolves_target_on_execute(self) -> bool {
        matches!(self, ActionType::Melee)
    }
}

// ============================================================================
// Effect Definitions
// ============================================================================

/// Kinds of effects a part can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    /// Removes HP from a target part.
    Damage,
    /// Restores HP to an ally part.
    Heal,
    /// Grants a success bonus to the team.
    ApplyScan,
    /// Cancels a target's queued action or guard.
    ApplyGlitch,
    /// Lets the user intercept attacks aimed at teammates.
    ApplyGuard,
    /// Spends one guard use.
    ConsumeGuard,
}

impl EffectKind {
    /// All effect kinds.
    pub const ALL: [EffectKind; 6] = [
        EffectKind::Damage,
        EffectKind::Heal,
        EffectKind::ApplyScan,
        EffectKind::ApplyGlitch,
        EffectKind::ApplyGuard,
        EffectKind::ConsumeGuard,
    ];

    /// Parse a data key such as `"damage"` or `"apply_scan"`.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "damage" => Some(EffectKind::Damage),
            "heal" => Some(EffectKind::Heal),
            "apply_scan" => Some(EffectKind::ApplyScan),
            "apply_glitch" => Some(EffectKind::ApplyGlitch),
            "apply_guard" => Some(EffectKind::ApplyGuard),
            "consume_guard" => Some(EffectKind::ConsumeGuard),
            _ => None,
        }
    }

    /// Data key of this kind.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            EffectKind::Damage => "damage",
            EffectKind::Heal => "heal",
            EffectKind::ApplyScan => "apply_scan",
            EffectKind::ApplyGlitch => "apply_glitch",
            EffectKind::ApplyGuard => "apply_guard",
            EffectKind::ConsumeGuard => "consume_guard",
        }
    }

    /// Scope used when the data does not name one.
    #[must_use]
    pub const fn default_scope(self) -> TargetScope {
        match self {
            EffectKind::Damage | EffectKind::ApplyGlitch | EffectKind::ConsumeGuard => {
                TargetScope::Enemy
            }
            EffectKind::Heal => TargetScope::Ally,
            EffectKind::ApplyScan => TargetScope::AllyTeam,
            EffectKind::ApplyGuard => TargetScope::SelfOnly,
        }
    }
}

/// Who an effect lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetScope {
    /// The (possibly redirected) enemy target.
    Enemy,
    /// The chosen ally, or the user when none was chosen.
    Ally,
    /// The user.
    SelfOnly,
    /// Every living member of the user's team.
    AllyTeam,
}

impl TargetScope {
    /// Whether the effect needs a chosen target at all.
    #[must_use]
    pub const fn needs_target(self) -> bool {
        matches!(self, TargetScope::Enemy | TargetScope::Ally)
    }
}

const fn default_base_stat() -> StatKind {
    StatKind::Success
}

const fn default_power_stat() -> StatKind {
    StatKind::Might
}

/// Calculation parameter overrides for one declared effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalcParams {
    /// Stat feeding the base value.
    #[serde(default = "default_base_stat")]
    pub base_stat: StatKind,
    /// Stat feeding the power value.
    #[serde(default = "default_power_stat")]
    pub power_stat: StatKind,
    /// Fixed magnitude (damage, healing, scan bonus) instead of a derived one.
    #[serde(default)]
    pub amount: Option<i32>,
    /// Scan duration in the holder's completed actions, or guard use-count.
    #[serde(default)]
    pub duration: Option<u32>,
}

impl Default for CalcParams {
    fn default() -> Self {
        Self {
            base_stat: default_base_stat(),
            power_stat: default_power_stat(),
            amount: None,
            duration: None,
        }
    }
}

/// A resolved effect declaration on a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectDef {
    /// Effect kind.
    pub kind: EffectKind,
    /// Calculation parameters.
    pub params: CalcParams,
    /// Target scope.
    pub scope: TargetScope,
}

impl EffectDef {
    /// Declare an effect with default parameters and scope.
    #[must_use]
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            params: CalcParams::default(),
            scope: kind.default_scope(),
        }
    }

    /// Override the calculation parameters.
    #[must_use]
    pub fn with_params(mut self, params: CalcParams) -> Self {
        self.params = params;
        self
    }
}

fn one() -> Fixed {
    Fixed::ONE
}

/// Trait flags of a part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PartTraits {
    /// Overkill damage carries over to another part.
    pub penetrates: bool,
    /// Added to the critical chance.
    #[serde(with = "fixed_decimal")]
    pub critical_bonus: Fixed,
    /// Damage ignores the defender's defense stat.
    pub ignores_defense: bool,
    /// Scales the charge-phase speed multiplier (0 freezes the gauge).
    #[serde(with = "fixed_decimal", default = "one")]
    pub charge_speed_scale: Fixed,
    /// Scales the cooldown-phase speed multiplier.
    #[serde(with = "fixed_decimal", default = "one")]
    pub cooldown_speed_scale: Fixed,
    /// Additive stat modifiers applied while this part is used.
    pub modifiers: Vec<StatModifier>,
}

impl Default for PartTraits {
    fn default() -> Self {
        Self {
            penetrates: false,
            critical_bonus: Fixed::ZERO,
            ignores_defense: false,
            charge_speed_scale: Fixed::ONE,
            cooldown_speed_scale: Fixed::ONE,
            modifiers: Vec::new(),
        }
    }
}

impl PartTraits {
    /// Total trait modifier for a stat.
    #[must_use]
    pub fn modifier(&self, stat: StatKind) -> i32 {
        self.modifiers
            .iter()
            .filter(|m| m.stat == stat)
            .fold(0i32, |acc, m| acc.saturating_add(m.value))
    }
}

/// Outcome of applying damage to a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartDamage {
    /// HP before the hit.
    pub old_hp: u32,
    /// HP after the hit.
    pub new_hp: u32,
    /// Damage beyond what the part had left.
    pub overkill: u32,
    /// Whether this hit broke the part.
    pub broke: bool,
}

/// One body location with its own HP pool and stats.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Part {
    /// Location of the part.
    pub key: PartKey,
    /// Display name.
    pub name: String,
    /// What using the part does.
    pub action_type: ActionType,
    /// Base stats.
    pub stats: PartStats,
    hp: u32,
    max_hp: u32,
    /// Ordered effect declarations.
    pub effects: Vec<EffectDef>,
    /// Trait flags.
    pub traits: PartTraits,
}

impl Part {
    /// Create a part at full HP.
    #[must_use]
    pub fn new(key: PartKey, name: impl Into<String>, max_hp: u32) -> Self {
        Self {
            key,
            name: name.into(),
            action_type: ActionType::default(),
            stats: PartStats::default(),
            hp: max_hp,
            max_hp,
            effects: Vec::new(),
            traits: PartTraits::default(),
        }
    }

    /// Current HP.
    #[must_use]
    pub const fn hp(&self) -> u32 {
        self.hp
    }

    /// Maximum HP.
    #[must_use]
    pub const fn max_hp(&self) -> u32 {
        self.max_hp
    }

    /// A part is broken exactly when its HP is zero.
    #[must_use]
    pub const fn is_broken(&self) -> bool {
        self.hp == 0
    }

    /// HP missing from the maximum.
    #[must_use]
    pub const fn missing_hp(&self) -> u32 {
        self.max_hp.saturating_sub(self.hp)
    }

    /// Set HP directly, clamped to `[0, max_hp]`.
    pub fn set_hp(&mut self, hp: u32) {
        self.hp = hp.min(self.max_hp);
    }

    /// Apply damage. `new_hp = max(0, old_hp - amount)`.
    pub fn apply_damage(&mut self, amount: u32) -> PartDamage {
        let old_hp = self.hp;
        let new_hp = old_hp.saturating_sub(amount);
        self.hp = new_hp;
        PartDamage {
            old_hp,
            new_hp,
            overkill: amount.saturating_sub(old_hp),
            broke: old_hp > 0 && new_hp == 0,
        }
    }

    /// Heal the part, returning `(old_hp, new_hp)`.
    ///
    /// Broken parts never change HP.
    pub fn heal(&mut self, amount: u32) -> (u32, u32) {
        let old_hp = self.hp;
        if !self.is_broken() {
            self.hp = self.hp.saturating_add(amount).min(self.max_hp);
        }
        (old_hp, self.hp)
    }

    /// Whether the part declares at least one effect of this kind.
    #[must_use]
    pub fn has_effect(&self, kind: EffectKind) -> bool {
        self.effects.iter().any(|e| e.kind == kind)
    }

    /// Whether any declared effect needs a chosen target.
    #[must_use]
    pub fn needs_target(&self) -> bool {
        !self.action_type.resolves_target_on_execute()
            && self.effects.iter().any(|e| e.scope.needs_target())
    }
}

/// The four parts of a combatant, indexed by [`PartKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartSet {
    parts: [Part; 4],
}

impl PartSet {
    /// Assemble a part set. Each part's key is set from its slot.
    #[must_use]
    pub fn new(mut head: Part, mut right_arm: Part, mut left_arm: Part, mut legs: Part) -> Self {
        head.key = PartKey::Head;
        right_arm.key = PartKey::RightArm;
        left_arm.key = PartKey::LeftArm;
        legs.key = PartKey::Legs;
        Self {
            parts: [head, right_arm, left_arm, legs],
        }
    }

    /// Get a part.
    #[must_use]
    pub fn get(&self, key: PartKey) -> &Part {
        &self.parts[key.index()]
    }

    /// Get a part mutably.
    pub fn get_mut(&mut self, key: PartKey) -> &mut Part {
        &mut self.parts[key.index()]
    }

    /// Iterate parts in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter()
    }

    /// Keys of unbroken parts in declaration order.
    #[must_use]
    pub fn unbroken_keys(&self) -> Vec<PartKey> {
        self.parts
            .iter()
            .filter(|p| !p.is_broken())
            .map(|p| p.key)
            .collect()
    }

    /// Sum of current HP across all parts.
    #[must_use]
    pub fn total_hp(&self) -> u32 {
        self.parts.iter().map(Part::hp).sum()
    }
}

// ============================================================================
// Readiness
// ============================================================================

/// Discrete lifecycle state of a combatant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CombatantState {
    /// Gauge filling toward action selection (also the cooldown state).
    Charging,
    /// Gauge full; waiting for an action to be chosen.
    ReadySelect,
    /// Action chosen; gauge filling toward execution.
    SelectedCharging,
    /// Gauge full; waiting to execute.
    ReadyExecute,
    /// Action resolved; presentation may still be playing.
    AwaitingAnimation,
    /// Holding a guard across enemy turns.
    Guarding,
    /// Defeated. Terminal.
    Broken,
}

impl CombatantState {
    /// States in which the gauge accumulates.
    #[must_use]
    pub const fn is_accumulating(self) -> bool {
        matches!(
            self,
            CombatantState::Charging | CombatantState::SelectedCharging
        )
    }

    /// States that pause gauge progression for everyone.
    #[must_use]
    pub const fn pauses_battle(self) -> bool {
        matches!(
            self,
            CombatantState::ReadySelect | CombatantState::ReadyExecute
        )
    }
}

/// Which speed profile the gauge is filling under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GaugePhase {
    /// Start of battle; no part has been used yet.
    #[default]
    Idle,
    /// Charging a chosen action.
    Charge,
    /// Recovering after an action.
    Cooldown,
}

/// Continuous readiness accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gauge {
    /// Current value in `[0, gauge_max]`.
    #[serde(with = "fixed_serde")]
    pub value: Fixed,
    /// Current fill velocity per update interval.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Divisor applied to the fill rate.
    #[serde(with = "fixed_serde")]
    pub speed_multiplier: Fixed,
    /// Whether the gauge is accumulating.
    pub active: bool,
    /// Current speed profile.
    pub phase: GaugePhase,
}

impl Default for Gauge {
    fn default() -> Self {
        Self {
            value: Fixed::ZERO,
            speed: Fixed::ZERO,
            speed_multiplier: Fixed::ONE,
            active: true,
            phase: GaugePhase::Idle,
        }
    }
}

impl Gauge {
    /// Restart from zero under a new phase.
    pub fn restart(&mut self, phase: GaugePhase, speed_multiplier: Fixed) {
        self.value = Fixed::ZERO;
        self.speed = Fixed::ZERO;
        self.phase = phase;
        self.speed_multiplier = speed_multiplier;
    }

    /// Fraction of the way to `max`, in `[0, 1]`.
    #[must_use]
    pub fn fraction(&self, max: Fixed) -> Fixed {
        if max <= Fixed::ZERO {
            return Fixed::ZERO;
        }
        (self.value / max).clamp(Fixed::ZERO, Fixed::ONE)
    }
}

/// Per-turn intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Action {
    /// Chosen part.
    pub part_key: Option<PartKey>,
    /// Chosen target.
    pub target_id: Option<EntityId>,
    /// Chosen target part; `None` means resolve later.
    pub target_part_key: Option<PartKey>,
}

impl Action {
    /// Whether no part has been chosen.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.part_key.is_none()
    }

    /// Reset to empty.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// Active Effects
// ============================================================================

/// Kinds of standing effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatusKind {
    /// Success bonus.
    Scan,
    /// Intercepts attacks aimed at teammates.
    Guard,
}

impl StatusKind {
    /// The stat a status adds its value to, if any.
    #[must_use]
    pub const fn boosted_stat(self) -> Option<StatKind> {
        match self {
            StatusKind::Scan => Some(StatKind::Success),
            StatusKind::Guard => None,
        }
    }
}

/// How long a standing effect lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Remaining {
    /// Holder's completed actions left.
    Turns(u32),
    /// Uses left.
    Uses(u32),
}

impl Remaining {
    /// Whether nothing is left.
    #[must_use]
    pub const fn is_exhausted(self) -> bool {
        matches!(self, Remaining::Turns(0) | Remaining::Uses(0))
    }
}

/// Key of a standing effect: its kind and the part that granted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EffectKey {
    /// Status kind.
    pub kind: StatusKind,
    /// Combatant owning the granting part.
    pub source_id: EntityId,
    /// Granting part.
    pub source_part: PartKey,
}

/// A standing buff or debuff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActiveEffect {
    /// Status kind.
    pub kind: StatusKind,
    /// Magnitude.
    pub value: i32,
    /// Remaining duration or use-count.
    pub remaining: Remaining,
    /// Combatant owning the granting part.
    pub source_id: EntityId,
    /// Granting part.
    pub source_part: PartKey,
}

impl ActiveEffect {
    /// Key of this effect.
    #[must_use]
    pub const fn key(&self) -> EffectKey {
        EffectKey {
            kind: self.kind,
            source_id: self.source_id,
            source_part: self.source_part,
        }
    }
}

/// Standing effects of a combatant, keyed by kind and granting part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ActiveEffects {
    effects: BTreeMap<EffectKey, ActiveEffect>,
}

impl ActiveEffects {
    /// Add an effect, replacing one with the same key.
    pub fn insert(&mut self, effect: ActiveEffect) -> Option<ActiveEffect> {
        self.effects.insert(effect.key(), effect)
    }

    /// Get an effect by key.
    #[must_use]
    pub fn get(&self, key: &EffectKey) -> Option<&ActiveEffect> {
        self.effects.get(key)
    }

    /// Remove an effect by key.
    pub fn remove(&mut self, key: &EffectKey) -> Option<ActiveEffect> {
        self.effects.remove(key)
    }

    /// Remove every effect granted by one part.
    pub fn revoke_from_part(
        &mut self,
        source_id: EntityId,
        source_part: PartKey,
    ) -> Vec<ActiveEffect> {
        [StatusKind::Scan, StatusKind::Guard]
            .into_iter()
            .filter_map(|kind| {
                self.effects.remove(&EffectKey {
                    kind,
                    source_id,
                    source_part,
                })
            })
            .collect()
    }

    /// Remove every effect of a kind.
    pub fn remove_kind(&mut self, kind: StatusKind) -> Vec<ActiveEffect> {
        let keys: Vec<EffectKey> = self
            .effects
            .keys()
            .filter(|k| k.kind == kind)
            .copied()
            .collect();
        keys.iter().filter_map(|k| self.effects.remove(k)).collect()
    }

    /// Iterate effects in key order.
    pub fn iter(&self) -> impl Iterator<Item = &ActiveEffect> {
        self.effects.values()
    }

    /// Number of standing effects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Whether there are no standing effects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Total bonus standing effects add to a stat.
    #[must_use]
    pub fn stat_bonus(&self, stat: StatKind) -> i32 {
        self.effects
            .values()
            .filter(|e| e.kind.boosted_stat() == Some(stat))
            .fold(0i32, |acc, e| acc.saturating_add(e.value))
    }

    /// The first guard with uses left.
    #[must_use]
    pub fn active_guard(&self) -> Option<&ActiveEffect> {
        self.effects.values().find(|e| {
            e.kind == StatusKind::Guard && matches!(e.remaining, Remaining::Uses(n) if n > 0)
        })
    }

    /// Keys of turn-based effects.
    #[must_use]
    pub fn turn_keys(&self) -> Vec<EffectKey> {
        self.effects
            .values()
            .filter(|e| matches!(e.remaining, Remaining::Turns(_)))
            .map(ActiveEffect::key)
            .collect()
    }

    /// Count one completed action against the given effects, removing and
    /// returning the ones that ran out.
    pub fn tick_turns(&mut self, keys: &[EffectKey]) -> Vec<ActiveEffect> {
        let mut expired = Vec::new();
        for key in keys {
            let Some(effect) = self.effects.get_mut(key) else {
                continue;
            };
            if let Remaining::Turns(n) = effect.remaining {
                effect.remaining = Remaining::Turns(n.saturating_sub(1));
            }
            if effect.remaining.is_exhausted() {
                if let Some(done) = self.effects.remove(key) {
                    expired.push(done);
                }
            }
        }
        expired
    }

    /// Spend one use of an effect. Returns the uses left, or `None` if the
    /// effect does not exist. An exhausted effect is removed.
    pub fn consume_use(&mut self, key: &EffectKey) -> Option<u32> {
        let effect = self.effects.get_mut(key)?;
        let left = match effect.remaining {
            Remaining::Uses(n) => n.saturating_sub(1),
            Remaining::Turns(n) => n,
        };
        if let Remaining::Uses(_) = effect.remaining {
            effect.remaining = Remaining::Uses(left);
        }
        if effect.remaining.is_exhausted() {
            self.effects.remove(key);
        }
        Some(left)
    }
}

// ============================================================================
// Combatant
// ============================================================================

/// Short rolling history of a combatant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CombatantHistory {
    /// Who last attacked this combatant.
    pub last_attacked_by: Option<EntityId>,
    /// This combatant's last attack target.
    pub last_attack: Option<(EntityId, PartKey)>,
}

/// A battle participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Combatant {
    /// Unique id.
    pub id: EntityId,
    /// Display name.
    pub name: String,
    /// Team.
    pub team: TeamId,
    /// Whether this is the team leader.
    pub is_leader: bool,
    /// Body parts.
    pub parts: PartSet,
    /// Readiness gauge.
    pub gauge: Gauge,
    pub(crate) state: CombatantState,
    /// Current intent.
    pub action: Action,
    /// Standing effects.
    pub effects: ActiveEffects,
    /// AI personality key.
    pub personality: String,
    /// Whether the AI chooses actions for this combatant.
    pub ai_controlled: bool,
    /// Rolling history.
    pub history: CombatantHistory,
    /// Home position.
    pub home: Vec2Fixed,
    /// Current position.
    pub position: Vec2Fixed,
}

impl Combatant {
    /// Create a charging combatant.
    #[must_use]
    pub fn new(id: EntityId, name: impl Into<String>, team: TeamId, parts: PartSet) -> Self {
        Self {
            id,
            name: name.into(),
            team,
            is_leader: false,
            parts,
            gauge: Gauge::default(),
            state: CombatantState::Charging,
            action: Action::default(),
            effects: ActiveEffects::default(),
            personality: String::new(),
            ai_controlled: true,
            history: CombatantHistory::default(),
            home: Vec2Fixed::ZERO,
            position: Vec2Fixed::ZERO,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> CombatantState {
        self.state
    }

    /// Alive means the head is unbroken.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.parts.get(PartKey::Head).is_broken()
    }

    /// Leg propulsion, used for turn order.
    #[must_use]
    pub fn propulsion(&self) -> i32 {
        self.parts.get(PartKey::Legs).stats.propulsion
    }

    /// Unbroken action parts that declare at least one effect.
    #[must_use]
    pub fn usable_parts(&self) -> Vec<PartKey> {
        self.parts
            .iter()
            .filter(|p| p.key.is_action_part() && !p.is_broken() && !p.effects.is_empty())
            .map(|p| p.key)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_part(max_hp: u32) -> Part {
        Part::new(PartKey::RightArm, "arm", max_hp)
    }

    #[test]
    fn test_part_damage_clamps_and_breaks() {
        let mut part = test_part(30);
        let hit = part.apply_damage(12);
        assert_eq!((hit.old_hp, hit.new_hp, hit.overkill, hit.broke), (30, 18, 0, false));

        let hit = part.apply_damage(25);
        assert_eq!((hit.old_hp, hit.new_hp, hit.overkill, hit.broke), (18, 0, 7, true));
        assert!(part.is_broken());

        // Already broken: no second break
        let hit = part.apply_damage(5);
        assert!(!hit.broke);
        assert_eq!(hit.overkill, 5);
    }

    #[test]
    fn test_heal_is_noop_on_broken_part() {
        let mut part = test_part(30);
        part.apply_damage(30);
        assert_eq!(part.heal(10), (0, 0));

        let mut part = test_part(30);
        part.apply_damage(20);
        assert_eq!(part.heal(50), (10, 30));
    }

    #[test]
    fn test_partset_keys_follow_slots() {
        let set = PartSet::new(test_part(1), test_part(2), test_part(3), test_part(4));
        for key in PartKey::ALL {
            assert_eq!(set.get(key).key, key);
        }
        assert_eq!(set.get(PartKey::Legs).max_hp(), 4);
    }

    #[test]
    fn test_active_effects_revoke_by_part() {
        let mut effects = ActiveEffects::default();
        effects.insert(ActiveEffect {
            kind: StatusKind::Guard,
            value: 0,
            remaining: Remaining::Uses(2),
            source_id: 1,
            source_part: PartKey::LeftArm,
        });
        effects.insert(ActiveEffect {
            kind: StatusKind::Scan,
            value: 10,
            remaining: Remaining::Turns(2),
            source_id: 2,
            source_part: PartKey::LeftArm,
        });

        let revoked = effects.revoke_from_part(1, PartKey::LeftArm);
        assert_eq!(revoked.len(), 1);
        assert_eq!(effects.len(), 1);
        assert_eq!(effects.stat_bonus(StatKind::Success), 10);
    }

    #[test]
    fn test_tick_turns_expires() {
        let mut effects = ActiveEffects::default();
        effects.insert(ActiveEffect {
            kind: StatusKind::Scan,
            value: 5,
            remaining: Remaining::Turns(1),
            source_id: 3,
            source_part: PartKey::Head,
        });
        let keys = effects.turn_keys();
        let expired = effects.tick_turns(&keys);
        assert_eq!(expired.len(), 1);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_consume_use_removes_at_zero() {
        let mut effects = ActiveEffects::default();
        let guard = ActiveEffect {
            kind: StatusKind::Guard,
            value: 0,
            remaining: Remaining::Uses(2),
            source_id: 1,
            source_part: PartKey::RightArm,
        };
        effects.insert(guard);
        assert_eq!(effects.consume_use(&guard.key()), Some(1));
        assert!(effects.active_guard().is_some());
        assert_eq!(effects.consume_use(&guard.key()), Some(0));
        assert!(effects.active_guard().is_none());
        assert_eq!(effects.consume_use(&guard.key()), None);
    }

    #[test]
    fn test_support_action_types() {
        assert!(ActionType::Heal.is_support());
        assert!(ActionType::Defend.is_support());
        assert!(!ActionType::Interrupt.is_support());
        assert!(ActionType::Melee.resolves_target_on_execute());
    }

    #[test]
    fn test_effect_kind_keys_roundtrip() {
        for kind in EffectKind::ALL {
            assert_eq!(EffectKind::from_key(kind.key()), Some(kind));
        }
        assert_eq!(EffectKind::from_key("teleport"), None);
    }
}
