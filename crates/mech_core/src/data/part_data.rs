//! Part data structures for data-driven loadouts.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::components::{
    ActionType, CalcParams, EffectDef, EffectKind, Part, PartKey, PartStats, PartTraits,
    TargetScope,
};
use crate::error::{BattleError, Result};
use crate::math::Fixed;

/// One declared effect as written in data.
///
/// The kind is a string key so that data naming an unknown kind still
/// loads; such effects are dropped with a warning when the part is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectData {
    /// Effect kind key, e.g. `"damage"` or `"apply_guard"`.
    pub kind: String,

    /// Calculation parameter overrides.
    #[serde(default)]
    pub params: CalcParams,

    /// Target scope. Defaults per kind.
    #[serde(default)]
    pub scope: Option<TargetScope>,
}

impl EffectData {
    /// The parsed effect kind.
    pub fn kind(&self) -> Result<EffectKind> {
        EffectKind::from_key(&self.kind)
            .ok_or_else(|| BattleError::UnknownEffectKind(self.kind.clone()))
    }

    /// Resolve to a runtime definition, or `None` for an unknown kind.
    #[must_use]
    pub fn resolve(&self) -> Option<EffectDef> {
        let kind = self.kind().ok()?;
        let mut def = EffectDef::new(kind).with_params(self.params);
        if let Some(scope) = self.scope {
            def.scope = scope;
        }
        Some(def)
    }
}

/// Data-driven part definition.
///
/// # Example RON
///
/// ```ron
/// PartData(
///     name: "Rifle",
///     action_type: Shoot,
///     stats: (might: 20, success: 40),
///     max_hp: 40,
///     effects: [(kind: "damage")],
///     traits: (penetrates: true),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartData {
    /// Display name.
    pub name: String,

    /// What using the part does.
    #[serde(default)]
    pub action_type: ActionType,

    /// Base stats.
    #[serde(default)]
    pub stats: PartStats,

    /// Maximum (and starting) HP.
    pub max_hp: u32,

    /// Ordered effect declarations.
    #[serde(default)]
    pub effects: Vec<EffectData>,

    /// Trait flags.
    #[serde(default)]
    pub traits: PartTraits,
}

impl PartData {
    /// Deep-copy into a runtime part at full HP.
    #[must_use]
    pub fn build(&self, key: PartKey) -> Part {
        let mut part = Part::new(key, self.name.clone(), self.max_hp);
        part.action_type = self.action_type;
        part.stats = self.stats;
        part.traits = self.traits.clone();
        part.effects = self
            .effects
            .iter()
            .filter_map(|data| {
                let def = data.resolve();
                if def.is_none() {
                    warn!(part = %self.name, kind = %data.kind, "unknown effect kind, skipped");
                }
                def
            })
            .collect();
        part
    }

    /// Problems with this part when mounted at `key`. Empty when valid.
    #[must_use]
    pub fn validate(&self, key: PartKey) -> Vec<String> {
        let mut errors = Vec::new();
        let label = format!("{key:?} '{}'", self.name);

        if self.name.trim().is_empty() {
            errors.push(format!("{key:?}: name is empty"));
        }
        if self.max_hp == 0 {
            errors.push(format!("{label}: max_hp must be positive"));
        }
        let stats = [
            ("might", self.stats.might),
            ("success", self.stats.success),
            ("armor", self.stats.armor),
            ("mobility", self.stats.mobility),
            ("propulsion", self.stats.propulsion),
            ("stability", self.stats.stability),
            ("defense", self.stats.defense),
        ];
        for (stat, value) in stats {
            if value < 0 {
                errors.push(format!("{label}: {stat} is negative ({value})"));
            }
        }
        for effect in &self.effects {
            if let Err(e) = effect.kind() {
                errors.push(format!("{label}: {e}"));
            }
        }
        if !key.is_action_part() && !self.effects.is_empty() {
            errors.push(format!("{label}: legs cannot declare effects"));
        }
        if self.traits.critical_bonus < Fixed::ZERO {
            errors.push(format!("{label}: critical_bonus is negative"));
        }
        if self.traits.charge_speed_scale < Fixed::ZERO
            || self.traits.cooldown_speed_scale < Fixed::ZERO
        {
            errors.push(format!("{label}: speed scales cannot be negative"));
        }
        errors
    }
}
