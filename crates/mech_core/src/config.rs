//! Battle configuration.
//!
//! Tunable constants of the formula library and the readiness scheduler.
//! Loaded from RON; every field has a default so partial files work.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::components::{ActionType, StatKind, StatModifier, TeamId};
use crate::error::{BattleError, Result};
use crate::math::{fixed_decimal, Fixed, Vec2Fixed};

/// Additive stat modifier applied to every part of an action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTypeModifier {
    /// Action type the modifier applies to.
    pub action_type: ActionType,
    /// The modifier.
    pub modifier: StatModifier,
}

/// Battle-wide tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    /// Gauge value that triggers selection or execution.
    #[serde(with = "fixed_decimal")]
    pub gauge_max: Fixed,
    /// Reference interval for gauge speed, in milliseconds.
    pub update_interval_ms: u32,
    /// Weight of part stats on the charge-phase speed multiplier.
    #[serde(with = "fixed_decimal")]
    pub charge_impact_factor: Fixed,
    /// Weight of part stats on the cooldown-phase speed multiplier.
    #[serde(with = "fixed_decimal")]
    pub cooldown_impact_factor: Fixed,
    /// Might normalisation constant.
    pub max_might: i32,
    /// Success normalisation constant.
    pub max_success: i32,
    /// Seed for the battle's random source.
    pub seed: u64,
    /// Distance of the action line from the center.
    #[serde(with = "fixed_decimal")]
    pub action_line_offset: Fixed,
    /// Distance of home positions from the center.
    #[serde(with = "fixed_decimal")]
    pub home_offset: Fixed,
    /// Vertical spacing between team members.
    #[serde(with = "fixed_decimal")]
    pub row_spacing: Fixed,
    /// Personality used when a combatant names an unknown one.
    pub fallback_personality: String,
    /// Extra stat modifiers per action type.
    pub action_type_modifiers: Vec<ActionTypeModifier>,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            gauge_max: Fixed::from_num(100),
            update_interval_ms: 20,
            charge_impact_factor: Fixed::from_num(1) / Fixed::from_num(2),
            cooldown_impact_factor: Fixed::from_num(1) / Fixed::from_num(4),
            max_might: 100,
            max_success: 100,
            seed: 0,
            action_line_offset: Fixed::from_num(100),
            home_offset: Fixed::from_num(400),
            row_spacing: Fixed::from_num(80),
            fallback_personality: "random".to_string(),
            action_type_modifiers: Vec::new(),
        }
    }
}

impl BattleConfig {
    /// Parse a config from RON.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| BattleError::DataParseError {
            path: "<battle config>".to_string(),
            message: e.to_string(),
        })
    }

    /// Replace unusable values with defaults, warning about each one.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.gauge_max <= Fixed::ZERO {
            warn!(gauge_max = %self.gauge_max, "gauge_max must be positive, using default");
            self.gauge_max = defaults.gauge_max;
        }
        if self.update_interval_ms == 0 {
            warn!("update_interval_ms must be positive, using default");
            self.update_interval_ms = defaults.update_interval_ms;
        }
        if self.max_might <= 0 {
            warn!(max_might = self.max_might, "max_might must be positive, using default");
            self.max_might = defaults.max_might;
        }
        if self.max_success <= 0 {
            warn!(max_success = self.max_success, "max_success must be positive, using default");
            self.max_success = defaults.max_success;
        }
        if self.charge_impact_factor < Fixed::ZERO || self.cooldown_impact_factor < Fixed::ZERO {
            warn!("impact factors must not be negative, using defaults");
            self.charge_impact_factor = defaults.charge_impact_factor;
            self.cooldown_impact_factor = defaults.cooldown_impact_factor;
        }
        self
    }

    /// Total config modifier for an action type and stat.
    #[must_use]
    pub fn action_type_modifier(&self, action_type: ActionType, stat: StatKind) -> i32 {
        self.action_type_modifiers
            .iter()
            .filter(|m| m.action_type == action_type && m.modifier.stat == stat)
            .fold(0i32, |acc, m| acc.saturating_add(m.modifier.value))
    }

    /// Horizontal side of a team: even teams on the left, odd on the right.
    #[must_use]
    pub fn team_side(team: TeamId) -> Fixed {
        if team % 2 == 0 {
            -Fixed::ONE
        } else {
            Fixed::ONE
        }
    }

    /// Home position of a team member.
    #[must_use]
    pub fn home_position(&self, team: TeamId, slot: usize) -> Vec2Fixed {
        let row = Fixed::saturating_from_num(slot);
        Vec2Fixed::new(
            Self::team_side(team) * self.home_offset,
            row.saturating_mul(self.row_spacing),
        )
    }

    /// Action line position for a combatant with the given home.
    #[must_use]
    pub fn action_line_position(&self, team: TeamId, home: Vec2Fixed) -> Vec2Fixed {
        Vec2Fixed::new(Self::team_side(team) * self.action_line_offset, home.y)
    }
}
