//! Combat formula library.
//!
//! Pure numeric functions: hit probabilities, damage and heal values,
//! gauge speed. Nothing here touches combatants; callers pass in the
//! effective stats they have already resolved.
//!
//! Probability rolls draw from the injected [`RandomSource`], which is the
//! only source of nondeterminism in a battle.

use serde::{Deserialize, Serialize};

use crate::components::{GaugePhase, PartKey};
use crate::config::BattleConfig;
use crate::math::{floor_i64, ratio, Fixed};
use crate::rng::RandomSource;

/// Upper bound of evasion and defense chances.
pub fn chance_cap() -> Fixed {
    ratio(95, 100)
}

fn base_chance() -> Fixed {
    ratio(5, 100)
}

/// Chance the defender evades.
///
/// `clamp((mobility - success) / 200 + 0.05, 0, 0.95)`
#[must_use]
pub fn evasion_chance(defender_mobility: i32, attacker_success: i32) -> Fixed {
    let diff = i64::from(defender_mobility) - i64::from(attacker_success);
    (ratio(diff, 200) + base_chance()).clamp(Fixed::ZERO, chance_cap())
}

/// Chance the defender deflects the hit onto its best-defense part.
///
/// `clamp(armor / 4 + 0.05, 0, 0.95)`
#[must_use]
pub fn defense_chance(defender_armor: i32) -> Fixed {
    (ratio(i64::from(defender_armor), 4) + base_chance()).clamp(Fixed::ZERO, chance_cap())
}

/// Chance of a critical hit.
///
/// `clamp(max(0, success - mobility) / 200 + bonus, 0, 1)`
#[must_use]
pub fn critical_chance(attacker_success: i32, defender_mobility: i32, bonus: Fixed) -> Fixed {
    let diff = (i64::from(attacker_success) - i64::from(defender_mobility)).max(0);
    ratio(diff, 200)
        .saturating_add(bonus)
        .clamp(Fixed::ZERO, Fixed::ONE)
}

/// Inputs to [`calculate_damage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageInput {
    /// Attacker's effective base stat.
    pub base: i32,
    /// Attacker's effective power stat.
    pub power: i32,
    /// Defender's effective mobility.
    pub defender_mobility: i32,
    /// Defender's total defense.
    pub total_defense: i32,
    /// Whether the hit is critical.
    pub is_critical: bool,
    /// Whether the attacker ignores the defense stat.
    pub defense_bypassed: bool,
}

/// Damage dealt by a hit.
///
/// A critical hit takes the base value untouched by mobility or defense and
/// multiplies the result by 1.5. Otherwise the base is reduced by mobility
/// and (unless bypassed) total defense, never below zero.
#[must_use]
pub fn calculate_damage(input: DamageInput) -> u32 {
    let base = i64::from(input.base);
    let reduced = if input.is_critical {
        base
    } else {
        let defense = if input.defense_bypassed {
            0
        } else {
            i64::from(input.total_defense)
        };
        (base - i64::from(input.defender_mobility) - defense).max(0)
    };

    let mut damage = reduced.div_euclid(4) + i64::from(input.power);
    if input.is_critical {
        damage = floor_i64(Fixed::saturating_from_num(damage) * ratio(3, 2));
    }
    u32::try_from(damage.max(0)).unwrap_or(u32::MAX)
}

/// HP restored by a heal: `floor(base / 2) + power`, never negative.
#[must_use]
pub fn heal_value(base: i32, power: i32) -> u32 {
    let value = i64::from(base).div_euclid(2) + i64::from(power);
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// Scan bonus derived from power when the data names no amount.
#[must_use]
pub fn scan_value(power: i32) -> i32 {
    (power / 10).max(1)
}

/// Gauge speed multiplier for a phase.
///
/// `(1 + (might / max_might + success / max_success) * impact) * external`.
/// The result divides the fill rate, so stronger parts charge slower. An
/// external factor of 0 freezes the gauge.
#[must_use]
pub fn speed_multiplier(
    might: i32,
    success: i32,
    phase: GaugePhase,
    external: Fixed,
    config: &BattleConfig,
) -> Fixed {
    let impact = match phase {
        GaugePhase::Idle => return external.max(Fixed::ZERO),
        GaugePhase::Charge => config.charge_impact_factor,
        GaugePhase::Cooldown => config.cooldown_impact_factor,
    };
    let load = ratio(i64::from(might), i64::from(config.max_might))
        + ratio(i64::from(success), i64::from(config.max_success));
    let multiplier = Fixed::ONE.saturating_add(load.saturating_mul(impact));
    multiplier.saturating_mul(external).max(Fixed::ZERO)
}

/// Result of one gauge integration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaugeStep {
    /// Velocity after acceleration.
    pub next_speed: Fixed,
    /// Amount to add to the gauge.
    pub increment: Fixed,
}

/// Acceleration/top-speed gauge model.
///
/// `next = min(speed + 0.1 + mobility * 1e-6, 0.5 + propulsion * 0.1)`,
/// `increment = next / multiplier * delta / interval`. A zero multiplier
/// yields no increment.
#[must_use]
pub fn gauge_increment(
    current_speed: Fixed,
    mobility: i32,
    propulsion: i32,
    speed_multiplier: Fixed,
    delta_ms: u64,
    update_interval_ms: u32,
) -> GaugeStep {
    let acceleration = ratio(1, 10) + ratio(i64::from(mobility), 1_000_000);
    let top_speed = (ratio(1, 2) + ratio(i64::from(propulsion), 10)).max(Fixed::ZERO);
    let next_speed = current_speed.saturating_add(acceleration).min(top_speed);

    if speed_multiplier <= Fixed::ZERO || update_interval_ms == 0 {
        return GaugeStep {
            next_speed,
            increment: Fixed::ZERO,
        };
    }

    let time_scale = ratio(
        i64::try_from(delta_ms).unwrap_or(i64::MAX),
        i64::from(update_interval_ms),
    );
    let increment = (next_speed / speed_multiplier)
        .saturating_mul(time_scale)
        .max(Fixed::ZERO);
    GaugeStep {
        next_speed,
        increment,
    }
}

// ============================================================================
// Hit Resolution
// ============================================================================

/// Everything the hit roll needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitRoll {
    /// Support actions always hit.
    pub is_support: bool,
    /// Attacker's effective success.
    pub attacker_success: i32,
    /// Defender's effective mobility.
    pub defender_mobility: i32,
    /// Defender's effective armor.
    pub defender_armor: i32,
    /// Critical bonus from the attacking part.
    pub critical_bonus: Fixed,
    /// Part the attack is aimed at.
    pub target_part: Option<PartKey>,
    /// Part a successful defense roll deflects onto.
    pub best_defense_part: Option<PartKey>,
}

/// Result of the hit roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HitOutcome {
    /// Whether the attack connects.
    pub is_hit: bool,
    /// Whether it is a critical hit.
    pub is_critical: bool,
    /// Whether the defender deflected it.
    pub is_defended: bool,
    /// Part that is actually hit.
    pub final_target_part_key: Option<PartKey>,
}

impl HitOutcome {
    /// Outcome of an action that cannot miss.
    #[must_use]
    pub const fn certain(target_part: Option<PartKey>) -> Self {
        Self {
            is_hit: true,
            is_critical: false,
            is_defended: false,
            final_target_part_key: target_part,
        }
    }
}

/// Roll evasion, then critical, then defense.
///
/// A critical hit skips the defense roll. A successful defense roll moves
/// the hit to the best-defense part when there is one, otherwise it lands
/// as a plain hit.
pub fn resolve_hit_outcome(roll: &HitRoll, rng: &mut dyn RandomSource) -> HitOutcome {
    if roll.is_support {
        return HitOutcome::certain(roll.target_part);
    }

    if rng.roll(evasion_chance(roll.defender_mobility, roll.attacker_success)) {
        return HitOutcome {
            is_hit: false,
            is_critical: false,
            is_defended: false,
            final_target_part_key: roll.target_part,
        };
    }

    let crit = critical_chance(roll.attacker_success, roll.defender_mobility, roll.critical_bonus);
    if rng.roll(crit) {
        return HitOutcome {
            is_hit: true,
            is_critical: true,
            is_defended: false,
            final_target_part_key: roll.target_part,
        };
    }

    if rng.roll(defense_chance(roll.defender_armor)) {
        if let Some(part) = roll.best_defense_part {
            return HitOutcome {
                is_hit: true,
                is_critical: false,
                is_defended: true,
                final_target_part_key: Some(part),
            };
        }
    }

    HitOutcome::certain(roll.target_part)
}
