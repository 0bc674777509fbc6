//! # Mech Core
//!
//! Deterministic combat core for a team battle between four-part mechs.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness (one injected, seeded source)
//! - No floating-point math (uses fixed-point)
//!
//! This separation enables:
//! - Headless batch simulation
//! - Replays from a seed and master data
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`components`] - Parts, combatants, gauges and standing effects
//! - [`combat`] - Pure combat formulas
//! - [`targeting`] - Target validation and guard redirection
//! - [`effects`] - Effect handlers and the resolution pipeline
//! - [`readiness`] - Gauges, ready queues and the state machine
//! - [`ai`] - Personalities and strategies
//! - [`data`] - RON master data
//! - [`simulation`] - The battle loop
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ai;
pub mod combat;
pub mod components;
pub mod config;
pub mod data;
pub mod effects;
pub mod error;
pub mod events;
pub mod history;
pub mod math;
pub mod readiness;
pub mod rng;
pub mod roster;
pub mod simulation;
pub mod stats;
pub mod targeting;

#[cfg(test)]
mod test_support;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ai::{Personality, PersonalityRegistry};
    pub use crate::components::*;
    pub use crate::config::BattleConfig;
    pub use crate::data::{CombatantData, EffectData, PartData, RosterData, TeamData};
    pub use crate::effects::EffectRegistry;
    pub use crate::error::{BattleError, Result};
    pub use crate::events::{
        ActionChosen, ActionResult, BattleEvent, CancelReason, TickReport, VisualIntent,
    };
    pub use crate::math::Fixed;
    pub use crate::rng::{RandomSource, ScriptedRandom, SeededRandom};
    pub use crate::roster::Roster;
    pub use crate::simulation::{Battle, BattleOutcome};
}
