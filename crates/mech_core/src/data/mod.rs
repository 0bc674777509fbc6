//! Master data for battles.
//!
//! Pure data structures deserialized from RON. Master data is immutable: a
//! battle deep-copies it into runtime [`Combatant`](crate::components::Combatant)s
//! through [`RosterData::build`].
//!
//! **Note:** This module contains no IO. File loading is handled by the
//! binaries.

mod part_data;
mod roster_data;

pub use part_data::{EffectData, PartData};
pub use roster_data::{CombatantData, RosterData, TeamData};
