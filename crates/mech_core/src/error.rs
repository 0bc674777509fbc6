//! Error types for the battle core.
//!
//! Only the inbound API (action submission, master-data loading) returns
//! errors. Cancellations inside the combat pipeline are ordinary values
//! ([`crate::events::CancelReason`]), never errors.

use thiserror::Error;

use crate::components::{EntityId, PartKey};

/// Result type alias using [`BattleError`].
pub type Result<T> = std::result::Result<T, BattleError>;

/// Top-level error type for the battle core.
#[derive(Debug, Error)]
pub enum BattleError {
    /// Invalid combatant reference.
    #[error("Combatant not found: {0}")]
    EntityNotFound(EntityId),

    /// A combatant has no usable part under the given key.
    #[error("Combatant {entity} has no usable part {part:?}")]
    MissingPart {
        /// Combatant that was queried.
        entity: EntityId,
        /// Part that was requested.
        part: PartKey,
    },

    /// The combatant is not in a state that accepts the request.
    #[error("Invalid battle state: {0}")]
    InvalidState(String),

    /// Master data names an effect kind no handler is registered for.
    #[error("Unknown effect kind: {0}")]
    UnknownEffectKind(String),

    /// Master data names a personality that is not registered.
    #[error("Unknown personality: {0}")]
    UnknownPersonality(String),

    /// Data file parsing error.
    #[error("Failed to parse data '{path}': {message}")]
    DataParseError {
        /// Path (or label) of the data that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Master data parsed but violates a structural rule.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}
