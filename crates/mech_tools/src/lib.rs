//! # Mech Development Tools
//!
//! Command-line tools for development:
//! - Master data validation (rosters, personalities, battle config)

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod validate;
