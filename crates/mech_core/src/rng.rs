//! The single source of randomness for a battle.
//!
//! Every probability roll and random pick in the core goes through
//! [`RandomSource`]. Production battles use [`SeededRandom`], a ChaCha8
//! stream keyed by the battle seed; tests inject [`ScriptedRandom`] to
//! force specific outcomes.

use std::collections::VecDeque;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::math::Fixed;

/// Uniform random draws used by the battle core.
pub trait RandomSource {
    /// Draw a value uniformly from `[0, 1)`.
    fn next_unit(&mut self) -> Fixed;

    /// Draw an index uniformly from `0..len`.
    ///
    /// Callers never pass `len == 0`.
    fn next_index(&mut self, len: usize) -> usize;

    /// Roll against a probability: succeeds when the draw falls below `chance`.
    fn roll(&mut self, chance: Fixed) -> bool {
        self.next_unit() < chance
    }
}

/// Pick one element uniformly, or `None` for an empty slice.
pub fn pick<'a, T>(rng: &mut dyn RandomSource, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    items.get(rng.next_index(items.len()))
}

/// Seeded ChaCha8 random source.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: ChaCha8Rng,
}

impl SeededRandom {
    /// Create a source from a battle seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_unit(&mut self) -> Fixed {
        // 32 random bits are exactly the fractional part of an I32F32.
        Fixed::from_bits(i64::from(self.rng.next_u32()))
    }

    fn next_index(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.rng.gen_range(0..len)
    }
}

/// Scripted random source for forcing outcomes.
///
/// Queued values are consumed in order; once a queue is empty the
/// default is returned for every further draw.
#[derive(Debug, Clone)]
pub struct ScriptedRandom {
    units: VecDeque<Fixed>,
    indices: VecDeque<usize>,
    default_unit: Fixed,
}

impl ScriptedRandom {
    /// Create a source that returns `default_unit` for every unit draw and
    /// index `0` for every pick.
    #[must_use]
    pub fn new(default_unit: Fixed) -> Self {
        Self {
            units: VecDeque::new(),
            indices: VecDeque::new(),
            default_unit,
        }
    }

    /// Every roll with a non-zero chance succeeds.
    #[must_use]
    pub fn always() -> Self {
        Self::new(Fixed::ZERO)
    }

    /// Every roll with a chance below 1 fails.
    #[must_use]
    pub fn never() -> Self {
        Self::new(Fixed::from_bits(i64::from(u32::MAX)))
    }

    /// Queue unit draws, consumed before the default.
    #[must_use]
    pub fn with_units(mut self, units: impl IntoIterator<Item = Fixed>) -> Self {
        self.units.extend(units);
        self
    }

    /// Queue index draws, consumed before falling back to `0`.
    #[must_use]
    pub fn with_indices(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.indices.extend(indices);
        self
    }
}

impl RandomSource for ScriptedRandom {
    fn next_unit(&mut self) -> Fixed {
        self.units.pop_front().unwrap_or(self.default_unit)
    }

    fn next_index(&mut self, len: usize) -> usize {
        let index = self.indices.pop_front().unwrap_or(0);
        index.min(len.saturating_sub(1))
    }
}
