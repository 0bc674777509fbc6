//! Determinism testing utilities.
//!
//! Provides a harness for verifying that a battle produces identical
//! results given identical master data and seed.
//!
//! # Testing Strategy
//!
//! Replays and balance runs depend on battles being 100% deterministic.
//! Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`mech_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   We always iterate in sorted entity ID order.
//!
//! - **System randomness**: Every roll goes through the battle's injected
//!   [`mech_core::rng::RandomSource`], seeded from the config.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual formulas and handlers
//! 2. **Property tests**: Random inputs must still produce deterministic outputs
//! 3. **Integration tests**: Full battles are reproducible
//! 4. **Parallel tests**: Running N battles in parallel all match

use std::thread;

use mech_core::simulation::Battle;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic battle).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the battle was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the battle produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Battle is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel battle runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each battle.
    pub hashes: Vec<u64>,
    /// Number of ticks each battle ran.
    pub ticks: u64,
    /// Number of battles run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all battles produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all battles matched.
    ///
    /// # Panics
    ///
    /// Panics if battles produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel battles diverged!\n\
                 Battles: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a battle multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the battle
/// * `ticks` - Number of ticks to run per battle
/// * `setup` - Function to create the initial battle
/// * `step` - Function to advance the battle by one tick
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```ignore
/// use mech_test_utils::determinism::verify_determinism;
/// use mech_test_utils::fixtures::duel_roster;
/// use mech_core::prelude::*;
///
/// let result = verify_determinism(
///     5,  // Run 5 times
///     100, // 100 ticks each
///     || Battle::new(BattleConfig::default(), &duel_roster()).unwrap(),
///     |battle| { battle.tick(20); },
///     |battle| battle.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Verify that two battles from the same setup end in the same state.
///
/// Ticks at the configured update interval.
pub fn verify_battle_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Battle,
{
    let result = verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |battle| {
            let step = u64::from(battle.config().update_interval_ms);
            battle.tick(step);
        },
        |battle| battle.state_hash(),
    );
    result.is_deterministic
}

/// Run N battles on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows up under thread scheduling
/// or memory layout differences.
///
/// # Example
///
/// ```ignore
/// use mech_test_utils::determinism::run_parallel_battles;
///
/// let result = run_parallel_battles(|| setup_battle(), 8, 500);
/// result.assert_deterministic();
/// ```
pub fn run_parallel_battles<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> ParallelSimResult
where
    F: Fn() -> Battle + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut battle = setup_fn();
                    let step = u64::from(battle.config().update_interval_ms);
                    for _ in 0..num_ticks {
                        battle.tick(step);
                    }
                    battle.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("battle thread panicked"))
            .collect()
    });

    ParallelSimResult {
        hashes,
        ticks: num_ticks,
        num_sims,
    }
}

/// Compare two battle runs tick-by-tick, finding first divergence.
///
/// # Returns
///
/// `None` if the battles are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Battle,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    // Check initial state
    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    let step = u64::from(first.config().update_interval_ms);
    for tick in 1..=num_ticks {
        first.tick(step);
        second.tick(step);

        if first.state_hash() != second.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Verify that the event log of a battle serializes to identical JSON
/// across two runs.
pub fn verify_event_log_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Battle,
{
    let log = |mut battle: Battle| -> Option<String> {
        let step = u64::from(battle.config().update_interval_ms);
        let mut reports = Vec::new();
        for _ in 0..num_ticks {
            reports.push(battle.tick(step));
        }
        serde_json::to_string(&reports).ok()
    };
    match (log(setup_fn()), log(setup_fn())) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Proptest strategies for battle inputs.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing.
pub mod strategies {
    use mech_core::components::{ActionType, PartKey, PartStats, PartTraits};
    use mech_core::data::{CombatantData, PartData, RosterData, TeamData};
    use mech_core::math::Fixed;
    use proptest::prelude::*;

    use crate::fixtures::effect;

    /// Any part key.
    pub fn arb_part_key() -> impl Strategy<Value = PartKey> {
        prop::sample::select(PartKey::ALL.to_vec())
    }

    /// A stat value in the range real data uses.
    pub fn arb_stat() -> impl Strategy<Value = i32> {
        0i32..120i32
    }

    /// Any stat value, including out-of-range ones.
    pub fn arb_wild_stat() -> impl Strategy<Value = i32> {
        -1000i32..1000i32
    }

    /// Part HP values (1-200).
    pub fn arb_max_hp() -> impl Strategy<Value = u32> {
        1u32..200u32
    }

    /// Damage or heal amounts (0-500).
    pub fn arb_amount() -> impl Strategy<Value = u32> {
        0u32..500u32
    }

    /// A fixed-point probability bonus in `[0, 0.5]`.
    pub fn arb_bonus() -> impl Strategy<Value = Fixed> {
        (0i32..=50i32).prop_map(|n| Fixed::from_num(n) / Fixed::from_num(100))
    }

    /// Battle seeds.
    pub fn arb_seed() -> impl Strategy<Value = u64> {
        any::<u64>()
    }

    /// Part stats with every field in range.
    pub fn arb_part_stats() -> impl Strategy<Value = PartStats> {
        (
            arb_stat(),
            arb_stat(),
            arb_stat(),
            arb_stat(),
            arb_stat(),
            arb_stat(),
            arb_stat(),
        )
            .prop_map(
                |(might, success, armor, mobility, propulsion, stability, defense)| PartStats {
                    might,
                    success,
                    armor,
                    mobility,
                    propulsion,
                    stability,
                    defense,
                },
            )
    }

    /// An action part declaring one damage or heal effect.
    pub fn arb_action_part() -> impl Strategy<Value = PartData> {
        (
            arb_part_stats(),
            arb_max_hp(),
            prop::bool::ANY,
            prop::sample::select(vec![
                (ActionType::Shoot, "damage"),
                (ActionType::Melee, "damage"),
                (ActionType::Heal, "heal"),
            ]),
        )
            .prop_map(|(stats, max_hp, penetrates, (action_type, kind))| PartData {
                name: format!("{action_type:?}"),
                action_type,
                stats,
                max_hp,
                effects: vec![effect(kind)],
                traits: PartTraits {
                    penetrates,
                    ..PartTraits::default()
                },
            })
    }

    /// A part with no effects.
    pub fn arb_passive_part() -> impl Strategy<Value = PartData> {
        (arb_part_stats(), arb_max_hp()).prop_map(|(stats, max_hp)| PartData {
            name: "Frame".to_string(),
            action_type: ActionType::Shoot,
            stats,
            max_hp,
            effects: Vec::new(),
            traits: PartTraits::default(),
        })
    }

    /// A combatant with random parts and personality.
    pub fn arb_combatant(is_leader: bool) -> impl Strategy<Value = CombatantData> {
        (
            arb_passive_part(),
            arb_action_part(),
            arb_action_part(),
            arb_passive_part(),
            prop::sample::select(vec!["hunter", "crusher", "joker", "healer", "brawler"]),
        )
            .prop_map(move |(head, right_arm, left_arm, legs, personality)| {
                CombatantData {
                    name: "Mech".to_string(),
                    head,
                    right_arm,
                    left_arm,
                    legs,
                    personality: Some(personality.to_string()),
                    ai_controlled: true,
                    is_leader,
                }
            })
    }

    /// Two teams of one to three random combatants, each with a leader.
    pub fn arb_roster() -> impl Strategy<Value = RosterData> {
        let team = |id: u8| {
            (arb_combatant(true), prop::collection::vec(arb_combatant(false), 0..3)).prop_map(
                move |(leader, mut rest)| {
                    rest.insert(0, leader);
                    TeamData { id, members: rest }
                },
            )
        };
        (team(0), team(1)).prop_map(|(a, b)| RosterData { teams: vec![a, b] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{duel_roster, mirror_roster};
    use mech_core::config::BattleConfig;

    fn seeded(seed: u64) -> Battle {
        let config = BattleConfig {
            seed,
            ..BattleConfig::default()
        };
        Battle::new(config, &mirror_roster(3)).expect("fixture roster is valid")
    }

    #[test]
    fn test_verify_determinism_detects_match() {
        let result = verify_determinism(3, 10, || 42u64, |s| *s += 1, |s| *s);
        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![52, 52, 52]);
    }

    #[test]
    fn test_battle_is_deterministic() {
        assert!(verify_battle_determinism(|| seeded(11), 2_000));
        assert_eq!(find_first_divergence(|| seeded(11), 500), None);
    }

    #[test]
    fn test_parallel_battles_match() {
        run_parallel_battles(|| seeded(5), 4, 1_000).assert_deterministic();
    }

    #[test]
    fn test_event_log_is_reproducible() {
        assert!(verify_event_log_determinism(
            || Battle::new(BattleConfig::default(), &duel_roster()).expect("valid"),
            800
        ));
    }
}
