//! Property tests for battle invariants.
//!
//! HP bounds, penetration termination, guard idempotence, interrupted
//! resets and whole-battle invariants over random rosters.

use mech_core::combat::HitOutcome;
use mech_core::components::Part;
use mech_core::effects::{run_pipeline, PipelineRequest};
use mech_core::events::{StateCommand, StateUpdate};
use mech_core::prelude::*;
use mech_core::readiness::{apply_state_update, apply_state_updates};
use mech_test_utils::determinism::strategies::{
    arb_amount, arb_combatant, arb_max_hp, arb_part_key, arb_roster, arb_seed,
};
use mech_test_utils::fixtures::{cannon, gunner, tank};
use proptest::prelude::*;

fn build(data: &RosterData) -> Roster {
    let combatants = data
        .build(&BattleConfig::default(), &PersonalityRegistry::builtin())
        .expect("valid roster");
    Roster::new(combatants)
}

fn pair(a: CombatantData, b: CombatantData) -> RosterData {
    RosterData {
        teams: vec![
            TeamData {
                id: 0,
                members: vec![a],
            },
            TeamData {
                id: 1,
                members: vec![b],
            },
        ],
    }
}

#[test]
fn guard_application_is_idempotent() {
    let mut roster = build(&pair(tank("Guardian", "crusher"), gunner("Enemy", "hunter", true)));
    let config = BattleConfig::default();
    let registry = EffectRegistry::standard();
    let request = PipelineRequest {
        actor_id: 1,
        part_key: PartKey::LeftArm,
        target_id: None,
        outcome: HitOutcome::certain(None),
        guardian: None,
    };

    for _ in 0..2 {
        let mut rng = SeededRandom::new(0);
        let output = run_pipeline(&registry, &mut roster, &config, &request, &mut rng);
        apply_state_updates(&mut roster, &output.state_updates, &config);
    }

    let guardian = roster.get(1).expect("exists");
    let guards: Vec<_> = guardian
        .effects
        .iter()
        .filter(|e| e.kind == StatusKind::Guard)
        .collect();
    assert_eq!(guards.len(), 1);
    assert_eq!(guards[0].remaining, Remaining::Uses(2));
    assert_eq!(guardian.state(), CombatantState::Guarding);
}

proptest! {
    #[test]
    fn part_hp_stays_in_bounds(
        max_hp in arb_max_hp(),
        ops in prop::collection::vec((any::<bool>(), arb_amount()), 0..40),
    ) {
        let mut part = Part::new(PartKey::RightArm, "arm", max_hp);
        let mut broken = false;
        for (is_damage, amount) in ops {
            if is_damage {
                let result = part.apply_damage(amount);
                prop_assert_eq!(result.broke, result.old_hp > 0 && result.new_hp == 0);
                prop_assert_eq!(result.new_hp, result.old_hp.saturating_sub(amount));
            } else {
                let (old, new) = part.heal(amount);
                if broken {
                    prop_assert_eq!(old, new);
                }
            }
            broken = part.is_broken();
            prop_assert!(part.hp() <= part.max_hp());
        }
    }

    #[test]
    fn penetration_terminates(
        defender in arb_combatant(true),
        might in 0i32..2_000,
        start in arb_part_key(),
        seed in arb_seed(),
    ) {
        let mut attacker = gunner("Attacker", "hunter", true);
        attacker.right_arm = cannon();
        attacker.right_arm.stats.might = might;
        let mut roster = build(&pair(attacker, defender));
        let request = PipelineRequest {
            actor_id: 1,
            part_key: PartKey::RightArm,
            target_id: Some(2),
            outcome: HitOutcome::certain(Some(start)),
            guardian: None,
        };
        let output = run_pipeline(
            &EffectRegistry::standard(),
            &mut roster,
            &BattleConfig::default(),
            &request,
            &mut SeededRandom::new(seed),
        );

        let damage: Vec<_> = output
            .applied
            .iter()
            .filter(|a| a.record.kind == EffectKind::Damage)
            .collect();
        prop_assert!(damage.len() <= PartKey::ALL.len());
        for applied in &damage {
            prop_assert!(usize::from(applied.record.chain_depth) < PartKey::ALL.len());
        }
        let target = roster.get(2).expect("exists");
        for part in target.parts.iter() {
            prop_assert!(part.hp() <= part.max_hp());
        }
    }

    #[test]
    fn interrupted_reset_inverts_gauge(value in 0i32..=100, seed in arb_seed()) {
        let config = BattleConfig { seed, ..BattleConfig::default() };
        let mut roster = build(&pair(gunner("A", "hunter", true), gunner("B", "hunter", true)));
        roster.get_mut(1).expect("exists").gauge.value = Fixed::from_num(value);
        apply_state_update(
            &mut roster,
            StateUpdate::new(1, StateCommand::ResetToCooldown { interrupted: true }),
            &config,
        );
        let combatant = roster.get(1).expect("exists");
        prop_assert_eq!(combatant.gauge.value, Fixed::from_num(100 - value));
        prop_assert_eq!(combatant.state(), CombatantState::Charging);
        prop_assert!(combatant.action.is_empty());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn random_battles_keep_invariants(data in arb_roster(), seed in arb_seed()) {
        let config = BattleConfig { seed, ..BattleConfig::default() };
        let mut battle = Battle::new(config, &data).expect("generated roster is valid");
        let gauge_max = battle.config().gauge_max;
        let mut game_overs = 0;
        for _ in 0..2_000 {
            let report = battle.tick(20);
            game_overs += report
                .events
                .iter()
                .filter(|e| matches!(e, BattleEvent::GameOver { .. }))
                .count();
            for c in battle.roster().iter() {
                for part in c.parts.iter() {
                    prop_assert!(part.hp() <= part.max_hp());
                }
                prop_assert!(c.gauge.value >= Fixed::ZERO && c.gauge.value <= gauge_max);
                if !c.is_alive() {
                    prop_assert_eq!(c.state(), CombatantState::Broken);
                }
            }
        }
        prop_assert!(game_overs <= 1);
        prop_assert_eq!(game_overs == 1, battle.is_over());
    }
}
