//! Which combatant and part to aim at.

use serde::{Deserialize, Serialize};

use crate::components::{Combatant, EntityId, Part, PartKey};

use super::personality::CandidatePool;
use super::{AiContext, TargetChoice, TargetSelection, WeightedCandidate};

/// Weight of the legs under [`TargetStrategy::Speed`].
const LEGS_WEIGHT: u32 = 3;

/// Target-selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetStrategy {
    /// Fastest candidate, preferring its legs.
    Speed,
    /// Lowest-HP unbroken part among all candidates.
    WeakestPart,
    /// Highest-HP unbroken part among all candidates.
    StrongestPart,
    /// Any unbroken part of any candidate.
    Random,
    /// Whoever last attacked the actor.
    Counter,
    /// Whoever last attacked the actor's team leader.
    GuardLeader,
    /// The actor's team's last attack target.
    Focus,
    /// The enemy leader.
    EnemyLeader,
    /// Closest candidate by position.
    Nearest,
    /// The ally part missing the most HP.
    MostDamagedAlly,
}

impl TargetStrategy {
    /// Parse a data key such as `"weakest_part"`.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "speed" => Some(TargetStrategy::Speed),
            "weakest_part" => Some(TargetStrategy::WeakestPart),
            "strongest_part" => Some(TargetStrategy::StrongestPart),
            "random" => Some(TargetStrategy::Random),
            "counter" => Some(TargetStrategy::Counter),
            "guard_leader" => Some(TargetStrategy::GuardLeader),
            "focus" => Some(TargetStrategy::Focus),
            "enemy_leader" => Some(TargetStrategy::EnemyLeader),
            "nearest" => Some(TargetStrategy::Nearest),
            "most_damaged_ally" => Some(TargetStrategy::MostDamagedAlly),
            _ => None,
        }
    }

    /// Select among the pool's candidates. Randomness is left to
    /// [`TargetSelection::normalize`]. `None` means this strategy has
    /// nothing to offer and the next routine should be tried.
    pub fn select(
        self,
        ctx: &AiContext<'_>,
        actor: &Combatant,
        pool: CandidatePool,
    ) -> Option<TargetSelection> {
        let candidates = candidates(ctx, actor, pool);
        match self {
            TargetStrategy::Speed => {
                let fastest = first_max_by_key(&candidates, |c| c.propulsion())?;
                weighted_parts(fastest, |part| {
                    if part.key == PartKey::Legs {
                        LEGS_WEIGHT
                    } else {
                        1
                    }
                })
            }
            TargetStrategy::WeakestPart => {
                extreme_part(&candidates, |best, part| part.hp() < best.hp())
            }
            TargetStrategy::StrongestPart => {
                extreme_part(&candidates, |best, part| part.hp() > best.hp())
            }
            TargetStrategy::Random => {
                let all: Vec<WeightedCandidate> = candidates
                    .iter()
                    .flat_map(|c| unbroken(c).map(move |p| weighted(c.id, p.key, 1)))
                    .collect();
                (!all.is_empty()).then_some(TargetSelection::Weighted(all))
            }
            TargetStrategy::Counter => {
                pooled(&candidates, actor.history.last_attacked_by?).and_then(any_part)
            }
            TargetStrategy::GuardLeader => {
                let attacker = ctx.history.leader_last_attacked_by(actor.team)?;
                pooled(&candidates, attacker).and_then(any_part)
            }
            TargetStrategy::Focus => {
                let (target_id, part_key) = ctx.history.team_last_attack(actor.team)?;
                let target = pooled(&candidates, target_id)?;
                if target.parts.get(part_key).is_broken() {
                    any_part(target)
                } else {
                    Some(TargetSelection::Single(TargetChoice {
                        target_id,
                        part_key,
                    }))
                }
            }
            TargetStrategy::EnemyLeader => candidates
                .iter()
                .find(|c| c.is_leader && c.team != actor.team)
                .and_then(|c| any_part(c)),
            TargetStrategy::Nearest => {
                let nearest = first_min_by_key(&candidates, |c| {
                    actor.position.distance_squared(c.position)
                })?;
                any_part(nearest)
            }
            TargetStrategy::MostDamagedAlly => {
                let mut best: Option<(&Combatant, &Part)> = None;
                for &c in &candidates {
                    for part in unbroken(c).filter(|p| p.missing_hp() > 0) {
                        if best.map_or(true, |(_, b)| part.missing_hp() > b.missing_hp()) {
                            best = Some((c, part));
                        }
                    }
                }
                best.map(|(c, p)| {
                    TargetSelection::Single(TargetChoice {
                        target_id: c.id,
                        part_key: p.key,
                    })
                })
            }
        }
    }
}

fn candidates<'a>(
    ctx: &AiContext<'a>,
    actor: &Combatant,
    pool: CandidatePool,
) -> Vec<&'a Combatant> {
    match pool {
        CandidatePool::Enemies => ctx.roster.living_enemies_of(actor.team).collect(),
        CandidatePool::AlliesExcludingSelf => ctx
            .roster
            .living_in_team(actor.team)
            .filter(|c| c.id != actor.id)
            .collect(),
        CandidatePool::AlliesIncludingSelf => ctx.roster.living_in_team(actor.team).collect(),
    }
}

fn pooled<'a>(candidates: &[&'a Combatant], id: EntityId) -> Option<&'a Combatant> {
    candidates.iter().copied().find(|c| c.id == id)
}

fn unbroken(c: &Combatant) -> impl Iterator<Item = &Part> {
    c.parts.iter().filter(|p| !p.is_broken())
}

fn weighted(target_id: EntityId, part_key: PartKey, weight: u32) -> WeightedCandidate {
    WeightedCandidate {
        choice: TargetChoice { target_id, part_key },
        weight,
    }
}

fn weighted_parts(target: &Combatant, weight: impl Fn(&Part) -> u32) -> Option<TargetSelection> {
    let list: Vec<WeightedCandidate> = unbroken(target)
        .map(|p| weighted(target.id, p.key, weight(p)))
        .collect();
    (!list.is_empty()).then_some(TargetSelection::Weighted(list))
}

/// Every unbroken part of one target, equally weighted.
fn any_part(target: &Combatant) -> Option<TargetSelection> {
    weighted_parts(target, |_| 1)
}

/// Best unbroken part across all candidates; earlier parts win ties.
fn extreme_part(
    candidates: &[&Combatant],
    better: impl Fn(&Part, &Part) -> bool,
) -> Option<TargetSelection> {
    let mut best: Option<(EntityId, &Part)> = None;
    for c in candidates {
        for part in unbroken(c) {
            if best.map_or(true, |(_, b)| better(b, part)) {
                best = Some((c.id, part));
            }
        }
    }
    best.map(|(target_id, part)| {
        TargetSelection::Single(TargetChoice {
            target_id,
            part_key: part.key,
        })
    })
}

fn first_max_by_key<'a, K: Ord>(
    candidates: &[&'a Combatant],
    key: impl Fn(&Combatant) -> K,
) -> Option<&'a Combatant> {
    let mut best: Option<(&'a Combatant, K)> = None;
    for &c in candidates {
        let k = key(c);
        if best.as_ref().map_or(true, |(_, b)| k > *b) {
            best = Some((c, k));
        }
    }
    best.map(|(c, _)| c)
}

fn first_min_by_key<'a, K: Ord>(
    candidates: &[&'a Combatant],
    key: impl Fn(&Combatant) -> K,
) -> Option<&'a Combatant> {
    let mut best: Option<(&'a Combatant, K)> = None;
    for &c in candidates {
        let k = key(c);
        if best.as_ref().map_or(true, |(_, b)| k < *b) {
            best = Some((c, k));
        }
    }
    best.map(|(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{record_attack, BattleHistory};
    use crate::math::{Fixed, Vec2Fixed};
    use crate::rng::ScriptedRandom;
    use crate::roster::Roster;
    use crate::test_support::combatant;

    fn select(
        strategy: TargetStrategy,
        roster: &Roster,
        history: &BattleHistory,
        actor_id: EntityId,
        pool: CandidatePool,
    ) -> Option<TargetSelection> {
        let ctx = AiContext { roster, history };
        let actor = roster.get(actor_id).unwrap();
        strategy.select(&ctx, actor, pool)
    }

    fn single(target_id: EntityId, part_key: PartKey) -> Option<TargetSelection> {
        Some(TargetSelection::Single(TargetChoice { target_id, part_key }))
    }

    #[test]
    fn test_from_key_round_trip_names() {
        assert_eq!(
            TargetStrategy::from_key("most_damaged_ally"),
            Some(TargetStrategy::MostDamagedAlly)
        );
        assert_eq!(TargetStrategy::from_key("psychic"), None);
    }

    #[test]
    fn test_speed_prefers_fastest_legs() {
        let mut fast = combatant(3, 1);
        fast.parts.get_mut(PartKey::Legs).stats.propulsion = 20;
        let roster = Roster::new(vec![combatant(1, 0), combatant(2, 1), fast]);
        let history = BattleHistory::default();
        let selection = select(
            TargetStrategy::Speed,
            &roster,
            &history,
            1,
            CandidatePool::Enemies,
        )
        .unwrap();
        let mut rng = ScriptedRandom::always();
        assert_eq!(
            selection.normalize(&mut rng),
            Some(TargetChoice {
                target_id: 3,
                part_key: PartKey::Legs
            })
        );
    }

    #[test]
    fn test_strongest_part() {
        let mut enemy = combatant(2, 1);
        enemy.parts.get_mut(PartKey::Head).apply_damage(5);
        enemy.parts.get_mut(PartKey::RightArm).apply_damage(5);
        enemy.parts.get_mut(PartKey::LeftArm).apply_damage(5);
        let roster = Roster::new(vec![combatant(1, 0), enemy]);
        let history = BattleHistory::default();
        assert_eq!(
            select(
                TargetStrategy::StrongestPart,
                &roster,
                &history,
                1,
                CandidatePool::Enemies
            ),
            single(2, PartKey::Legs)
        );
    }

    #[test]
    fn test_counter_needs_history() {
        let mut roster = Roster::new(vec![combatant(1, 0), combatant(2, 1), combatant(3, 1)]);
        let mut history = BattleHistory::default();
        assert!(select(
            TargetStrategy::Counter,
            &roster,
            &history,
            1,
            CandidatePool::Enemies
        )
        .is_none());

        record_attack(&mut history, &mut roster, 3, 1, PartKey::Head);
        let selection = select(
            TargetStrategy::Counter,
            &roster,
            &history,
            1,
            CandidatePool::Enemies,
        )
        .unwrap();
        let mut rng = ScriptedRandom::always();
        assert_eq!(selection.normalize(&mut rng).map(|c| c.target_id), Some(3));
    }

    #[test]
    fn test_focus_follows_team_target() {
        let mut roster = Roster::new(vec![combatant(1, 0), combatant(4, 0), combatant(2, 1)]);
        let mut history = BattleHistory::default();
        record_attack(&mut history, &mut roster, 4, 2, PartKey::LeftArm);
        assert_eq!(
            select(
                TargetStrategy::Focus,
                &roster,
                &history,
                1,
                CandidatePool::Enemies
            ),
            single(2, PartKey::LeftArm)
        );
    }

    #[test]
    fn test_enemy_leader() {
        let mut leader = combatant(3, 1);
        leader.is_leader = true;
        let roster = Roster::new(vec![combatant(1, 0), combatant(2, 1), leader]);
        let history = BattleHistory::default();
        let selection = select(
            TargetStrategy::EnemyLeader,
            &roster,
            &history,
            1,
            CandidatePool::Enemies,
        )
        .unwrap();
        let mut rng = ScriptedRandom::always();
        assert_eq!(selection.normalize(&mut rng).map(|c| c.target_id), Some(3));
    }

    #[test]
    fn test_nearest_by_position() {
        let mut near = combatant(3, 1);
        near.position = Vec2Fixed::new(Fixed::from_num(10), Fixed::ZERO);
        let mut far = combatant(2, 1);
        far.position = Vec2Fixed::new(Fixed::from_num(300), Fixed::ZERO);
        let roster = Roster::new(vec![combatant(1, 0), far, near]);
        let history = BattleHistory::default();
        let selection = select(
            TargetStrategy::Nearest,
            &roster,
            &history,
            1,
            CandidatePool::Enemies,
        )
        .unwrap();
        let mut rng = ScriptedRandom::always();
        assert_eq!(selection.normalize(&mut rng).map(|c| c.target_id), Some(3));
    }

    #[test]
    fn test_most_damaged_ally_none_when_healthy() {
        let roster = Roster::new(vec![combatant(1, 0), combatant(2, 0)]);
        let history = BattleHistory::default();
        assert!(select(
            TargetStrategy::MostDamagedAlly,
            &roster,
            &history,
            1,
            CandidatePool::AlliesIncludingSelf
        )
        .is_none());
    }

    #[test]
    fn test_most_damaged_ally_excluding_self() {
        let mut me = combatant(1, 0);
        me.parts.get_mut(PartKey::Head).apply_damage(30);
        let mut ally = combatant(2, 0);
        ally.parts.get_mut(PartKey::Legs).apply_damage(10);
        let roster = Roster::new(vec![me, ally]);
        let history = BattleHistory::default();
        assert_eq!(
            select(
                TargetStrategy::MostDamagedAlly,
                &roster,
                &history,
                1,
                CandidatePool::AlliesExcludingSelf
            ),
            single(2, PartKey::Legs)
        );
    }
}
