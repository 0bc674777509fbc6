//! Readiness and state machine.
//!
//! The central timing authority of a battle. The [`Scheduler`] integrates
//! gauges, holds the select and execute queues, and buffers elapsed time
//! while anyone waits in `ReadySelect` or `ReadyExecute`.
//! [`apply_state_update`] is the executor: the one code path that changes
//! a combatant's state, gauge phase or action slot.
//!
//! # Lifecycle
//!
//! ```text
//! Charging -> ReadySelect -> SelectedCharging -> ReadyExecute
//!     ^                                              |
//!     +------- AwaitingAnimation <-------------------+
//!     +------- Guarding <----------------------------+
//! (any) -> Broken
//! ```

use std::cmp::Reverse;
use std::collections::BTreeSet;

use tracing::debug;

use crate::combat::{gauge_increment, speed_multiplier};
use crate::components::{
    Combatant, CombatantState, EntityId, GaugePhase, PartKey, StatKind, StatusKind,
};
use crate::config::BattleConfig;
use crate::events::{BattleEvent, CancelReason, StateCommand, StateUpdate};
use crate::math::Fixed;
use crate::roster::Roster;
use crate::stats::effective_stat;

// ============================================================================
// Ready Queue
// ============================================================================

/// Queue ordered by descending leg propulsion, then insertion order.
#[derive(Debug, Clone, Default)]
pub struct ReadyQueue {
    entries: BTreeSet<(Reverse<i32>, u64, EntityId)>,
    next_seq: u64,
}

impl ReadyQueue {
    /// Add an entry.
    pub fn push(&mut self, id: EntityId, propulsion: i32) {
        self.entries.insert((Reverse(propulsion), self.next_seq, id));
        self.next_seq += 1;
    }

    /// Take the highest-priority entry.
    pub fn pop(&mut self) -> Option<EntityId> {
        self.entries.pop_first().map(|(_, _, id)| id)
    }

    /// Whether an id is queued.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.iter().any(|&(_, _, queued)| queued == id)
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Gauge integration and ready queues.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    select_queue: ReadyQueue,
    execute_queue: ReadyQueue,
    buffered_ms: u64,
}

impl Scheduler {
    /// Create an idle scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Time held back while the battle was paused.
    #[must_use]
    pub const fn buffered_ms(&self) -> u64 {
        self.buffered_ms
    }

    /// Advance every accumulating gauge by `delta_ms`.
    ///
    /// While anyone sits in `ReadySelect` or `ReadyExecute` the delta is
    /// buffered instead; the first unpaused update applies the buffered
    /// time once. Combatants that fill their gauge are moved to the next
    /// ready state and queued. Several may fill in one update; execution is
    /// still serialized because the battle pops one execute entry per tick.
    /// Returns whether gauges moved.
    pub fn update(
        &mut self,
        roster: &mut Roster,
        config: &BattleConfig,
        delta_ms: u64,
        events: &mut Vec<BattleEvent>,
    ) -> bool {
        if roster.is_paused() {
            self.buffered_ms = self.buffered_ms.saturating_add(delta_ms);
            return false;
        }

        let elapsed = delta_ms.saturating_add(self.buffered_ms);
        self.buffered_ms = 0;

        let mut filled = Vec::new();
        for combatant in roster.iter_mut() {
            if advance_gauge(combatant, config, elapsed) {
                filled.push((combatant.id, combatant.state, combatant.propulsion()));
            }
        }

        for (id, state, propulsion) in filled {
            let next = match state {
                CombatantState::Charging => CombatantState::ReadySelect,
                CombatantState::SelectedCharging => CombatantState::ReadyExecute,
                _ => continue,
            };
            events.extend(apply_state_update(
                roster,
                StateUpdate::new(id, StateCommand::TransitionState(next)),
                config,
            ));
            if next == CombatantState::ReadySelect {
                self.select_queue.push(id, propulsion);
                events.push(BattleEvent::EntityReady { entity_id: id });
            } else {
                self.execute_queue.push(id, propulsion);
            }
        }
        true
    }

    /// Next combatant waiting to choose an action.
    pub fn pop_select(&mut self, roster: &Roster) -> Option<EntityId> {
        pop_in_state(&mut self.select_queue, roster, CombatantState::ReadySelect)
    }

    /// Next combatant waiting to execute.
    pub fn pop_execute(&mut self, roster: &Roster) -> Option<EntityId> {
        pop_in_state(&mut self.execute_queue, roster, CombatantState::ReadyExecute)
    }

    /// Queued selection count.
    #[must_use]
    pub fn select_len(&self) -> usize {
        self.select_queue.len()
    }

    /// Queued execution count.
    #[must_use]
    pub fn execute_len(&self) -> usize {
        self.execute_queue.len()
    }
}

fn pop_in_state(
    queue: &mut ReadyQueue,
    roster: &Roster,
    state: CombatantState,
) -> Option<EntityId> {
    while let Some(id) = queue.pop() {
        if roster.get(id).is_some_and(|c| c.state() == state) {
            return Some(id);
        }
    }
    None
}

/// Integrate one combatant's gauge. Returns whether it reached the max.
fn advance_gauge(combatant: &mut Combatant, config: &BattleConfig, elapsed_ms: u64) -> bool {
    if !combatant.state().is_accumulating() || !combatant.gauge.active {
        return false;
    }
    let mobility = effective_stat(combatant, PartKey::Legs, StatKind::Mobility, config);
    let propulsion = effective_stat(combatant, PartKey::Legs, StatKind::Propulsion, config);
    let step = gauge_increment(
        combatant.gauge.speed,
        mobility,
        propulsion,
        combatant.gauge.speed_multiplier,
        elapsed_ms,
        config.update_interval_ms,
    );
    combatant.gauge.speed = step.next_speed;
    combatant.gauge.value = combatant
        .gauge
        .value
        .saturating_add(step.increment)
        .min(config.gauge_max);
    combatant.gauge.value >= config.gauge_max
}

// ============================================================================
// Executor
// ============================================================================

fn transition(
    roster: &mut Roster,
    id: EntityId,
    to: CombatantState,
    events: &mut Vec<BattleEvent>,
) {
    if let Some(from) = roster.set_state(id, to) {
        if from != to {
            events.push(BattleEvent::StateChanged {
                entity_id: id,
                from,
                to,
            });
        }
    }
    if let Some(c) = roster.get_mut(id) {
        c.gauge.active = to.is_accumulating();
    }
}

fn phase_multiplier(
    combatant: &Combatant,
    part_key: Option<PartKey>,
    phase: GaugePhase,
    config: &BattleConfig,
) -> Fixed {
    let Some(key) = part_key else {
        return Fixed::ONE;
    };
    let part = combatant.parts.get(key);
    let scale = match phase {
        GaugePhase::Charge => part.traits.charge_speed_scale,
        GaugePhase::Cooldown => part.traits.cooldown_speed_scale,
        GaugePhase::Idle => Fixed::ONE,
    };
    speed_multiplier(
        effective_stat(combatant, key, StatKind::Might, config),
        effective_stat(combatant, key, StatKind::Success, config),
        phase,
        scale,
        config,
    )
}

/// Apply one state-update command.
///
/// The only code path that moves a combatant between states, restarts its
/// gauge phase or writes its action slot. Commands addressed to a
/// `Broken` combatant are ignored.
pub fn apply_state_update(
    roster: &mut Roster,
    update: StateUpdate,
    config: &BattleConfig,
) -> Vec<BattleEvent> {
    let mut events = Vec::new();
    let id = update.entity_id;
    let Some(current) = roster.get(id).map(Combatant::state) else {
        return events;
    };
    if current == CombatantState::Broken {
        return events;
    }

    match update.command {
        StateCommand::TransitionState(to) => {
            if to == CombatantState::Broken {
                let defeat = StateUpdate::new(id, StateCommand::SetDefeated);
                return apply_state_update(roster, defeat, config);
            }
            transition(roster, id, to, &mut events);
        }
        StateCommand::DeclareAction(action) => {
            if current != CombatantState::ReadySelect {
                debug!(entity = id, state = ?current, "Action declared outside ReadySelect");
                return events;
            }
            if let Some(c) = roster.get_mut(id) {
                let multiplier = phase_multiplier(c, action.part_key, GaugePhase::Charge, config);
                c.gauge.restart(GaugePhase::Charge, multiplier);
                c.action = action;
            }
            transition(roster, id, CombatantState::SelectedCharging, &mut events);
            events.push(BattleEvent::ActionDeclared {
                entity_id: id,
                action,
            });
        }
        StateCommand::ResetToCooldown { interrupted } => {
            if let Some(c) = roster.get_mut(id) {
                if current == CombatantState::Guarding {
                    for expired in c.effects.remove_kind(StatusKind::Guard) {
                        events.push(BattleEvent::EffectExpired {
                            entity_id: id,
                            status: expired.kind,
                            source_part: expired.source_part,
                        });
                    }
                }
                let previous = c.gauge.value;
                let multiplier =
                    phase_multiplier(c, c.action.part_key, GaugePhase::Cooldown, config);
                c.gauge.restart(GaugePhase::Cooldown, multiplier);
                if interrupted {
                    c.gauge.value =
                        (config.gauge_max - previous).clamp(Fixed::ZERO, config.gauge_max);
                }
                c.action.clear();
            }
            transition(roster, id, CombatantState::Charging, &mut events);
        }
        StateCommand::SetDefeated => {
            if let Some(c) = roster.get_mut(id) {
                c.gauge.value = Fixed::ZERO;
                c.gauge.speed = Fixed::ZERO;
                c.action.clear();
                let team = c.team;
                transition(roster, id, CombatantState::Broken, &mut events);
                events.push(BattleEvent::CombatantDefeated {
                    entity_id: id,
                    team,
                });
            }
        }
        StateCommand::SnapToFixedPosition => {
            if let Some(c) = roster.get_mut(id) {
                c.position = config.action_line_position(c.team, c.home);
            }
        }
        StateCommand::ClearAction => {
            if let Some(c) = roster.get_mut(id) {
                c.action.clear();
            }
        }
    }
    events
}

/// Apply a batch of commands in order.
pub fn apply_state_updates(
    roster: &mut Roster,
    updates: &[StateUpdate],
    config: &BattleConfig,
) -> Vec<BattleEvent> {
    updates
        .iter()
        .flat_map(|&update| apply_state_update(roster, update, config))
        .collect()
}

/// Integrity check for a charging action.
///
/// Returns the reason to cancel when the reserved part broke or a locked
/// target became invalid.
#[must_use]
pub fn check_queued_action(roster: &Roster, id: EntityId) -> Option<CancelReason> {
    let combatant = roster.get(id)?;
    if combatant.state() != CombatantState::SelectedCharging {
        return None;
    }
    let Some(part_key) = combatant.action.part_key else {
        return Some(CancelReason::Interrupted);
    };
    if combatant.parts.get(part_key).is_broken() {
        return Some(CancelReason::PartBroken);
    }
    if let Some(target_id) = combatant.action.target_id {
        let Some(target) = roster.get(target_id) else {
            return Some(CancelReason::TargetLost);
        };
        if !target.is_alive() {
            return Some(CancelReason::TargetLost);
        }
        if let Some(target_part) = combatant.action.target_part_key {
            if target.parts.get(target_part).is_broken() {
                return Some(CancelReason::TargetLost);
            }
        }
    }
    None
}

/// Place a combatant between home and its action line.
///
/// Charging toward execution moves it forward with the gauge; cooldown
/// moves it back. An interrupted reset inverts the gauge, so the position
/// stays continuous.
pub fn update_position(combatant: &mut Combatant, config: &BattleConfig) {
    let line = config.action_line_position(combatant.team, combatant.home);
    let fraction = combatant.gauge.fraction(config.gauge_max);
    combatant.position = match combatant.state() {
        CombatantState::SelectedCharging => combatant.home.lerp(line, fraction),
        CombatantState::Charging => match combatant.gauge.phase {
            GaugePhase::Cooldown => combatant.home.lerp(line, Fixed::ONE - fraction),
            GaugePhase::Idle | GaugePhase::Charge => combatant.home,
        },
        CombatantState::ReadySelect => combatant.home,
        CombatantState::ReadyExecute
        | CombatantState::AwaitingAnimation
        | CombatantState::Guarding => line,
        CombatantState::Broken => combatant.position,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Action, Part, PartSet};

    fn combatant(id: EntityId, propulsion: i32) -> Combatant {
        let part = |key| Part::new(key, "p", 20);
        let mut legs = part(PartKey::Legs);
        legs.stats.propulsion = propulsion;
        Combatant::new(
            id,
            "c",
            0,
            PartSet::new(
                part(PartKey::Head),
                part(PartKey::RightArm),
                part(PartKey::LeftArm),
                legs,
            ),
        )
    }

    #[test]
    fn test_ready_queue_orders_by_propulsion_then_insertion() {
        let mut queue = ReadyQueue::default();
        queue.push(1, 5);
        queue.push(2, 9);
        queue.push(3, 5);
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_reset_to_cooldown_inverts_when_interrupted() {
        let config = BattleConfig::default();
        let mut roster = Roster::new(vec![combatant(1, 0), combatant(2, 0)]);
        for id in [1, 2] {
            roster.set_state(id, CombatantState::SelectedCharging);
            roster.get_mut(id).unwrap().gauge.value = Fixed::from_num(30);
        }

        apply_state_update(
            &mut roster,
            StateUpdate::new(1, StateCommand::ResetToCooldown { interrupted: true }),
            &config,
        );
        apply_state_update(
            &mut roster,
            StateUpdate::new(2, StateCommand::ResetToCooldown { interrupted: false }),
            &config,
        );

        assert_eq!(roster.get(1).unwrap().gauge.value, Fixed::from_num(70));
        assert_eq!(roster.get(2).unwrap().gauge.value, Fixed::ZERO);
        assert_eq!(roster.get(1).unwrap().state(), CombatantState::Charging);
        assert_eq!(roster.get(1).unwrap().gauge.phase, GaugePhase::Cooldown);
    }

    #[test]
    fn test_set_defeated_emits_once() {
        let config = BattleConfig::default();
        let mut roster = Roster::new(vec![combatant(1, 0)]);
        let first = apply_state_update(
            &mut roster,
            StateUpdate::new(1, StateCommand::SetDefeated),
            &config,
        );
        let second = apply_state_update(
            &mut roster,
            StateUpdate::new(1, StateCommand::SetDefeated),
            &config,
        );
        assert_eq!(
            first
                .iter()
                .filter(|e| matches!(e, BattleEvent::CombatantDefeated { .. }))
                .count(),
            1
        );
        assert!(second.is_empty());
        assert_eq!(roster.get(1).unwrap().state(), CombatantState::Broken);
        assert!(!roster.get(1).unwrap().gauge.active);
    }

    #[test]
    fn test_declare_action_requires_ready_select() {
        let config = BattleConfig::default();
        let mut roster = Roster::new(vec![combatant(1, 0)]);
        let action = Action {
            part_key: Some(PartKey::RightArm),
            target_id: None,
            target_part_key: None,
        };
        let events = apply_state_update(
            &mut roster,
            StateUpdate::new(1, StateCommand::DeclareAction(action)),
            &config,
        );
        assert!(events.is_empty());

        roster.set_state(1, CombatantState::ReadySelect);
        apply_state_update(
            &mut roster,
            StateUpdate::new(1, StateCommand::DeclareAction(action)),
            &config,
        );
        let c = roster.get(1).unwrap();
        assert_eq!(c.state(), CombatantState::SelectedCharging);
        assert_eq!(c.action, action);
        assert_eq!(c.gauge.value, Fixed::ZERO);
        assert_eq!(c.gauge.phase, GaugePhase::Charge);
    }

    #[test]
    fn test_scheduler_buffers_while_paused() {
        let config = BattleConfig::default();
        let mut roster = Roster::new(vec![combatant(1, 0), combatant(2, 0)]);
        let mut scheduler = Scheduler::new();
        let mut events = Vec::new();

        roster.set_state(2, CombatantState::ReadySelect);
        assert!(!scheduler.update(&mut roster, &config, 20, &mut events));
        assert!(!scheduler.update(&mut roster, &config, 20, &mut events));
        assert_eq!(scheduler.buffered_ms(), 40);
        assert_eq!(roster.get(1).unwrap().gauge.value, Fixed::ZERO);

        roster.set_state(2, CombatantState::SelectedCharging);
        assert!(scheduler.update(&mut roster, &config, 20, &mut events));
        assert_eq!(scheduler.buffered_ms(), 0);
        // One step of 0.1 speed over three intervals.
        let expected = gauge_increment(Fixed::ZERO, 0, 0, Fixed::ONE, 60, 20).increment;
        assert_eq!(roster.get(1).unwrap().gauge.value, expected);
    }

    #[test]
    fn test_scheduler_queues_filled_gauges() {
        let config = BattleConfig::default();
        let mut roster = Roster::new(vec![combatant(1, 0), combatant(2, 9)]);
        for id in [1, 2] {
            roster.get_mut(id).unwrap().gauge.value = config.gauge_max;
        }
        let mut scheduler = Scheduler::new();
        let mut events = Vec::new();
        scheduler.update(&mut roster, &config, 20, &mut events);

        assert_eq!(roster.count_in_state(CombatantState::ReadySelect), 2);
        assert_eq!(scheduler.pop_select(&roster), Some(2));
        assert_eq!(scheduler.pop_select(&roster), Some(1));
        assert!(events
            .iter()
            .any(|e| matches!(e, BattleEvent::EntityReady { entity_id: 1 })));
    }

    #[test]
    fn test_check_queued_action() {
        let mut roster = Roster::new(vec![combatant(1, 0), combatant(2, 0)]);
        roster.set_state(1, CombatantState::SelectedCharging);
        roster.get_mut(1).unwrap().action = Action {
            part_key: Some(PartKey::RightArm),
            target_id: Some(2),
            target_part_key: Some(PartKey::LeftArm),
        };
        assert_eq!(check_queued_action(&roster, 1), None);

        roster.get_mut(2).unwrap().parts.get_mut(PartKey::LeftArm).apply_damage(50);
        assert_eq!(check_queued_action(&roster, 1), Some(CancelReason::TargetLost));

        roster.get_mut(1).unwrap().parts.get_mut(PartKey::RightArm).apply_damage(50);
        assert_eq!(check_queued_action(&roster, 1), Some(CancelReason::PartBroken));
    }

    #[test]
    fn test_position_continuous_under_interrupt() {
        let config = BattleConfig::default();
        let mut roster = Roster::new(vec![combatant(1, 0)]);
        roster.set_state(1, CombatantState::SelectedCharging);
        {
            let c = roster.get_mut(1).unwrap();
            c.home = config.home_position(0, 0);
            c.gauge.value = Fixed::from_num(25);
            update_position(c, &config);
        }
        let before = roster.get(1).unwrap().position;
        apply_state_update(
            &mut roster,
            StateUpdate::new(1, StateCommand::ResetToCooldown { interrupted: true }),
            &config,
        );
        let c = roster.get_mut(1).unwrap();
        update_position(c, &config);
        assert_eq!(c.position, before);
    }
}
