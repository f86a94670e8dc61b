//! The Prediction Engine (spec §4.5): client-local execution of inputs
//! ahead of server confirmation, with reconciliation against later
//! authoritative snapshots and slow tick-drift correction to hide
//! jitter. Has no teacher precedent — the teacher repo predates this
//! component entirely — so the shape is built directly from the spec,
//! in the error-enum/thiserror idiom the rest of the workspace uses.

use crate::ring::{InputRing, StateRing};
use gamecore::{ActionFlags, InputCommand, MovementSettings, PredictionSettings, StateSnapshot, Vec2};
use thiserror::Error;

/// Exponential smoothing factor for the misprediction delta metric
/// (spec §4.5 "exponentially-smoothed mean position delta with α = 0.1").
const MISPREDICTION_SMOOTHING_ALPHA: f32 = 0.1;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum PredictionError {
    #[error("prediction engine is not initialized")]
    NotInitialized,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum EngineState {
    Uninitialized,
    Running,
}

#[derive(Debug, Clone)]
pub enum PredictionEvent {
    Misprediction {
        predicted: StateSnapshot,
        server: StateSnapshot,
        delta: f32,
    },
    ReconciliationComplete {
        old: StateSnapshot,
        new: StateSnapshot,
        replayed_count: usize,
    },
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PredictionMetrics {
    pub misprediction_count: u64,
    pub smoothed_position_delta: f32,
}

pub struct PredictionEngine {
    state: EngineState,
    movement: MovementSettings,
    settings: PredictionSettings,

    current_state: Option<StateSnapshot>,
    current_tick: u32,
    sequence_number: u32,

    input_ring: InputRing,
    state_ring: StateRing,

    metrics: PredictionMetrics,
}

impl PredictionEngine {
    pub fn new(movement: MovementSettings, settings: PredictionSettings) -> PredictionEngine {
        PredictionEngine {
            state: EngineState::Uninitialized,
            input_ring: InputRing::new(settings.ring_capacity),
            state_ring: StateRing::new(settings.ring_capacity),
            movement,
            settings,
            current_state: None,
            current_tick: 0,
            sequence_number: 0,
            metrics: PredictionMetrics::default(),
        }
    }

    pub fn metrics(&self) -> PredictionMetrics {
        self.metrics
    }

    pub fn current_state(&self) -> Option<StateSnapshot> {
        self.current_state
    }

    /// `Uninitialized -> Running`: seed buffers and metrics, adopt the
    /// server's tick as our own (spec §4.5 "State machine").
    pub fn initialize(&mut self, initial_state: StateSnapshot, server_tick: u32) {
        self.input_ring.clear();
        self.state_ring.clear();
        self.current_state = Some(initial_state);
        self.current_tick = server_tick;
        self.sequence_number = 0;
        self.metrics = PredictionMetrics::default();
        self.state = EngineState::Running;
    }

    /// `Running -> Uninitialized`.
    pub fn reset(&mut self) {
        self.current_state = None;
        self.state = EngineState::Uninitialized;
    }

    /// Advance one tick with fresh raw player input, returning the
    /// command to serialize and send to the server (spec §4.5
    /// "Per-tick processing").
    pub fn process_input(
        &mut self,
        move_direction: Vec2,
        look_rotation: f32,
        action_flags: ActionFlags,
    ) -> Result<InputCommand, PredictionError> {
        if self.state != EngineState::Running {
            return Err(PredictionError::NotInitialized);
        }

        self.current_tick += 1;
        self.sequence_number += 1;

        let command = InputCommand {
            tick: self.current_tick,
            sequence_number: self.sequence_number,
            move_direction,
            look_rotation,
            action_flags,
        };

        let current = self.current_state.expect("Running implies current_state is set");
        let next = gamecore::execute(&current, &command, &self.movement, self.settings.tick_delta());

        self.input_ring.push(command);
        self.state_ring.push(next);
        self.current_state = Some(next);

        Ok(command)
    }

    /// Reconcile against an authoritative snapshot from the server
    /// (spec §4.5 "Reconciliation"). Returns the events the caller
    /// should surface (`OnMisprediction` / `OnReconciliationComplete`);
    /// an empty vec means the snapshot was stale/future and ignored.
    pub fn reconcile(&mut self, server_state: StateSnapshot) -> Vec<PredictionEvent> {
        if self.state != EngineState::Running {
            return Vec::new();
        }

        let predicted = match self.state_ring.lookup_by_tick(server_state.tick) {
            Some(predicted) => predicted,
            None => return Vec::new(),
        };

        let position_delta = predicted.position.distance(server_state.position);
        let velocity_delta = predicted.velocity.distance(server_state.velocity);
        let within_tolerance = position_delta <= self.settings.position_tolerance
            && velocity_delta <= self.settings.velocity_tolerance
            && predicted.state_flags == server_state.state_flags;

        if within_tolerance {
            self.input_ring.drop_prefix_up_to(server_state.last_processed_input);
            return Vec::new();
        }

        self.metrics.misprediction_count += 1;
        self.metrics.smoothed_position_delta = MISPREDICTION_SMOOTHING_ALPHA * position_delta
            + (1.0 - MISPREDICTION_SMOOTHING_ALPHA) * self.metrics.smoothed_position_delta;

        let mut events = vec![PredictionEvent::Misprediction {
            predicted,
            server: server_state,
            delta: position_delta,
        }];

        let old = self.current_state.expect("Running implies current_state is set");
        let mut working = server_state;
        let mut replayed_count = 0;

        let to_replay: Vec<InputCommand> = self
            .input_ring
            .iter()
            .filter(|c| c.tick > server_state.tick)
            .copied()
            .collect();

        for command in to_replay {
            working = gamecore::execute(&working, &command, &self.movement, self.settings.tick_delta());
            self.state_ring.push(working);
            replayed_count += 1;
        }

        self.current_state = Some(working);
        self.input_ring.drop_prefix_up_to(server_state.last_processed_input);

        events.push(PredictionEvent::ReconciliationComplete {
            old,
            new: working,
            replayed_count,
        });
        events
    }

    /// Slowly converge `current_tick` toward the server's estimated
    /// current tick (spec §4.5 "Tick synchronization").
    pub fn sync_tick(&mut self, server_tick: u32, one_way_latency: f32) {
        if self.state != EngineState::Running {
            return;
        }
        let estimated_server_tick =
            server_tick as f32 + one_way_latency / self.settings.tick_delta();
        let drift = estimated_server_tick as i64 - self.current_tick as i64;

        if drift.unsigned_abs() as i32 > self.settings.max_tick_drift {
            self.current_tick = estimated_server_tick as u32;
        } else {
            self.current_tick = (self.current_tick as i64 + drift / 4) as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamecore::{StateFlags, Vec3};

    fn engine() -> PredictionEngine {
        PredictionEngine::new(MovementSettings::default(), PredictionSettings::default())
    }

    #[test]
    fn process_input_before_initialize_fails() {
        let mut engine = engine();
        let err = engine
            .process_input(Vec2::default(), 0.0, ActionFlags::empty())
            .unwrap_err();
        assert_eq!(err, PredictionError::NotInitialized);
    }

    #[test]
    fn initialize_then_process_input_advances_tick_and_sequence() {
        let mut engine = engine();
        engine.initialize(StateSnapshot::initial(10), 10);
        let cmd = engine
            .process_input(Vec2 { x: 1.0, y: 0.0 }, 0.0, ActionFlags::empty())
            .unwrap();
        assert_eq!(cmd.tick, 11);
        assert_eq!(cmd.sequence_number, 1);
        assert_eq!(engine.current_state().unwrap().tick, 11);
    }

    #[test]
    fn reconcile_within_tolerance_only_drops_acked_inputs() {
        let mut engine = engine();
        engine.initialize(StateSnapshot::initial(0), 0);
        let cmd = engine
            .process_input(Vec2::default(), 0.0, ActionFlags::empty())
            .unwrap();
        let predicted = engine.state_ring.lookup_by_tick(cmd.tick).unwrap();

        let events = engine.reconcile(predicted);
        assert!(events.is_empty());
        assert!(engine.input_ring.is_empty());
    }

    #[test]
    fn reconcile_outside_tolerance_replays_and_emits_events() {
        let mut engine = engine();
        engine.initialize(StateSnapshot::initial(0), 0);
        let cmd = engine
            .process_input(Vec2 { x: 1.0, y: 0.0 }, 0.0, ActionFlags::empty())
            .unwrap();

        let mut server_state = StateSnapshot::initial(cmd.tick);
        server_state.position = Vec3 { x: 999.0, y: 0.0, z: 0.0 };
        server_state.last_processed_input = cmd.sequence_number;
        server_state.state_flags = StateFlags::GROUNDED;

        let events = engine.reconcile(server_state);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], PredictionEvent::Misprediction { .. }));
        assert!(matches!(events[1], PredictionEvent::ReconciliationComplete { .. }));
        assert_eq!(engine.metrics().misprediction_count, 1);
    }

    #[test]
    fn reconcile_for_unknown_tick_is_ignored() {
        let mut engine = engine();
        engine.initialize(StateSnapshot::initial(0), 0);
        let events = engine.reconcile(StateSnapshot::initial(9999));
        assert!(events.is_empty());
    }

    #[test]
    fn large_drift_snaps_tick() {
        let mut engine = engine();
        engine.initialize(StateSnapshot::initial(0), 0);
        engine.sync_tick(100, 0.0);
        assert_eq!(engine.current_tick, 100);
    }

    #[test]
    fn small_drift_converges_slowly() {
        let mut engine = engine();
        engine.initialize(StateSnapshot::initial(0), 0);
        engine.sync_tick(4, 0.0);
        assert_eq!(engine.current_tick, 1);
    }
}
