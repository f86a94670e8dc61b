//! The Simulation Contract (spec §4.6): a pure function executed
//! identically by the authoritative server and the client's Prediction
//! Engine. No wall-clock reads, no randomness, 32-bit floats throughout,
//! canonical addition order — any divergence between the two call sites
//! manifests as permanent misprediction.

use crate::types::{ActionFlags, InputCommand, MovementSettings, StateFlags, StateSnapshot, Vec3};

/// Advance `state` by `dt` seconds under `input`, per `settings`.
pub fn execute(
    state: &StateSnapshot,
    input: &InputCommand,
    settings: &MovementSettings,
    dt: f32,
) -> StateSnapshot {
    let grounded = state.state_flags.contains(StateFlags::GROUNDED);
    let jump_pressed = input.action_flags.contains(ActionFlags::JUMP);
    let sprint = input.action_flags.contains(ActionFlags::SPRINT);
    let crouch = input.action_flags.contains(ActionFlags::CROUCH);

    let speed = if crouch {
        settings.crouch_speed
    } else if sprint {
        settings.sprint_speed
    } else {
        settings.walk_speed
    };

    let horizontal = Vec3 {
        x: input.move_direction.x * speed,
        y: 0.0,
        z: input.move_direction.y * speed,
    };

    let vertical_velocity = if grounded && jump_pressed {
        settings.jump_impulse
    } else {
        (state.velocity.y - settings.gravity * dt).max(-settings.max_fall_speed)
    };

    let velocity = Vec3 {
        x: horizontal.x,
        y: vertical_velocity,
        z: horizontal.z,
    };

    let mut position = state.position.add_scaled(velocity, dt);
    let mut grounded_now = false;
    let mut final_velocity = velocity;

    if position.y <= settings.ground_level {
        position.y = settings.ground_level;
        final_velocity.y = 0.0;
        grounded_now = true;
    }

    let mut state_flags = StateFlags::empty();
    if grounded_now {
        state_flags |= StateFlags::GROUNDED;
        if sprint {
            state_flags |= StateFlags::SPRINTING;
        }
        if crouch {
            state_flags |= StateFlags::CROUCHING;
        }
    }
    if final_velocity.y > 0.0 {
        state_flags |= StateFlags::JUMPING;
    } else if final_velocity.y < 0.0 {
        state_flags |= StateFlags::FALLING;
    }

    StateSnapshot {
        tick: input.tick,
        last_processed_input: input.sequence_number,
        position,
        velocity: final_velocity,
        rotation: input.look_rotation,
        state_flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec2;

    fn settings() -> MovementSettings {
        MovementSettings::default()
    }

    fn input(tick: u32, seq: u32, flags: ActionFlags) -> InputCommand {
        InputCommand {
            tick,
            sequence_number: seq,
            move_direction: Vec2 { x: 0.0, y: 0.0 },
            look_rotation: 0.0,
            action_flags: flags,
        }
    }

    #[test]
    fn grounded_idle_stays_grounded() {
        let settings = settings();
        let state = StateSnapshot::initial(0);
        let next = execute(&state, &input(1, 1, ActionFlags::empty()), &settings, 1.0 / 30.0);
        assert!(next.state_flags.contains(StateFlags::GROUNDED));
        assert_eq!(next.velocity.y, 0.0);
        assert_eq!(next.position.y, settings.ground_level);
    }

    #[test]
    fn jump_leaves_ground_and_falls_back() {
        let settings = settings();
        let mut state = StateSnapshot::initial(0);
        state.state_flags = StateFlags::GROUNDED;

        let jumped = execute(&state, &input(1, 1, ActionFlags::JUMP), &settings, 1.0 / 30.0);
        assert!(jumped.velocity.y > 0.0);
        assert!(jumped.state_flags.contains(StateFlags::JUMPING));
        assert!(jumped.position.y > settings.ground_level);
    }

    #[test]
    fn fall_speed_is_clamped() {
        let settings = settings();
        let mut state = StateSnapshot::initial(0);
        state.position.y = 1000.0;
        state.state_flags = StateFlags::empty();

        let mut next = state;
        for _ in 0..1000 {
            next = execute(&next, &input(1, 1, ActionFlags::empty()), &settings, 1.0 / 30.0);
            if next.state_flags.contains(StateFlags::GROUNDED) {
                break;
            }
            assert!(next.velocity.y >= -settings.max_fall_speed);
        }
    }

    #[test]
    fn last_processed_input_tracks_sequence_number() {
        let settings = settings();
        let state = StateSnapshot::initial(0);
        let next = execute(&state, &input(5, 42, ActionFlags::empty()), &settings, 1.0 / 30.0);
        assert_eq!(next.last_processed_input, 42);
        assert_eq!(next.tick, 5);
    }

    #[test]
    fn is_deterministic_given_same_inputs() {
        let settings = settings();
        let state = StateSnapshot::initial(3);
        let a = execute(&state, &input(4, 1, ActionFlags::SPRINT), &settings, 1.0 / 30.0);
        let b = execute(&state, &input(4, 1, ActionFlags::SPRINT), &settings, 1.0 / 30.0);
        assert_eq!(a, b);
    }
}
