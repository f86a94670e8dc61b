//! Shared input/state data model (spec §3): the types the Simulation
//! Contract operates on and the Prediction Engine buffers, kept
//! dependency-free so both `gameclient` and `gamerunner` can use them
//! without pulling in transport or pool code.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn zero() -> Vec3 {
        Vec3 { x: 0.0, y: 0.0, z: 0.0 }
    }

    /// Canonical-order addition (spec §4.6: "use a canonical order of
    /// additions" so client and server evaluate floating point the same
    /// way regardless of call site).
    pub fn add_scaled(self, other: Vec3, scale: f32) -> Vec3 {
        Vec3 {
            x: self.x + other.x * scale,
            y: self.y + other.y * scale,
            z: self.z + other.z * scale,
        }
    }

    pub fn distance(self, other: Vec3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

bitflags::bitflags! {
    #[derive(Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ActionFlags: u8 {
        const JUMP             = 0b0000_0001;
        const SPRINT           = 0b0000_0010;
        const CROUCH           = 0b0000_0100;
        const PRIMARY_ACTION   = 0b0000_1000;
        const SECONDARY_ACTION = 0b0001_0000;
        const INTERACT         = 0b0010_0000;
    }
}

bitflags::bitflags! {
    #[derive(Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct StateFlags: u8 {
        const GROUNDED  = 0b0000_0001;
        const SPRINTING = 0b0000_0010;
        const CROUCHING = 0b0000_0100;
        const JUMPING   = 0b0000_1000;
        const FALLING   = 0b0001_0000;
    }
}

/// A single tick's worth of raw player input (spec §3 "Input command").
/// `sequence_number` is strictly increasing within a connection,
/// distinct from `tick` because a tick may produce no input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputCommand {
    pub tick: u32,
    pub sequence_number: u32,
    pub move_direction: Vec2,
    pub look_rotation: f32,
    pub action_flags: ActionFlags,
}

/// The authoritative or predicted world state for one entity at one
/// tick (spec §3 "State snapshot"). Used bidirectionally: stored in the
/// client's state ring, and sent by the server as the authoritative
/// snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub tick: u32,
    pub last_processed_input: u32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: f32,
    pub state_flags: StateFlags,
}

impl StateSnapshot {
    pub fn initial(tick: u32) -> StateSnapshot {
        StateSnapshot {
            tick,
            last_processed_input: 0,
            position: Vec3::zero(),
            velocity: Vec3::zero(),
            rotation: 0.0,
            state_flags: StateFlags::GROUNDED,
        }
    }
}

/// Movement tuning consumed by the Simulation Contract (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementSettings {
    pub walk_speed: f32,
    pub sprint_speed: f32,
    pub crouch_speed: f32,
    pub jump_impulse: f32,
    pub gravity: f32,
    pub max_fall_speed: f32,
    pub ground_level: f32,
}

impl Default for MovementSettings {
    fn default() -> MovementSettings {
        MovementSettings {
            walk_speed: 4.0,
            sprint_speed: 7.0,
            crouch_speed: 2.0,
            jump_impulse: 6.0,
            gravity: 18.0,
            max_fall_speed: 40.0,
            ground_level: 0.0,
        }
    }
}

/// Reconciliation / tick-sync tolerances (spec §4.5, §6 config defaults).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionSettings {
    pub tick_rate: u32,
    pub ring_capacity: usize,
    pub position_tolerance: f32,
    pub velocity_tolerance: f32,
    pub max_tick_drift: i32,
}

impl Default for PredictionSettings {
    fn default() -> PredictionSettings {
        PredictionSettings {
            tick_rate: 30,
            ring_capacity: 64,
            position_tolerance: 0.01,
            velocity_tolerance: 0.1,
            max_tick_drift: 10,
        }
    }
}

impl PredictionSettings {
    pub fn tick_delta(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }
}
