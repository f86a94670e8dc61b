//! Shared input/state data model and the Simulation Contract (spec
//! §3, §4.6), used identically by the authoritative server and the
//! client's Prediction Engine.

pub mod config;
pub mod contract;
pub mod types;
pub mod wire;

pub use contract::execute;
pub use types::{
    ActionFlags, InputCommand, MovementSettings, PredictionSettings, StateFlags, StateSnapshot,
    Vec2, Vec3,
};
