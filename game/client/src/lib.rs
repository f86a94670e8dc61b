//! Client-side Prediction Engine (spec §4.5): local execution of inputs
//! ahead of server confirmation, reconciled against later authoritative
//! snapshots via the same Simulation Contract the server runs.

pub mod prediction;
pub mod ring;

pub use prediction::{PredictionEngine, PredictionError, PredictionEvent, PredictionMetrics};
pub use ring::{InputRing, StateRing};
