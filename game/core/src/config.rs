//! Config records loaded from TOML via `serdeconv` (spec §6 "Key knobs
//! and their defaults"), grounded on the teacher's own
//! `GameConfig`/`serdeconv::from_toml_file` pattern.

use crate::types::{MovementSettings, PredictionSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_GAME_PORT: u16 = 7777;
pub const DEFAULT_AUTH_PORT: u16 = 2106;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub max_clients: usize,
    pub auth_gateway_url: String,
    /// Base64-encoded HMAC secret shared with the auth gateway
    /// (`AuthConfig.token_secret_base64`), used to validate bearer
    /// tokens locally at handshake time without a network round trip.
    pub token_secret_base64: String,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            bind_address: format!("0.0.0.0:{}", DEFAULT_GAME_PORT),
            max_clients: 100,
            auth_gateway_url: format!("http://127.0.0.1:{}", DEFAULT_AUTH_PORT),
            token_secret_base64: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub server: ServerConfig,
    pub movement: MovementSettings,
    pub prediction: PredictionSettings,
}

impl Default for GameConfig {
    fn default() -> GameConfig {
        GameConfig {
            server: ServerConfig::default(),
            movement: MovementSettings::default(),
            prediction: PredictionSettings::default(),
        }
    }
}

impl GameConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> flux::FluxResult<GameConfig> {
        flux::config::load_toml(path)
    }
}
