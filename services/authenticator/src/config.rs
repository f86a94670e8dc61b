//! TOML-loaded config for the auth gateway binary (spec §6), same
//! `serdeconv::from_toml_file` pattern as `gamecore::config`.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub bind_address: String,
    /// Base64-encoded HMAC secret shared with the game server, at least
    /// 32 raw bytes (`flux::token::TokenSecret::MIN_LEN`). Generated by
    /// the `util` crate's secret-generation command.
    pub token_secret_base64: String,
}

impl Default for AuthConfig {
    fn default() -> AuthConfig {
        AuthConfig {
            bind_address: "0.0.0.0:2106".to_string(),
            token_secret_base64: String::new(),
        }
    }
}

impl AuthConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> flux::FluxResult<AuthConfig> {
        flux::config::load_toml(path)
    }
}
