//! Validates handshake tokens against the same HMAC secret the auth
//! gateway signs with, so the game server never calls out to the
//! gateway on the hot path (spec §4.4.1 boundary).

use flux::token::TokenSecret;
use neutronium::transport::TokenValidator;
use std::str;

pub struct SharedSecretValidator {
    secret: TokenSecret,
}

impl SharedSecretValidator {
    pub fn new(secret: TokenSecret) -> SharedSecretValidator {
        SharedSecretValidator { secret }
    }
}

impl TokenValidator for SharedSecretValidator {
    fn validate(&self, token: &[u8]) -> bool {
        let token = match str::from_utf8(token) {
            Ok(token) => token,
            Err(_) => return false,
        };
        flux::token::validate(&self.secret, token).is_ok()
    }
}
