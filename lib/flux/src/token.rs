//! The bearer token minted by the auth gateway and validated by the game
//! server at handshake time (spec §4.4.1). Grounded on the teacher's
//! hand-rolled `ConnectionToken` (`services/authenticator/src/core.rs`) —
//! a compact, auditable wire format rather than a full JWT stack.
//!
//! Format: `base64url(json(claims)) '.' base64url(hmac_sha256(secret, json))`.

use crate::error::{FluxError, FluxResult};
use crate::time::timestamp_secs;
use crate::UserId;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Symmetric secret shared out-of-band between the auth gateway and the
/// game server (spec §3 "Auth token").
#[derive(Clone)]
pub struct TokenSecret(Vec<u8>);

impl TokenSecret {
    pub const MIN_LEN: usize = 32;

    pub fn new(bytes: Vec<u8>) -> Self {
        assert!(
            bytes.len() >= Self::MIN_LEN,
            "token secret must be at least {} bytes, got {}",
            Self::MIN_LEN,
            bytes.len()
        );
        TokenSecret(bytes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub username: String,
    pub iat: u64,
    pub exp: u64,
    pub jti: u64,
}

/// Default bearer token lifetime (spec §6): 60 minutes.
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 60 * 60;

/// Clock-skew tolerance applied to expiry checks (spec §6): 5 minutes.
pub const CLOCK_SKEW_TOLERANCE_SECS: u64 = 5 * 60;

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,
    #[error("Invalid token signature")]
    BadSignature,
    #[error("Invalid token format")]
    BadFormat,
    #[error("Token missing required claims")]
    MissingClaims,
}

/// Mint a signed bearer token for the given claims.
pub fn sign(secret: &TokenSecret, claims: &Claims) -> String {
    let payload = serde_json::to_vec(claims).expect("claims always serialize");
    let payload_b64 = URL_SAFE_NO_PAD.encode(&payload);

    let mut mac = HmacSha256::new_from_slice(&secret.0).expect("hmac accepts any key length");
    mac.update(payload_b64.as_bytes());
    let sig_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{payload_b64}.{sig_b64}")
}

/// Validate a token (spec §4.4 `ValidateToken`): synchronous, no I/O once
/// the secret is loaded. Verifies signature, then expiry with the clock
/// skew tolerance, then presence of required claims.
pub fn validate(secret: &TokenSecret, token: &str) -> Result<Claims, TokenError> {
    let (payload_b64, sig_b64) = token.split_once('.').ok_or(TokenError::BadFormat)?;

    let mut mac = HmacSha256::new_from_slice(&secret.0).expect("hmac accepts any key length");
    mac.update(payload_b64.as_bytes());

    let given_sig = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| TokenError::BadFormat)?;

    // `verify_slice` performs a constant-time comparison internally.
    mac.verify_slice(&given_sig)
        .map_err(|_| TokenError::BadSignature)?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| TokenError::BadFormat)?;
    let claims: Claims = serde_json::from_slice(&payload).map_err(|_| TokenError::MissingClaims)?;

    if claims.username.is_empty() {
        return Err(TokenError::MissingClaims);
    }

    let now = timestamp_secs();
    if now > claims.exp + CLOCK_SKEW_TOLERANCE_SECS {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}

/// Thin wrapper mapping `TokenError` onto `FluxResult` for callers that
/// only care whether *some* flux-level error occurred (mostly tests).
pub fn validate_flux(secret: &TokenSecret, token: &str) -> FluxResult<Claims> {
    validate(secret, token).map_err(|e| match e {
        TokenError::BadFormat => FluxError::MalformedToken,
        TokenError::BadSignature => FluxError::BadSignature,
        TokenError::Expired | TokenError::MissingClaims => FluxError::MalformedToken,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> TokenSecret {
        TokenSecret::new(vec![7u8; 32])
    }

    fn claims() -> Claims {
        let now = timestamp_secs();
        Claims {
            sub: 42,
            username: "alice".into(),
            iat: now,
            exp: now + DEFAULT_TOKEN_LIFETIME_SECS,
            jti: 1,
        }
    }

    #[test]
    fn round_trips() {
        let secret = secret();
        let token = sign(&secret, &claims());
        let decoded = validate(&secret, &token).unwrap();
        assert_eq!(decoded.sub, 42);
        assert_eq!(decoded.username, "alice");
    }

    #[test]
    fn rejects_bad_signature() {
        let secret = secret();
        let other = TokenSecret::new(vec![9u8; 32]);
        let token = sign(&secret, &claims());
        assert_eq!(validate(&other, &token), Err(TokenError::BadSignature));
    }

    #[test]
    fn rejects_malformed_token() {
        let secret = secret();
        assert_eq!(validate(&secret, "not-a-token"), Err(TokenError::BadFormat));
    }

    #[test]
    fn rejects_expired_token() {
        let secret = secret();
        let mut c = claims();
        c.exp = 0;
        c.iat = 0;
        let token = sign(&secret, &c);
        assert_eq!(validate(&secret, &token), Err(TokenError::Expired));
    }
}
