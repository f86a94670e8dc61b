//! `POST /auth/register|login|validate` (spec §4.4 ambient transport),
//! grounded on the teacher's own choice of `rocket` in
//! `services/authenticator/src/main.rs`, updated from the nightly
//! `proc_macro_hygiene`/`rocket_contrib` API to stable rocket 0.5.

use crate::core::{Authenticator, LoginFailure, ValidateOutcome, INVALID_CREDENTIALS_MESSAGE};
use rocket::post;
use rocket::serde::json::Json;
use rocket::State;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm: String,
}

#[derive(Serialize)]
#[serde(tag = "status")]
pub enum RegisterResponse {
    #[serde(rename = "success")]
    Success { account_id: u64, username: String },
    #[serde(rename = "failure")]
    Failure { reason: String },
}

#[post("/register", data = "<request>")]
pub fn register(authenticator: &State<Authenticator>, request: Json<RegisterRequest>) -> Json<RegisterResponse> {
    let request = request.into_inner();
    let result = authenticator.register(request.username, request.email, request.password, request.confirm);
    Json(match result {
        Ok(outcome) => RegisterResponse::Success { account_id: outcome.account_id, username: outcome.username },
        Err(err) => RegisterResponse::Failure { reason: err.reason() },
    })
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(tag = "status")]
pub enum LoginResponse {
    #[serde(rename = "success")]
    Success { token: String, expires_at: u64, user_id: u64, username: String },
    #[serde(rename = "rate_limited")]
    RateLimited { retry_after_seconds: i64, message: String },
    #[serde(rename = "failure")]
    Failure { reason: String },
}

#[post("/login", data = "<request>")]
pub fn login(
    authenticator: &State<Authenticator>,
    source: SourceAddr,
    request: Json<LoginRequest>,
) -> Json<LoginResponse> {
    let request = request.into_inner();
    let result = authenticator.login(request.username_or_email, request.password, source.0);
    Json(match result {
        Ok(outcome) => LoginResponse::Success {
            token: outcome.token,
            expires_at: outcome.expires_at,
            user_id: outcome.user_id,
            username: outcome.username,
        },
        Err(LoginFailure::RateLimited { retry_after_seconds }) => LoginResponse::RateLimited {
            retry_after_seconds,
            message: "Too many failed attempts, try again later".to_string(),
        },
        Err(LoginFailure::InvalidCredentials) => {
            LoginResponse::Failure { reason: INVALID_CREDENTIALS_MESSAGE.to_string() }
        }
    })
}

#[derive(Deserialize)]
pub struct ValidateRequest {
    pub token: String,
}

#[derive(Serialize)]
#[serde(tag = "status")]
pub enum ValidateResponse {
    #[serde(rename = "valid")]
    Valid { user_id: u64, username: String, expires_at: u64 },
    #[serde(rename = "invalid")]
    Invalid { reason: String },
}

#[post("/validate", data = "<request>")]
pub fn validate(authenticator: &State<Authenticator>, request: Json<ValidateRequest>) -> Json<ValidateResponse> {
    Json(match authenticator.validate_token(&request.token) {
        ValidateOutcome::Valid { user_id, username, expires_at } => {
            ValidateResponse::Valid { user_id, username, expires_at }
        }
        ValidateOutcome::Invalid(reason) => ValidateResponse::Invalid { reason },
    })
}

/// Extracted from the connection's peer address — Rocket has no
/// built-in "client IP" guard, so this reads straight off the socket.
pub struct SourceAddr(pub IpAddr);

#[rocket::async_trait]
impl<'r> rocket::request::FromRequest<'r> for SourceAddr {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r rocket::Request<'_>) -> rocket::request::Outcome<Self, Self::Error> {
        let addr = request.client_ip().unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED));
        rocket::request::Outcome::Success(SourceAddr(addr))
    }
}
