//! The three Auth Gateway operations (spec §4.4): Register, Login,
//! ValidateToken. Grounded on the teacher's `Authenticator` struct
//! shape (`services/authenticator/src/core.rs` — a single service
//! object holding its stores, secret and logger) generalized from a
//! single serial-key map to the account/attempt-store/rate-limiter
//! trio this spec calls for.

use crate::account::{Account, AccountStore};
use crate::attempt::AttemptStore;
use crate::hash::{hash_password, verify_password};
use crate::rate_limit::{RateLimitDecision, RateLimiter};
use chrono::Utc;
use flux::token::{self, Claims, TokenSecret};
use flux::UserId;
use rand::RngCore;
use slog::{info, o, warn, Logger};
use std::net::IpAddr;
use std::sync::Arc;

pub struct RegisterOutcome {
    pub account_id: UserId,
    pub username: String,
}

#[derive(Debug, Eq, PartialEq)]
pub enum RegisterError {
    Validation(String),
    UsernameTaken,
    EmailTaken,
    HashingFailed,
}

impl RegisterError {
    /// The user-facing reason string (spec §4.4 "Register ... reason").
    pub fn reason(&self) -> String {
        match self {
            RegisterError::Validation(message) => message.clone(),
            RegisterError::UsernameTaken => "Username already taken".to_string(),
            RegisterError::EmailTaken => "Email already registered".to_string(),
            RegisterError::HashingFailed => "Failed to process password".to_string(),
        }
    }
}

pub struct LoginOutcome {
    pub token: String,
    pub expires_at: u64,
    pub user_id: UserId,
    pub username: String,
}

pub enum LoginFailure {
    RateLimited { retry_after_seconds: i64 },
    /// Covers account-missing, wrong-password and hash-verification
    /// failure alike — the message must be identical across all three
    /// to avoid user enumeration (spec §4.4).
    InvalidCredentials,
}

pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid username or password";

pub enum ValidateOutcome {
    Valid { user_id: UserId, username: String, expires_at: u64 },
    Invalid(String),
}

pub struct Authenticator {
    accounts: Arc<dyn AccountStore>,
    attempts: Arc<dyn AttemptStore>,
    rate_limiter: RateLimiter,
    secret: TokenSecret,
    logger: Logger,
}

impl Authenticator {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        attempts: Arc<dyn AttemptStore>,
        secret: TokenSecret,
        logger: Logger,
    ) -> Authenticator {
        let logger = logger.new(o!("component" => "authenticator"));
        Authenticator {
            accounts,
            rate_limiter: RateLimiter::new(Arc::clone(&attempts), logger.clone()),
            attempts,
            secret,
            logger,
        }
    }

    pub fn register(
        &self,
        username: String,
        email: String,
        password: String,
        confirm: String,
    ) -> Result<RegisterOutcome, RegisterError> {
        validate_registration(&username, &email, &password, &confirm).map_err(RegisterError::Validation)?;

        if self.accounts.find_by_username(&username).unwrap_or(None).is_some() {
            return Err(RegisterError::UsernameTaken);
        }
        if self.accounts.find_by_email(&email).unwrap_or(None).is_some() {
            return Err(RegisterError::EmailTaken);
        }

        let password_hash = hash_password(&password).map_err(|_| RegisterError::HashingFailed)?;

        let account = self
            .accounts
            .insert(username, email, password_hash)
            .map_err(|_| RegisterError::HashingFailed)?;

        info!(self.logger, "account registered"; "account_id" => account.id);
        Ok(RegisterOutcome { account_id: account.id, username: account.username })
    }

    pub fn login(
        &self,
        username_or_email: String,
        password: String,
        source: IpAddr,
    ) -> Result<LoginOutcome, LoginFailure> {
        if let RateLimitDecision::Limited { retry_after_seconds } = self.rate_limiter.check(source) {
            return Err(LoginFailure::RateLimited { retry_after_seconds });
        }

        let account = self.lookup_account(&username_or_email);

        let verified = account
            .as_ref()
            .map(|a| verify_password(&password, &a.password_hash))
            .unwrap_or(false);

        if !verified {
            let _ = self.attempts.record(source, username_or_email.clone(), false);
            warn!(self.logger, "login failed"; "source" => %source);
            return Err(LoginFailure::InvalidCredentials);
        }

        let account = account.expect("verified implies account is Some");
        let _ = self.accounts.touch_last_login(account.id);
        let _ = self.attempts.record(source, username_or_email, true);

        let now = flux::time::timestamp_secs();
        let claims = Claims {
            sub: account.id,
            username: account.username.clone(),
            iat: now,
            exp: now + token::DEFAULT_TOKEN_LIFETIME_SECS,
            jti: rand::thread_rng().next_u64(),
        };
        let signed = token::sign(&self.secret, &claims);

        info!(self.logger, "login succeeded"; "account_id" => account.id);
        Ok(LoginOutcome {
            token: signed,
            expires_at: claims.exp,
            user_id: account.id,
            username: account.username,
        })
    }

    pub fn validate_token(&self, token: &str) -> ValidateOutcome {
        match token::validate(&self.secret, token) {
            Ok(claims) => ValidateOutcome::Valid {
                user_id: claims.sub,
                username: claims.username,
                expires_at: claims.exp,
            },
            Err(err) => ValidateOutcome::Invalid(err.to_string()),
        }
    }

    fn lookup_account(&self, username_or_email: &str) -> Option<Account> {
        let result = if username_or_email.contains('@') {
            self.accounts.find_by_email(username_or_email)
        } else {
            self.accounts.find_by_username(username_or_email)
        };
        result.unwrap_or(None)
    }

    /// Exposes the attempt store for the binary's background purge task.
    pub fn attempts(&self) -> Arc<dyn AttemptStore> {
        Arc::clone(&self.attempts)
    }
}

/// Purge attempt records older than 7 days (spec §4.4 "periodic
/// background task (e.g. daily)").
pub const ATTEMPT_RETENTION_DAYS: i64 = 7;

pub fn purge_stale_attempts(attempts: &dyn AttemptStore, logger: &Logger) {
    let cutoff = Utc::now() - chrono::Duration::days(ATTEMPT_RETENTION_DAYS);
    match attempts.purge_older_than(cutoff) {
        Ok(removed) => info!(logger, "purged stale login attempts"; "removed" => removed),
        Err(err) => warn!(logger, "attempt purge failed"; "error" => %err),
    }
}

fn validate_registration(username: &str, email: &str, password: &str, confirm: &str) -> Result<(), String> {
    if username.len() < 3 || username.len() > 50 {
        return Err("Username must be between 3 and 50 characters".to_string());
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("Username may only contain letters, digits and underscores".to_string());
    }
    if !is_valid_email(email) {
        return Err("Email address is not valid".to_string());
    }
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if password != confirm {
        return Err("Password confirmation does not match".to_string());
    }
    Ok(())
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}
