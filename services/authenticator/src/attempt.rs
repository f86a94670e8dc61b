//! Append-only login attempt log (spec §3 "Account / LoginAttempt"),
//! consumed by the rate limiter. Same trait-seam rationale as
//! `account::AccountStore`.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("attempt store unavailable")]
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub source: IpAddr,
    pub username: String,
    pub success: bool,
    pub at: DateTime<Utc>,
}

pub trait AttemptStore: Send + Sync {
    fn record(&self, source: IpAddr, username: String, success: bool) -> Result<(), StoreError>;

    /// Timestamps of failed attempts from `source` at or after `since`,
    /// oldest first.
    fn failures_since(&self, source: IpAddr, since: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>, StoreError>;

    /// Purge attempt records older than `cutoff`, returning the count
    /// removed (spec §4.4 "periodic background task ... purges attempt
    /// records older than 7 days").
    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}

#[derive(Default)]
pub struct InMemoryAttemptStore {
    attempts: Mutex<HashMap<IpAddr, Vec<LoginAttempt>>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> InMemoryAttemptStore {
        InMemoryAttemptStore::default()
    }
}

impl AttemptStore for InMemoryAttemptStore {
    fn record(&self, source: IpAddr, username: String, success: bool) -> Result<(), StoreError> {
        let mut attempts = self.attempts.lock().map_err(|_| StoreError::Unavailable)?;
        attempts.entry(source).or_default().push(LoginAttempt {
            source,
            username,
            success,
            at: Utc::now(),
        });
        Ok(())
    }

    fn failures_since(&self, source: IpAddr, since: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>, StoreError> {
        let attempts = self.attempts.lock().map_err(|_| StoreError::Unavailable)?;
        let mut failures: Vec<DateTime<Utc>> = attempts
            .get(&source)
            .into_iter()
            .flatten()
            .filter(|a| !a.success && a.at >= since)
            .map(|a| a.at)
            .collect();
        failures.sort();
        Ok(failures)
    }

    fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut attempts = self.attempts.lock().map_err(|_| StoreError::Unavailable)?;
        let mut removed = 0;
        for bucket in attempts.values_mut() {
            let before = bucket.len();
            bucket.retain(|a| a.at >= cutoff);
            removed += before - bucket.len();
        }
        Ok(removed)
    }
}
