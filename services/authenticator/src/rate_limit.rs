//! Sliding-window login rate limiter (spec §4.4 "Rate limiter"). Counts
//! failed attempts per source address; fail-open if the attempt store
//! is unreachable, since denying every login on a storage blip is judged
//! worse than a transient widening of the attack surface.

use crate::attempt::AttemptStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use slog::{warn, Logger};
use std::net::IpAddr;
use std::sync::Arc;

/// Default sliding window (spec §6): 60 minutes.
pub const DEFAULT_WINDOW_MINUTES: i64 = 60;
/// Default failure threshold before a source is rate-limited (spec §6).
pub const DEFAULT_THRESHOLD: usize = 5;

pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after_seconds: i64 },
}

pub struct RateLimiter {
    attempts: Arc<dyn AttemptStore>,
    window: ChronoDuration,
    threshold: usize,
    logger: Logger,
}

impl RateLimiter {
    pub fn new(attempts: Arc<dyn AttemptStore>, logger: Logger) -> RateLimiter {
        RateLimiter {
            attempts,
            window: ChronoDuration::minutes(DEFAULT_WINDOW_MINUTES),
            threshold: DEFAULT_THRESHOLD,
            logger,
        }
    }

    pub fn check(&self, source: IpAddr) -> RateLimitDecision {
        let since: DateTime<Utc> = Utc::now() - self.window;

        let failures = match self.attempts.failures_since(source, since) {
            Ok(failures) => failures,
            Err(err) => {
                warn!(self.logger, "rate limiter store unreachable, failing open"; "error" => %err);
                return RateLimitDecision::Allowed;
            }
        };

        if failures.len() < self.threshold {
            return RateLimitDecision::Allowed;
        }

        let oldest = failures[0];
        let window_expires_at = oldest + self.window;
        let retry_after_seconds = (window_expires_at - Utc::now()).num_seconds().max(0);
        RateLimitDecision::Limited { retry_after_seconds }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::InMemoryAttemptStore;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    #[test]
    fn allows_until_threshold_then_limits() {
        let store = Arc::new(InMemoryAttemptStore::new());
        let limiter = RateLimiter::new(store.clone(), flux::logging::discard());

        for _ in 0..DEFAULT_THRESHOLD - 1 {
            store.record(addr(), "alice".into(), false).unwrap();
        }
        assert!(matches!(limiter.check(addr()), RateLimitDecision::Allowed));

        store.record(addr(), "alice".into(), false).unwrap();
        assert!(matches!(limiter.check(addr()), RateLimitDecision::Limited { .. }));
    }

    #[test]
    fn successful_login_does_not_count_against_window() {
        let store = Arc::new(InMemoryAttemptStore::new());
        let limiter = RateLimiter::new(store.clone(), flux::logging::discard());

        for _ in 0..DEFAULT_THRESHOLD {
            store.record(addr(), "alice".into(), true).unwrap();
        }
        assert!(matches!(limiter.check(addr()), RateLimitDecision::Allowed));
    }
}
