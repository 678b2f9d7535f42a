//! Configuration for the ingestion layer.
//!
//! # Environment Variables
//!
//! - `ETHVAL_FETCH_TIMEOUT_SECS`: per-attempt timeout (default: 30)
//! - `ETHVAL_FETCH_RETRIES`: attempts per fetch (default: 3)
//! - `ETHVAL_BACKOFF_MS`: base backoff between attempts (default: 2000)

use std::env;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(2000);

/// Retry and timeout policy for [`Fetcher`](crate::Fetcher).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Upper bound on a single attempt.
    pub timeout: Duration,

    /// Total attempts before giving up (at least 1 is always made).
    pub max_retries: u32,

    /// Delay unit; the sleep after attempt `n` (0-based) is `base * (n + 1)`.
    pub base_backoff: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: DEFAULT_BASE_BACKOFF,
        }
    }
}

impl FetchPolicy {
    /// Load the policy from the environment.
    ///
    /// Unset or unparseable variables keep their defaults, so a typo in an
    /// optional tuning knob never stops the job.
    pub fn from_env() -> Self {
        let mut policy = Self::default();
        if let Some(secs) = env_parse::<u64>("ETHVAL_FETCH_TIMEOUT_SECS") {
            policy.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = env_parse::<u32>("ETHVAL_FETCH_RETRIES") {
            policy.max_retries = retries;
        }
        if let Some(ms) = env_parse::<u64>("ETHVAL_BACKOFF_MS") {
            policy.base_backoff = Duration::from_millis(ms);
        }
        policy
    }

    /// Set the per-attempt timeout (builder pattern).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of attempts (builder pattern).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base backoff (builder pattern).
    pub fn with_base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    /// Attempts actually made: `max_retries`, but never zero.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Sleep before retrying after the 0-based `attempt` failed.
    #[inline]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(attempt.saturating_add(1))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("ignoring unparseable {}={:?}", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = FetchPolicy::default();
        assert_eq!(policy.timeout, Duration::from_secs(30));
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_backoff, Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_is_linear() {
        let policy = FetchPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(2));
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
        assert_eq!(policy.backoff(2), Duration::from_secs(6));
    }

    #[test]
    fn test_at_least_one_attempt() {
        let policy = FetchPolicy::default().with_max_retries(0);
        assert_eq!(policy.attempts(), 1);
    }
}
