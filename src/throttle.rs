//! Login attempt throttling.
//!
//! Tracks consecutive failures per submitted identity and enforces an
//! increasing delay before the next attempt may run. The delay is keyed on
//! whatever identity the caller submitted, whether or not it exists, so the
//! throttle cannot be used to probe for accounts.
//!
//! State is in-memory and best-effort; it complements, never replaces,
//! rate limiting at the network layer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const DEFAULT_STEPS_SECONDS: [u64; 4] = [1, 5, 10, 25];
const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);
const MAX_EXPONENT: u32 = 32;

/// Delay curve applied after consecutive failures.
///
/// Monotonically non-decreasing in the failure count by construction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffCurve {
    /// Fixed steps in seconds; the last step repeats for further failures.
    Stepped { seconds: Vec<u64> },
    /// `base * 2^(n-1)` seconds after `n` failures, capped.
    Exponential { base_seconds: u64, cap_seconds: u64 },
    /// No delay is ever enforced.
    Disabled,
}

impl Default for BackoffCurve {
    fn default() -> Self {
        Self::Stepped {
            seconds: DEFAULT_STEPS_SECONDS.to_vec(),
        }
    }
}

impl BackoffCurve {
    /// Delay enforced after `failures` consecutive failures.
    #[must_use]
    pub fn delay_after(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        match self {
            Self::Stepped { seconds } => {
                let index = usize::try_from(failures - 1)
                    .unwrap_or(usize::MAX)
                    .min(seconds.len().saturating_sub(1));
                seconds
                    .get(index)
                    .copied()
                    .map_or(Duration::ZERO, Duration::from_secs)
            }
            Self::Exponential {
                base_seconds,
                cap_seconds,
            } => {
                let exponent = (failures - 1).min(MAX_EXPONENT);
                let raw = base_seconds.saturating_mul(1_u64 << exponent);
                Duration::from_secs(raw.min(*cap_seconds))
            }
            Self::Disabled => Duration::ZERO,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct AttemptState {
    failures: u32,
    last_attempt: Instant,
}

/// Per-identity failure tracking with a configurable backoff curve.
pub struct Throttler {
    curve: BackoffCurve,
    retention: Duration,
    attempts: Mutex<HashMap<String, AttemptState>>,
}

impl Throttler {
    #[must_use]
    pub fn new(curve: BackoffCurve) -> Self {
        Self {
            curve,
            retention: DEFAULT_RETENTION,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Drop identities whose last attempt is older than `retention`,
    /// bounding the map for long-lived processes.
    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Record the outcome of a finished attempt and return the delay now in
    /// force. Success resets the identity's counter.
    pub async fn record_attempt(&self, identity: &str, succeeded: bool) -> Duration {
        let mut attempts = self.attempts.lock().await;
        let now = Instant::now();
        let retention = self.retention;
        attempts.retain(|_, state| now.duration_since(state.last_attempt) < retention);

        if succeeded {
            attempts.remove(identity);
            return Duration::ZERO;
        }

        let state = attempts
            .entry(identity.to_string())
            .or_insert(AttemptState {
                failures: 0,
                last_attempt: now,
            });
        state.failures = state.failures.saturating_add(1);
        state.last_attempt = now;
        self.curve.delay_after(state.failures)
    }

    /// Remaining enforced delay for `identity`; zero once the window has
    /// elapsed. Pure read, safe to poll for a client-facing countdown.
    pub async fn delay_for(&self, identity: &str) -> Duration {
        let attempts = self.attempts.lock().await;
        let Some(state) = attempts.get(identity) else {
            return Duration::ZERO;
        };
        self.curve
            .delay_after(state.failures)
            .saturating_sub(state.last_attempt.elapsed())
    }

    /// Consecutive failures currently recorded for `identity`.
    pub async fn failures(&self, identity: &str) -> u32 {
        let attempts = self.attempts.lock().await;
        attempts.get(identity).map_or(0, |state| state.failures)
    }
}
