//! Backoff schedule for read reconciliation.
//!
//! Delays double after every failed attempt and are clamped to a cap. A kind
//! may also ask for a one-time settle delay before its very first read, giving
//! the proxy's backing store a moment after a write.
//!
//! ```
//! use litesync::{Backoff, RetryPolicy};
//! use std::time::Duration;
//!
//! let model = RetryPolicy::model();
//! assert_eq!(model.attempts, 8);
//! assert_eq!(model.backoff.settle, Some(Duration::from_millis(200)));
//!
//! let credential = RetryPolicy::credential();
//! assert_eq!(
//!     credential.backoff.schedule(credential.attempts),
//!     vec![
//!         Duration::from_secs(1),
//!         Duration::from_secs(2),
//!         Duration::from_secs(4),
//!         Duration::from_secs(8),
//!     ]
//! );
//! ```

use std::time::Duration;

/// Exponential delay between read attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub cap: Duration,
    /// Waited once before the first attempt.
    pub settle: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, cap: Duration) -> Self {
        Self {
            initial,
            cap,
            settle: None,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = Some(settle);
        self
    }

    /// Delay before the second attempt.
    pub fn initial(&self) -> Duration {
        self.initial.min(self.cap)
    }

    /// Delay following `current`: doubled, clamped to the cap.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.cap)
    }

    /// Every sleep a reconciliation with `attempts` attempts may take.
    /// There is no sleep after the final attempt.
    pub fn schedule(&self, attempts: u32) -> Vec<Duration> {
        let sleeps = attempts.max(1) - 1;
        let mut delays = Vec::with_capacity(sleeps as usize);
        let mut delay = self.initial();
        for _ in 0..sleeps {
            delays.push(delay);
            delay = self.next_delay(delay);
        }
        delays
    }

    /// Upper bound on the time spent waiting, settle delay included.
    pub fn worst_case(&self, attempts: u32) -> Duration {
        self.schedule(attempts)
            .into_iter()
            .fold(self.settle.unwrap_or_default(), |acc, d| acc + d)
    }
}

/// Attempt budget plus backoff for one resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum read attempts per reconciliation. Zero behaves as one.
    pub attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Backoff) -> Self {
        Self { attempts, backoff }
    }

    /// Credentials: 5 attempts, 1s doubling to 10s.
    #[must_use]
    pub fn credential() -> Self {
        Self {
            attempts: 5,
            backoff: Backoff::new(Duration::from_secs(1), Duration::from_secs(10)),
        }
    }

    /// Models: 200ms settle, then 8 attempts, 500ms doubling to 10s.
    #[must_use]
    pub fn model() -> Self {
        Self {
            attempts: 8,
            backoff: Backoff::new(Duration::from_millis(500), Duration::from_secs(10))
                .with_settle(Duration::from_millis(200)),
        }
    }

    /// Budget with the attempts-at-least-one rule applied.
    pub fn budget(&self) -> u32 {
        self.attempts.max(1)
    }
}
