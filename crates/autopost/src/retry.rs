//! Bounded retry policy shared by the publish protocol and provider fallback.

use std::time::Duration;

/// How the delay between attempts behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    /// The same delay before every attempt after the first.
    Fixed,
    /// No delay at all.
    None,
}

/// Bounded attempts with a constant delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Delay applied by [`BackoffKind::Fixed`].
    pub delay: Duration,
    /// Delay behaviour.
    pub backoff: BackoffKind,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

impl RetryPolicy {
    /// Create a fixed-delay policy.
    #[must_use]
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: BackoffKind::Fixed,
        }
    }

    /// Retry immediately without sleeping.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
            backoff: BackoffKind::None,
        }
    }

    /// A single attempt.
    #[must_use]
    pub const fn once() -> Self {
        Self::immediate(1)
    }

    /// Status polling: 10 reads, 5 seconds apart.
    #[must_use]
    pub const fn polling() -> Self {
        Self::fixed(10, Duration::from_secs(5))
    }

    /// Primary image provider: exactly one retry after 3 seconds.
    #[must_use]
    pub const fn image_primary() -> Self {
        Self::fixed(2, Duration::from_secs(3))
    }

    /// The effective per-step delay.
    #[must_use]
    pub fn step(&self) -> Duration {
        match self.backoff {
            BackoffKind::Fixed => self.delay,
            BackoffKind::None => Duration::ZERO,
        }
    }

    /// Delay to wait before a retry. `attempt` is 1-based; the first attempt
    /// never waits.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            self.step()
        }
    }

    /// Whether another attempt is allowed after `attempts_made`.
    #[must_use]
    pub fn can_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Worst-case time spent sleeping when every step waits.
    #[must_use]
    /// Saturates at [`Duration::MAX`].
    #[must_use]
    pub fn total_wait(&self) -> Duration {
        self.step()
            .checked_mul(self.max_attempts)
            .unwrap_or(Duration::MAX)
    }

    /// Shrink the delay and then the attempt count so that `total_wait`
    /// stays within `limit`.
    #[must_use]
    pub fn capped(mut self, limit: Duration) -> Self {
        if self.step().is_zero() || self.total_wait() <= limit {
            return self;
        }
        self.delay = self.delay.min(limit);
        let allowed = (limit.as_nanos() / self.step().as_nanos()).max(1);
        self.max_attempts = u32::try_from(allowed).unwrap_or(u32::MAX).min(self.max_attempts);
        self
    }
}
