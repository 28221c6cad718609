use std::time::Duration;

/// How long to wait before asking the accrual service again after a failed or throttled lookup.
///
/// Attempts are counted from 1. The delay for attempt `n` is `initial * multiplier^(n-1)`, capped at `cap`. A
/// multiplier of 1.0 gives a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub multiplier: f64,
    pub cap: Duration,
    /// The number of consecutive retries allowed. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl BackoffPolicy {
    /// The same delay every time, with no limit on the number of retries.
    pub fn fixed(delay: Duration) -> Self {
        Self { initial: delay, multiplier: 1.0, cap: delay, max_attempts: None }
    }

    pub fn exponential(initial: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self { initial, multiplier: 2.0, cap, max_attempts: Some(max_attempts) }
    }

    /// One second between throttled lookups, for as long as the service keeps throttling.
    pub fn default_rate_limit() -> Self {
        Self { cap: Duration::from_secs(60), ..Self::fixed(Duration::from_secs(1)) }
    }

    /// Three retries, starting at half a second and doubling.
    pub fn default_transport() -> Self {
        Self::exponential(Duration::from_millis(500), Duration::from_secs(30), 3)
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let secs = self.initial.as_secs_f64() * factor;
        Duration::try_from_secs_f64(secs).map(|d| d.min(self.cap)).unwrap_or(self.cap)
    }

    /// The delay for `attempt`, unless the server said how long to wait. The server's hint still respects the cap.
    pub fn delay_with_hint(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        match hint {
            Some(hint) => hint.min(self.cap),
            None => self.delay(attempt),
        }
    }

    /// True once `attempt` consecutive failures have used up the retry allowance.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt > max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::default_rate_limit()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fixed_delay_never_gives_up() {
        let policy = BackoffPolicy::default_rate_limit();
        for attempt in [1, 2, 10, 10_000] {
            assert_eq!(policy.delay(attempt), Duration::from_secs(1));
            assert!(!policy.is_exhausted(attempt));
        }
    }

    #[test]
    fn exponential_delay_is_capped() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_millis(700), 5);
        let delays: Vec<_> = (1..=5).map(|n| policy.delay(n).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 700, 700]);
        assert_eq!(policy.delay(u32::MAX), Duration::from_millis(700));
        assert_eq!(policy.delay(0), Duration::ZERO);
    }

    #[test]
    fn exhaustion() {
        let policy = BackoffPolicy::default_transport();
        assert!(!policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
        let policy = BackoffPolicy::fixed(Duration::from_millis(10)).with_max_attempts(Some(0));
        assert!(policy.is_exhausted(1));
    }

    #[test]
    fn retry_after_hint_wins_but_is_capped() {
        let policy = BackoffPolicy::default_rate_limit();
        assert_eq!(policy.delay_with_hint(1, Some(Duration::from_secs(3))), Duration::from_secs(3));
        assert_eq!(policy.delay_with_hint(1, Some(Duration::from_secs(3600))), Duration::from_secs(60));
        assert_eq!(policy.delay_with_hint(1, None), Duration::from_secs(1));
    }
}
