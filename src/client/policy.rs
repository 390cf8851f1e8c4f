use std::time::Duration;

use crate::client::options::CallOptions;

/// Internal decision for how to proceed after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Retry { delay: Duration },
    Fail,
}

/// Retry schedule of one call.
///
/// Important constraints:
/// - Only transient failures are ever retried.
/// - The delay schedule is indexed by attempt and its last entry repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub retry_count: u32,
    pub delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(retry_count: u32, delays: Vec<Duration>) -> Self {
        Self {
            retry_count,
            delays,
        }
    }

    pub fn from_options(options: &CallOptions) -> Self {
        Self::new(options.retry_count, options.retry_delays.clone())
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// Wait before the retry that follows failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.delays.is_empty() {
            return Duration::ZERO;
        }
        let idx = (attempt as usize).min(self.delays.len() - 1);
        self.delays[idx]
    }

    /// Decide what to do next after an attempt failed.
    ///
    /// - `attempt` is 0-based (first failure => attempt=0).
    pub fn decide(&self, attempt: u32, transient: bool) -> Decision {
        if !transient || attempt + 1 >= self.max_attempts() {
            return Decision::Fail;
        }
        Decision::Retry {
            delay: self.delay_for(attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_last_delay_repeats() {
        let policy = RetryPolicy::new(5, vec![ms(100), ms(1000), ms(3000)]);
        let delays: Vec<_> = (0..5).map(|a| policy.delay_for(a)).collect();
        assert_eq!(delays, vec![ms(100), ms(1000), ms(3000), ms(3000), ms(3000)]);
    }

    #[test]
    fn test_empty_schedule_means_no_wait() {
        let policy = RetryPolicy::new(2, vec![]);
        assert_eq!(policy.decide(0, true), Decision::Retry { delay: Duration::ZERO });
    }

    #[test]
    fn test_permanent_failures_and_exhaustion_fail() {
        let policy = RetryPolicy::new(1, vec![ms(10)]);
        assert_eq!(policy.decide(0, false), Decision::Fail);
        assert_eq!(policy.decide(0, true), Decision::Retry { delay: ms(10) });
        assert_eq!(policy.decide(1, true), Decision::Fail);
    }

    #[test]
    fn test_zero_retries_is_a_single_attempt() {
        let policy = RetryPolicy::new(0, vec![ms(10)]);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.decide(0, true), Decision::Fail);
    }
}
