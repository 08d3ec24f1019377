//! Reconnect backoff policy.

use std::time::Duration;

/// Exponential backoff: zero before the first failure, then the initial
/// delay doubling up to the cap. Reset after any successful connection.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    delay: Duration,
    initial: Duration,
    max: Duration,
}

impl Backoff {
    pub(crate) fn new(initial: Duration, max: Duration) -> Self {
        Self {
            delay: Duration::ZERO,
            initial,
            max,
        }
    }

    /// Delay to wait before the next attempt.
    pub(crate) fn delay(&self) -> Duration {
        self.delay
    }

    /// Record a failure and advance the delay.
    pub(crate) fn advance(&mut self) {
        self.delay = if self.delay.is_zero() {
            self.initial
        } else {
            self.max.min(self.delay * 2)
        };
    }

    /// Record a success; the next failure starts over from the initial
    /// delay.
    pub(crate) fn reset(&mut self) {
        self.delay = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_initial_up_to_the_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(64));
        let mut observed = Vec::new();
        for _ in 0..10 {
            observed.push(backoff.delay().as_millis());
            backoff.advance();
        }
        assert_eq!(
            observed,
            [0, 500, 1000, 2000, 4000, 8000, 16000, 32000, 64000, 64000]
        );
    }

    #[test]
    fn reset_starts_the_sequence_over() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(64));
        backoff.advance();
        backoff.advance();
        assert_eq!(backoff.delay(), Duration::from_millis(1000));
        backoff.reset();
        assert_eq!(backoff.delay(), Duration::ZERO);
        backoff.advance();
        assert_eq!(backoff.delay(), Duration::from_millis(500));
    }
}
