//! Reconnect policies, consulted by a caller-owned reconnect loop around the agent worker.
//!
//! Reconnection itself is out of scope for the dispatch core: the worker's [`Command::kind`] has
//! no "reconnect" variant, since deciding when and whether to retry is policy a caller should
//! own, not something baked into the core's loop. This module only supplies the policy type.

use std::time::Duration;

use rand::Rng;

use crate::error::ProtocolError;

/// Decides whether and how long to wait before retrying a failed connection.
pub trait ReconnectPolicy {
    /// Return the delay before the next reconnect attempt, or `None` if no further attempt
    /// should be made.
    fn next_reconnect_delay(&self, prev_attempts: u32, error: &ProtocolError) -> Option<Duration>;
}

/// Exponentially backs off between reconnect attempts, with jitter to avoid many clients
/// retrying in lockstep.
///
/// Delays range from roughly 128ms up to `max_wait`, then have up to 10% subtracted at random.
#[derive(Clone)]
pub struct ExponentialBackoffWithJitter {
    /// The longest possible time to wait between reconnect attempts.
    pub max_wait: Duration,
    /// The max number of reconnect attempts before giving up.
    pub max_reconnect_attempts: Option<u32>,
}

impl ExponentialBackoffWithJitter {
    const MIN_EXPONENT: u32 = 7;
    const BASE_DELAY_MS: u64 = 2;

    fn should_reconnect(&self, prev_attempts: u32, _error: &ProtocolError) -> bool {
        match self.max_reconnect_attempts {
            Some(max_attempts) => prev_attempts < max_attempts,
            None => true,
        }
    }

    fn calculate_delay(&self, prev_attempts: u32) -> Duration {
        // Exponent cannot be less than MIN_EXPONENT, to keep the first delay from being too short.
        let exponent = prev_attempts.saturating_add(Self::MIN_EXPONENT);
        let interval =
            Duration::from_millis(Self::BASE_DELAY_MS.saturating_pow(exponent)).min(self.max_wait);

        let jitter_multiplier = rand::thread_rng().gen_range(0.90..=1.0);
        interval.mul_f64(jitter_multiplier)
    }
}

impl Default for ExponentialBackoffWithJitter {
    /// Indefinite reconnect, with a max wait time of 60 seconds.
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(60),
            max_reconnect_attempts: None,
        }
    }
}

impl ReconnectPolicy for ExponentialBackoffWithJitter {
    fn next_reconnect_delay(&self, attempt_count: u32, error: &ProtocolError) -> Option<Duration> {
        self.should_reconnect(attempt_count, error)
            .then(|| self.calculate_delay(attempt_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backs_off_and_caps_at_max_wait() {
        let policy = ExponentialBackoffWithJitter {
            max_wait: Duration::from_millis(500),
            max_reconnect_attempts: None,
        };
        let err = ProtocolError("disconnected".to_string());
        let early = policy.next_reconnect_delay(0, &err).unwrap();
        let later = policy.next_reconnect_delay(10, &err).unwrap();
        assert!(early <= Duration::from_millis(500));
        assert!(later <= Duration::from_millis(500));
    }

    #[test]
    fn stops_after_max_attempts() {
        let policy = ExponentialBackoffWithJitter {
            max_wait: Duration::from_secs(1),
            max_reconnect_attempts: Some(3),
        };
        let err = ProtocolError("disconnected".to_string());
        assert!(policy.next_reconnect_delay(2, &err).is_some());
        assert!(policy.next_reconnect_delay(3, &err).is_none());
    }
}
