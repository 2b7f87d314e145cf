use crate::errors::AdapterError;
use rand::Rng;
use tokio::time::Duration;

/// Retry policy for transient adapter failures. All retry behavior lives
/// here; adapters never retry internally.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_millis(500),
            cap: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Transient errors are retried; permanent ones never are. Provider
    /// faults count as transient only for 5xx-equivalent statuses.
    pub fn is_transient(err: &AdapterError) -> bool {
        match err {
            AdapterError::RateLimit(_)
            | AdapterError::Network(_)
            | AdapterError::Timeout { .. } => true,
            AdapterError::Provider { status, .. } => *status >= 500,
            AdapterError::Auth(_) => false,
        }
    }

    /// `min(cap, base * 2^attempt)` plus jitter drawn uniformly from
    /// `[0, delay/2]`; `attempt` starts at 0 for the first retry.
    pub fn backoff(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let exp = self.base.saturating_mul(1u32 << attempt.min(16));
        let delay = exp.min(self.cap);
        let jitter = rng.gen_range(0..=delay.as_nanos() as u64 / 2);
        delay + Duration::from_nanos(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn transient_classification_matches_taxonomy() {
        assert!(RetryPolicy::is_transient(&AdapterError::RateLimit(
            "429".into()
        )));
        assert!(RetryPolicy::is_transient(&AdapterError::Network(
            "reset".into()
        )));
        assert!(RetryPolicy::is_transient(&AdapterError::Timeout {
            elapsed_ms: 10
        }));
        assert!(RetryPolicy::is_transient(&AdapterError::Provider {
            status: 503,
            message: "overloaded".into()
        }));

        assert!(!RetryPolicy::is_transient(&AdapterError::Auth(
            "bad key".into()
        )));
        assert!(!RetryPolicy::is_transient(&AdapterError::Provider {
            status: 400,
            message: "invalid request".into()
        }));
        assert!(!RetryPolicy::is_transient(&AdapterError::Provider {
            status: 404,
            message: "no such model".into()
        }));
    }

    #[test]
    fn backoff_stays_within_jitter_envelope() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 0..6 {
            let floor = policy
                .base
                .saturating_mul(1 << attempt)
                .min(policy.cap);
            let ceiling = floor + floor / 2;
            for _ in 0..50 {
                let d = policy.backoff(attempt, &mut rng);
                assert!(d >= floor, "attempt {}: {:?} < {:?}", attempt, d, floor);
                assert!(d <= ceiling, "attempt {}: {:?} > {:?}", attempt, d, ceiling);
            }
        }
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(4),
        };
        let mut rng = StdRng::seed_from_u64(1);
        let d = policy.backoff(9, &mut rng);
        assert!(d <= Duration::from_secs(6)); // cap + cap/2
    }
}
