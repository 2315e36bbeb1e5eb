//! Retry delays

use rand::Rng;
use rollout_types::{BackoffPolicy, JitterMode};
use std::time::Duration;

/// Delay before retry number `retry` (0-based), jitter applied
pub fn delay_for(policy: &BackoffPolicy, retry: u32) -> Duration {
    let delay = policy.delay(retry);
    match policy.jitter {
        JitterMode::None => delay,
        JitterMode::Full => jitter_between(Duration::ZERO, delay),
    }
}

fn jitter_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let mut rng = rand::thread_rng();
    let min_secs = min.as_secs_f64();
    let span = max.as_secs_f64() - min_secs;
    Duration::from_secs_f64(rng.gen::<f64>() * span + min_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_jitter_stays_in_range() {
        let policy = BackoffPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: JitterMode::Full,
        };
        for retry in 0..8 {
            let delay = delay_for(&policy, retry);
            assert!(delay <= policy.delay(retry));
        }
    }

    #[test]
    fn test_no_jitter_is_deterministic() {
        let policy = BackoffPolicy::default();
        assert_eq!(delay_for(&policy, 2), policy.delay(2));
    }
}
