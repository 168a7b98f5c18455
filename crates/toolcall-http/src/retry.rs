//! Reconnect policy for the event stream.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy for auto-reconnect
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Fixed interval between retries
    Fixed {
        /// Time interval between retry attempts
        interval: Duration,
        /// Maximum number of retry attempts (None for unlimited)
        max_attempts: Option<u32>,
    },
    /// Exponential backoff
    Exponential {
        /// Base delay for exponential backoff calculation
        base: Duration,
        /// Maximum delay between retry attempts
        max_delay: Duration,
        /// Maximum number of retry attempts (None for unlimited)
        max_attempts: Option<u32>,
    },
    /// Never retry
    Never,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), or `None` to give up.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::Fixed {
                interval,
                max_attempts,
            } => {
                if let Some(max) = max_attempts
                    && attempt >= *max
                {
                    return None;
                }
                Some(*interval)
            }
            Self::Exponential {
                base,
                max_delay,
                max_attempts,
            } => {
                if let Some(max) = max_attempts
                    && attempt >= *max
                {
                    return None;
                }
                let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
                let base_delay = (base.as_millis() as u64).saturating_mul(factor);
                let max_delay_ms = max_delay.as_millis() as u64;
                let capped = base_delay.min(max_delay_ms);
                // ±25% jitter
                let jitter_range = capped / 4;
                let jitter_offset = if jitter_range > 0 {
                    // deterministic per attempt number
                    let hash = u64::from(attempt)
                        .wrapping_mul(6364136223846793005)
                        .wrapping_add(1442695040888963407);
                    hash % (jitter_range * 2)
                } else {
                    0
                };
                let final_delay = capped
                    .saturating_sub(jitter_range)
                    .saturating_add(jitter_offset);
                Some(Duration::from_millis(final_delay))
            }
            Self::Never => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_fixed() {
        let policy = RetryPolicy::Fixed {
            interval: Duration::from_secs(5),
            max_attempts: Some(3),
        };

        assert_eq!(policy.delay(0), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay(1), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay(2), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay(3), None);
    }

    #[test]
    fn test_retry_policy_exponential() {
        let policy = RetryPolicy::Exponential {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: None,
        };

        // Expected base delays: 1s, 2s, 4s, 8s, etc. with ±25% jitter
        let delay0 = policy.delay(0).unwrap();
        assert!(delay0 >= Duration::from_millis(750) && delay0 <= Duration::from_millis(1250));

        let delay1 = policy.delay(1).unwrap();
        assert!(delay1 >= Duration::from_millis(1500) && delay1 <= Duration::from_millis(2500));

        let delay3 = policy.delay(3).unwrap();
        assert!(delay3 >= Duration::from_millis(6000) && delay3 <= Duration::from_millis(10000));

        let delay10 = policy.delay(10).unwrap();
        assert!(delay10 >= Duration::from_millis(45000) && delay10 <= Duration::from_millis(75000));
    }

    #[test]
    fn test_default_policy_never_gives_up() {
        let policy = RetryPolicy::default();
        let late = policy.delay(u32::MAX).unwrap();
        assert!(late <= Duration::from_millis(37_500));
    }

    #[test]
    fn test_never() {
        assert_eq!(RetryPolicy::Never.delay(0), None);
    }

    #[test]
    fn test_policy_from_json() {
        let policy: RetryPolicy = serde_json::from_str(
            r#"{"kind":"fixed","interval":{"secs":2,"nanos":0},"max_attempts":null}"#,
        )
        .unwrap();
        assert_eq!(policy.delay(100), Some(Duration::from_secs(2)));
    }
}
