//! Retry and model-failover engine shared by all providers
//!
//! Throttling and transport failures are retried with capped exponential
//! backoff and jitter, first against the primary model, then against the
//! configured secondary. Everything else propagates on the first
//! occurrence. Backoff sleeps block only the calling task; dropping the
//! future cancels any pending sleep or in-flight vendor call.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use strata_config::RetryConfig;

use crate::error::GatewayError;

/// Jitter band applied multiplicatively to each backoff delay
const JITTER_MIN: f64 = 0.75;
const JITTER_MAX: f64 = 1.25;

/// Backoff and retry tuning, shared across providers
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries per model after the initial attempt
    pub max_retries: u32,
    /// Base delay, doubled per attempt
    pub base_delay: Duration,
    /// Delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Build a policy from validated configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Backoff delay before retrying attempt `attempt`
    ///
    /// `min(base * 2^attempt, cap)` with ±25% multiplicative jitter so
    /// concurrent callers do not retry in lockstep.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let doubled = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        let capped = doubled.min(self.max_delay);
        capped.mul_f64(rand::rng().random_range(JITTER_MIN..=JITTER_MAX))
    }

    /// Run `op` under this policy, falling over from primary to secondary model
    ///
    /// `op` is invoked with `(model, attempt)` and must perform exactly one
    /// vendor call. Non-retryable errors propagate immediately; retryable
    /// ones sleep and retry up to `max_retries` per model before moving to
    /// the secondary. When every attempt is exhausted the last error
    /// propagates.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last retryable error
    /// once all attempts and the fallback model are exhausted.
    pub async fn run<T, F, Fut>(&self, attempts: &ModelAttempts, mut op: F) -> Result<T, GatewayError>
    where
        F: FnMut(String, u32) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut last_error = None;

        for model in attempts.models() {
            for attempt in 0..=self.max_retries {
                match op(model.to_owned(), attempt).await {
                    Ok(value) => return Ok(value),
                    Err(error) if !error.is_retryable() => return Err(error),
                    Err(error) => {
                        if attempt == self.max_retries {
                            tracing::warn!(model, error = %error, "retries exhausted for model");
                            last_error = Some(error);
                            break;
                        }
                        let delay = self.delay_for(attempt);
                        tracing::debug!(
                            model,
                            attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %error,
                            "transient provider error, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| GatewayError::Internal(anyhow::anyhow!("retry engine ran zero attempts"))))
    }
}

/// Primary model plus optional secondary for failover
#[derive(Debug, Clone)]
pub struct ModelAttempts {
    primary: String,
    secondary: Option<String>,
}

impl ModelAttempts {
    /// Create an attempt plan; a secondary equal to the primary is discarded
    pub fn new(primary: impl Into<String>, secondary: Option<String>) -> Self {
        let primary = primary.into();
        let secondary = secondary.filter(|model| *model != primary);
        Self { primary, secondary }
    }

    /// Models to try, in order
    pub fn models(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.secondary.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(80),
        }
    }

    #[test]
    fn backoff_stays_within_jitter_band() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        };

        for attempt in 0..8 {
            let expected = Duration::from_millis(100)
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(Duration::from_secs(2));
            for _ in 0..50 {
                let delay = policy.delay_for(attempt);
                assert!(delay >= expected.mul_f64(0.75), "attempt {attempt}: {delay:?} too short");
                assert!(delay <= expected.mul_f64(1.25), "attempt {attempt}: {delay:?} too long");
            }
        }
    }

    #[test]
    fn duplicate_secondary_is_discarded() {
        let attempts = ModelAttempts::new("model-a", Some("model-a".to_owned()));
        assert_eq!(attempts.models().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_attempts_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = fast_policy()
            .run(&ModelAttempts::new("model-a", Some("model-b".to_owned())), |_, _| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(GatewayError::Validation("bad schema".to_owned()))
                }
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn throttling_retries_then_falls_over() {
        let policy = fast_policy();
        let primary_calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&primary_calls);

        let result = policy
            .run(&ModelAttempts::new("model-a", Some("model-b".to_owned())), |model, _| {
                let counter = Arc::clone(&counter);
                async move {
                    if model == "model-a" {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(GatewayError::Throttled("too many requests".to_owned()))
                    } else {
                        Ok(model)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "model-b");
        // max_retries + 1 attempts against the primary before failover
        assert_eq!(primary_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_propagates_last_error() {
        let result: Result<(), _> = fast_policy()
            .run(&ModelAttempts::new("model-a", None), |_, _| async {
                Err(GatewayError::Throttled("rate exceeded".to_owned()))
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Throttled(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_transient_errors() {
        let policy = fast_policy();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = policy
            .run(&ModelAttempts::new("model-a", None), |model, _| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(GatewayError::Unavailable("connection reset".to_owned()))
                    } else {
                        Ok(model)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "model-a");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
