use crate::error::ServiceResult;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Exponential backoff applied uniformly around every remote call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let micros = rand::thread_rng().gen_range(0..self.max_jitter.as_micros() as u64);
        Duration::from_micros(micros)
    }
}

/// Invoke `op` until it succeeds, fails with a non-transient error, or the
/// attempt budget is exhausted. The delay doubles after each transient
/// failure, with a small random jitter on top.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> ServiceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
{
    let mut delay = policy.base_delay;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let sleep_for = delay + policy.jitter();
                warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {:.2}s",
                    label,
                    attempt,
                    policy.max_attempts,
                    err,
                    sleep_for.as_secs_f64()
                );
                tokio::time::sleep(sleep_for).await;
                delay *= 2;
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    error!("{}: giving up after {} attempts: {}", label, attempt, err);
                } else {
                    error!("{}: non-retryable failure on attempt {}: {}", label, attempt, err);
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::ZERO,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_k_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = retry(fast_policy(), "test", move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= 3 {
                    Err(ServiceError::Transient("flaky".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_uses_all_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: ServiceResult<()> = retry(fast_policy(), "test", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::Transient("still down".into()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_failure_propagates_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: ServiceResult<()> = retry(fast_policy(), "test", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::Auth("revoked".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(ServiceError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delays_double_between_attempts() {
        let times = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = Arc::clone(&times);
        let _: ServiceResult<()> = retry(fast_policy(), "test", move || {
            let recorder = Arc::clone(&recorder);
            async move {
                recorder.lock().unwrap().push(Instant::now());
                Err(ServiceError::Transient("flaky".into()))
            }
        })
        .await;

        let times = times.lock().unwrap();
        assert_eq!(times.len(), 5);
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        for pair in gaps.windows(2) {
            assert!(pair[1] >= pair[0], "delays must be non-decreasing");
            // Doubling, allowing for scheduler slop under the paused clock.
            let ratio = pair[1].as_secs_f64() / pair[0].as_secs_f64();
            assert!(ratio > 1.5 && ratio < 2.5, "ratio was {}", ratio);
        }
    }
}
