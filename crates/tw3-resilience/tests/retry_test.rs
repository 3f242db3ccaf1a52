use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tw3_resilience::{ResilienceError, RetryConfig, RetryPolicy};

#[derive(Debug, Clone, PartialEq)]
struct FetchError {
    attempt: u32,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fetch failed on attempt {}", self.attempt)
    }
}

fn policy() -> RetryPolicy {
    RetryPolicy::new(
        "news_fetch",
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            exponential_base: 2.0,
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_retry_succeeds_after_two_failures() {
    let attempts = AtomicU32::new(0);
    let started = Instant::now();

    let result = policy()
        .execute(|| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(ResilienceError::Operation(FetchError { attempt }))
                } else {
                    Ok("headlines")
                }
            }
        })
        .await;

    assert_eq!(result, Ok("headlines"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    // 1s after the first failure, 2s after the second
    assert_eq!(started.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_retry_returns_last_error() {
    let attempts = AtomicU32::new(0);

    let result: Result<(), _> = policy()
        .execute(|| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(ResilienceError::Operation(FetchError { attempt })) }
        })
        .await;

    assert_eq!(
        result,
        Err(ResilienceError::Operation(FetchError { attempt: 3 })),
        "Caller should receive the exact error of the final attempt"
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_first_success_short_circuits() {
    let attempts = AtomicU32::new(0);
    let started = Instant::now();

    let result = policy()
        .execute(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ResilienceError<FetchError>>(42) }
        })
        .await;

    assert_eq!(result, Ok(42));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_delay_is_capped_by_max_delay() {
    let policy = RetryPolicy::new(
        "capped",
        RetryConfig {
            max_attempts: 4,
            base_delay_ms: 1_000,
            max_delay_ms: 1_500,
            exponential_base: 3.0,
        },
    );
    let started = Instant::now();

    let result: Result<(), _> = policy
        .execute(|| async { Err(ResilienceError::Operation(FetchError { attempt: 0 })) })
        .await;

    assert!(result.is_err());
    // 1s, then 1.5s twice (3s and 9s capped)
    assert_eq!(started.elapsed(), Duration::from_millis(4_000));
}
