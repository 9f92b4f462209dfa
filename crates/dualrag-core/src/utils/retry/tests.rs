use super::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn fast(attempts: u32) -> RetryConfig {
    RetryConfig::new()
        .with_max_attempts(attempts)
        .with_initial_delay(Duration::from_millis(1))
        .with_jitter(false)
}

#[test]
fn test_builder() {
    let config = RetryConfig::new()
        .with_max_attempts(5)
        .with_initial_delay(Duration::from_millis(50))
        .with_max_delay(Duration::from_secs(1))
        .with_backoff_multiplier(3.0)
        .with_jitter(false);

    assert_eq!(config.max_attempts, 5);
    assert_eq!(config.initial_delay, Duration::from_millis(50));
    assert_eq!(config.max_delay, Duration::from_secs(1));
    assert_eq!(config.backoff_multiplier, 3.0);
    assert!(!config.jitter);
    assert_eq!(RetryConfig::no_retry().max_attempts, 1);
}

#[test]
fn test_delay_grows_and_caps() {
    let config = RetryConfig::new()
        .with_initial_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_millis(300))
        .with_jitter(false);

    assert_eq!(config.delay_for(1), Duration::from_millis(100));
    assert_eq!(config.delay_for(2), Duration::from_millis(200));
    assert_eq!(config.delay_for(3), Duration::from_millis(300));
    assert_eq!(config.delay_for(40), Duration::from_millis(300));
}

#[test]
fn test_jitter_stays_in_band() {
    let config = RetryConfig::new()
        .with_initial_delay(Duration::from_millis(100))
        .with_jitter(true);

    for _ in 0..50 {
        let delay = config.delay_for(1);
        assert!(delay >= Duration::from_millis(50));
        assert!(delay < Duration::from_millis(150));
    }
}

#[tokio::test]
async fn test_first_attempt_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let result: Result<u32, RetryError<&str>> = retry_with_backoff(
        &fast(3),
        || {
            let c = counter.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            }
        },
        |_| true,
    )
    .await;

    assert_eq!(result.unwrap(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_recovers_after_transient_failures() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let result: Result<u32, RetryError<&str>> = retry_with_backoff(
        &fast(3),
        || {
            let c = counter.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("timeout")
                } else {
                    Ok(7)
                }
            }
        },
        |_| true,
    )
    .await;

    assert_eq!(result.unwrap(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exhausts_attempts() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let err = retry_with_backoff(
        &fast(3),
        || {
            let c = counter.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, &str>("timeout")
            }
        },
        |_| true,
    )
    .await
    .unwrap_err();

    assert_eq!(err.attempts, 3);
    assert_eq!(err.last_error, "timeout");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(err.to_string(), "gave up after 3 attempt(s): timeout");
}

#[tokio::test]
async fn test_non_retryable_stops_immediately() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let err = retry_with_backoff(
        &fast(5),
        || {
            let c = counter.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, &str>("unavailable")
            }
        },
        |e| *e != "unavailable",
    )
    .await
    .unwrap_err();

    assert_eq!(err.attempts, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_zero_attempts_still_runs_once() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let _ = retry_with_backoff(
        &fast(0),
        || {
            let c = counter.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), &str>("timeout")
            }
        },
        |_| true,
    )
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
