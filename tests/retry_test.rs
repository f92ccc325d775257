use adaptive_engine::circuit_breaker::CircuitBreaker;
use adaptive_engine::error::{EngineError, ErrorKind};
use adaptive_engine::RetryPolicy;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(100),
        backoff_multiplier: 2.0,
        max_delay: Duration::from_millis(1000),
        attempt_timeout: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_succeeds_after_transient_failures() {
    let calls = AtomicU32::new(0);
    let mut delays = Vec::new();

    let result = policy(3)
        .retry_with_backoff(
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(EngineError::transient(format!("attempt {} failed", attempt), "test"))
                    } else {
                        Ok("done")
                    }
                }
            },
            |failure| delays.push((failure.attempt, failure.delay)),
        )
        .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        delays,
        vec![
            (1, Duration::from_millis(100)),
            (2, Duration::from_millis(200))
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_return_last_error_unchanged() {
    let mut hook_calls = 0;
    let result: Result<(), EngineError> = policy(3)
        .retry_with_backoff(
            |attempt| async move {
                Err(EngineError::transient(format!("failure #{}", attempt), "test").with_context("ctx"))
            },
            |_| hook_calls += 1,
        )
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.message, "failure #3");
    assert_eq!(err.kind, ErrorKind::TransientIo);
    assert_eq!(err.context.as_deref(), Some("ctx"));
    assert_eq!(hook_calls, 2, "hook runs only between attempts");
}

#[tokio::test(start_paused = true)]
async fn test_backoff_waits_before_retrying() {
    let started = tokio::time::Instant::now();
    let _: Result<(), &str> = policy(4)
        .retry_with_backoff(|_| async { Err("nope") }, |_| {})
        .await;
    // 100 + 200 + 400
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(700), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(800), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_single_attempt_never_sleeps_or_calls_hook() {
    let mut hook_calls = 0;
    let result: Result<(), &str> = policy(1)
        .retry_with_backoff(|_| async { Err("once") }, |_| hook_calls += 1)
        .await;
    assert_eq!(result, Err("once"));
    assert_eq!(hook_calls, 0);
}

#[test]
fn test_worst_case_duration_is_bounded() {
    let policy = RetryPolicy {
        attempt_timeout: Some(Duration::from_secs(2)),
        ..policy(3)
    };
    assert_eq!(policy.worst_case_duration(), Duration::from_secs(9));
}

#[test]
fn test_circuit_breaker_opens_after_threshold() {
    let cb = CircuitBreaker::new(Duration::from_secs(60), 3);
    assert!(!cb.is_open());

    cb.record_failure();
    cb.record_failure();
    assert!(!cb.is_open());

    cb.record_failure();
    assert!(cb.is_open());
    assert_eq!(cb.failure_count(), 3);
}

#[test]
fn test_circuit_breaker_resets_on_success() {
    let cb = CircuitBreaker::new(Duration::from_secs(60), 3);
    cb.record_failure();
    cb.record_failure();
    cb.record_success();
    assert!(!cb.is_open());
    assert_eq!(cb.failure_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_circuit_breaker_half_opens_after_cooldown() {
    let cb = CircuitBreaker::new(Duration::from_secs(60), 2);
    cb.record_failure();
    cb.record_failure();
    assert!(cb.is_open());

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(!cb.is_open(), "cooldown elapsed, probe allowed");

    cb.record_failure();
    assert!(cb.is_open(), "a failed probe reopens the circuit");
}
