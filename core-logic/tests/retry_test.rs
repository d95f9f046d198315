use core_logic::{with_retry, RetryPolicy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_retry_success_first_try() {
    let counter = Arc::new(AtomicUsize::new(0));
    let policy = RetryPolicy::new(5, 10);

    let result: Result<String, _> = with_retry(&policy, "test_op", || async {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, String>("success".to_string())
    })
    .await;

    assert_eq!(result.unwrap(), "success");
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_success_after_failures() {
    let counter = Arc::new(AtomicUsize::new(0));
    let policy = RetryPolicy::new(5, 1);

    let result = with_retry(&policy, "test_op", || async {
        let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if count < 3 {
            Err("temporary error".to_string())
        } else {
            Ok(count)
        }
    })
    .await;

    assert_eq!(result.unwrap(), 3);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_stops_at_attempt_cap() {
    let counter = Arc::new(AtomicUsize::new(0));
    let policy = RetryPolicy::new(5, 1);

    let result: Result<(), _> = with_retry(&policy, "test_op", || async {
        let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Err(format!("permanent error {}", count))
    })
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.attempts, 5);
    assert_eq!(err.last_error, "permanent error 5");
    assert_eq!(counter.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_retry_backoff_is_exponential() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.delay_after(1), Duration::from_secs(1));
    assert_eq!(policy.delay_after(2), Duration::from_secs(2));
    assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    assert_eq!(policy.delay_after(4), Duration::from_secs(8));

    let capped = RetryPolicy::default().with_max_delay(3000);
    assert_eq!(capped.delay_after(4), Duration::from_secs(3));

    let fixed = RetryPolicy::fixed(5, 5000);
    assert_eq!(fixed.delay_after(1), fixed.delay_after(4));
}

#[tokio::test]
async fn test_retry_with_delay() {
    let counter = Arc::new(AtomicUsize::new(0));
    let policy = RetryPolicy::new(3, 10);

    let start = Instant::now();
    let result: Result<(), _> = with_retry(&policy, "test_op", || async {
        counter.fetch_add(1, Ordering::SeqCst);
        Err("always")
    })
    .await;

    assert!(result.is_err());
    // 10ms + 20ms between three attempts, none after the last
    assert!(start.elapsed() >= Duration::from_millis(30));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}
