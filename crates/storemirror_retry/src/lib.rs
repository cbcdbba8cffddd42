//! # Storemirror Retry
//!
//! A small, generic retry engine. An operation is attempted under a
//! [`RetryPolicy`] that decides, per failure, whether to try again and how
//! long to wait first. Every attempt's error is kept and returned together
//! when the policy gives up.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use storemirror_retry::{run, RetryPolicy};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let policy: RetryPolicy<String> = RetryPolicy::new()
//!     .with_max_attempts(3)
//!     .with_fixed_delay(Duration::from_millis(1));
//!
//! let mut calls = 0;
//! let result = run(&policy, || {
//!     calls += 1;
//!     let ok = calls >= 2;
//!     async move {
//!         if ok {
//!             Ok("done")
//!         } else {
//!             Err("not yet".to_string())
//!         }
//!     }
//! })
//! .await;
//!
//! assert_eq!(result.unwrap(), "done");
//! assert_eq!(calls, 2);
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod policy;

pub use error::RetryError;
pub use policy::{Decision, RetryPolicy, DEFAULT_DELAY, DEFAULT_MAX_ATTEMPTS};

use std::future::Future;

/// Runs `operation` under `policy` until it succeeds or the policy gives up.
///
/// The attempt counter starts at 1. After each failure the policy is asked
/// for a [`Decision`]; on [`Decision::Stop`], or once the attempt cap is
/// reached, the accumulated [`RetryError`] carrying every attempt's failure
/// is returned. Otherwise the retry hook fires, the engine sleeps for the
/// decided delay and tries again.
///
/// A policy whose attempt cap is zero fails immediately without invoking
/// the operation at all.
pub async fn run<T, E, F, Fut>(policy: &RetryPolicy<E>, mut operation: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if policy.max_attempts() < 1 {
        return Err(RetryError::NoAttemptsAllowed);
    }

    let mut errors = Vec::new();
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => match policy.decide(attempt, &error) {
                Decision::Retry(delay) if attempt < policy.max_attempts() => {
                    policy.notify_retry(attempt, delay, &error);
                    errors.push(error);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                _ => {
                    errors.push(error);
                    return Err(RetryError::Exhausted(errors));
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_policy(max_attempts: u32) -> RetryPolicy<String> {
        RetryPolicy::new()
            .with_max_attempts(max_attempts)
            .with_fixed_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn always_failing_runs_exactly_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = run(&fast_policy(4), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("boom".to_string()) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result.unwrap_err() {
            RetryError::Exhausted(errors) => assert_eq!(errors.len(), 4),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn succeeds_on_kth_attempt() {
        let calls = AtomicU32::new(0);
        let result = run(&fast_policy(10), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n >= 3 {
                    Ok(n)
                } else {
                    Err("not yet".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_attempts_never_invokes_operation() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = run(&fast_policy(0), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("unreachable".to_string()) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(result, Err(RetryError::NoAttemptsAllowed)));
    }

    #[tokio::test]
    async fn stop_decision_ends_after_first_failure() {
        let policy: RetryPolicy<String> = RetryPolicy::new()
            .with_max_attempts(10)
            .with_decide(|_, _| Decision::Stop);

        let calls = AtomicU32::new(0);
        let result: Result<(), _> = run(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("fatal".to_string()) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match result.unwrap_err() {
            RetryError::Exhausted(errors) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn retry_hook_sees_every_retried_attempt() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let record = std::sync::Arc::clone(&seen);
        let policy: RetryPolicy<String> = fast_policy(3).with_on_retry(move |attempt, delay, _| {
            record.lock().unwrap().push((attempt, delay));
        });

        let _: Result<(), _> = run(&policy, || async { Err("boom".to_string()) }).await;

        // The final attempt is not retried, so the hook fires twice.
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, 1);
        assert_eq!(seen[1].0, 2);
    }

    #[test]
    fn exhausted_display_lists_every_failure() {
        let err: RetryError<String> =
            RetryError::Exhausted(vec!["first".to_string(), "second".to_string()]);
        let text = err.to_string();
        assert!(text.contains("2 attempts failed"));
        assert!(text.contains("first"));
        assert!(text.contains("second"));
    }
}
