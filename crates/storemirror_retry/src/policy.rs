//! Retry policies: attempt caps, delay decisions and retry hooks.

use std::time::Duration;

/// Default attempt cap.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default delay between attempts.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Sleep for the given duration, then try again.
    Retry(Duration),
    /// Give up immediately.
    Stop,
}

type DecideFn<E> = Box<dyn Fn(u32, &E) -> Decision + Send + Sync>;
type OnRetryFn<E> = Box<dyn Fn(u32, Duration, &E) + Send + Sync>;

/// How an operation is retried.
///
/// A policy is stateless and reusable across calls. The default retries
/// unconditionally with a fixed [`DEFAULT_DELAY`], capped at
/// [`DEFAULT_MAX_ATTEMPTS`] attempts.
pub struct RetryPolicy<E> {
    max_attempts: u32,
    decide: DecideFn<E>,
    on_retry: Option<OnRetryFn<E>>,
}

impl<E> RetryPolicy<E> {
    /// Creates the default policy.
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            decide: Box::new(|_, _| Decision::Retry(DEFAULT_DELAY)),
            on_retry: None,
        }
    }

    /// Sets the attempt cap.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Retries unconditionally with a fixed delay.
    pub fn with_fixed_delay(mut self, delay: Duration) -> Self {
        self.decide = Box::new(move |_, _| Decision::Retry(delay));
        self
    }

    /// Sets the per-failure decision function.
    ///
    /// The function receives the 1-based attempt number and the error that
    /// just occurred.
    pub fn with_decide<F>(mut self, decide: F) -> Self
    where
        F: Fn(u32, &E) -> Decision + Send + Sync + 'static,
    {
        self.decide = Box::new(decide);
        self
    }

    /// Installs a hook invoked before each sleep-and-retry.
    pub fn with_on_retry<F>(mut self, on_retry: F) -> Self
    where
        F: Fn(u32, Duration, &E) + Send + Sync + 'static,
    {
        self.on_retry = Some(Box::new(on_retry));
        self
    }

    /// The attempt cap.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub(crate) fn decide(&self, attempt: u32, error: &E) -> Decision {
        (self.decide)(attempt, error)
    }

    pub(crate) fn notify_retry(&self, attempt: u32, delay: Duration, error: &E) {
        if let Some(hook) = &self.on_retry {
            hook(attempt, delay, error);
        }
    }
}

impl<E> Default for RetryPolicy<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
