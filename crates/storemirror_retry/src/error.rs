//! Error type accumulating every failed attempt.

use std::fmt;

/// The terminal outcome of a retried operation that never succeeded.
///
/// `Exhausted` carries the error from every attempt in order, so nothing
/// observed along the way is lost when the engine finally gives up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The policy's attempt cap was zero; the operation was never run.
    NoAttemptsAllowed,
    /// Every attempt failed; one error per attempt, oldest first.
    Exhausted(Vec<E>),
}

impl<E> RetryError<E> {
    /// The per-attempt errors, oldest first. Empty for `NoAttemptsAllowed`.
    pub fn attempts(&self) -> &[E] {
        match self {
            RetryError::NoAttemptsAllowed => &[],
            RetryError::Exhausted(errors) => errors,
        }
    }

    /// Consumes the error, returning the per-attempt errors.
    pub fn into_attempts(self) -> Vec<E> {
        match self {
            RetryError::NoAttemptsAllowed => Vec::new(),
            RetryError::Exhausted(errors) => errors,
        }
    }

    /// The error from the final attempt, if any attempt ran.
    pub fn last(&self) -> Option<&E> {
        self.attempts().last()
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::NoAttemptsAllowed => {
                write!(f, "retry policy must allow at least one attempt")
            }
            RetryError::Exhausted(errors) if errors.len() == 1 => write!(f, "{}", errors[0]),
            RetryError::Exhausted(errors) => {
                write!(f, "{} attempts failed:", errors.len())?;
                for (idx, error) in errors.iter().enumerate() {
                    write!(f, "\n  attempt {}: {}", idx + 1, error)?;
                }
                Ok(())
            }
        }
    }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for RetryError<E> {}
