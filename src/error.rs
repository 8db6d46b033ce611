//! Terminal outcomes of a retry execution
//!
//! `RetryError` is generic over `E`, the failure type of the operation being
//! retried. The original failure is always carried verbatim; the engine
//! never wraps its message or swallows it.

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Why a retry execution gave up
///
/// The variants keep "gave up due to policy" ([`Exhausted`](Self::Exhausted),
/// [`NonRetryable`](Self::NonRetryable)) distinguishable from "gave up due to
/// the caller" ([`Cancelled`](Self::Cancelled),
/// [`DeadlineExceeded`](Self::DeadlineExceeded)).
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    Exhausted {
        /// Number of attempts made before giving up
        attempts: u32,
        /// The failure from the final attempt
        source: E,
        /// Total time spent across all attempts
        total_duration: Duration,
    },

    /// The predicate classified a failure as not retryable
    NonRetryable {
        /// The attempt on which the non-retryable failure occurred
        attempt: u32,
        /// The failure, unmodified
        source: E,
    },

    /// A cancellation signal arrived during a backoff wait
    Cancelled {
        /// Attempts made before cancellation
        attempts: u32,
        /// The failure that preceded the interrupted wait
        last_error: Option<E>,
    },

    /// The overall deadline passed during a backoff wait
    DeadlineExceeded {
        /// Attempts made before the deadline passed
        attempts: u32,
        /// The configured deadline
        deadline: Duration,
        /// The failure that preceded the interrupted wait
        last_error: Option<E>,
    },

    /// Delay growth left the representable range (no cap configured)
    Overflow {
        /// The attempt whose follow-up delay overflowed
        attempt: u32,
        /// The failure that triggered the scheduling
        source: E,
    },
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                total_duration,
            } => write!(
                f,
                "retry exhausted after {} attempts over {:.2}s: {}",
                attempts,
                total_duration.as_secs_f64(),
                source
            ),
            RetryError::NonRetryable { attempt, source } => {
                write!(f, "non-retryable failure on attempt {}: {}", attempt, source)
            }
            RetryError::Cancelled {
                attempts,
                last_error,
            } => match last_error {
                Some(err) => write!(f, "retry cancelled after {} attempts: {}", attempts, err),
                None => write!(f, "retry cancelled after {} attempts", attempts),
            },
            RetryError::DeadlineExceeded {
                attempts,
                deadline,
                last_error,
            } => match last_error {
                Some(err) => write!(
                    f,
                    "deadline of {}ms exceeded after {} attempts: {}",
                    deadline.as_millis(),
                    attempts,
                    err
                ),
                None => write!(
                    f,
                    "deadline of {}ms exceeded after {} attempts",
                    deadline.as_millis(),
                    attempts
                ),
            },
            RetryError::Overflow { attempt, source } => write!(
                f,
                "backoff delay after attempt {} exceeds the representable bound: {}",
                attempt, source
            ),
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::NonRetryable { source, .. } => Some(source),
            RetryError::Cancelled {
                last_error: Some(err),
                ..
            } => Some(err),
            RetryError::DeadlineExceeded {
                last_error: Some(err),
                ..
            } => Some(err),
            RetryError::Overflow { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl<E> RetryError<E> {
    /// Create a new exhausted error
    pub fn exhausted(attempts: u32, source: E, total_duration: Duration) -> Self {
        RetryError::Exhausted {
            attempts,
            source,
            total_duration,
        }
    }

    /// Create a new non-retryable error
    pub fn non_retryable(attempt: u32, source: E) -> Self {
        RetryError::NonRetryable { attempt, source }
    }

    /// Create a new cancelled error
    pub fn cancelled(attempts: u32, last_error: Option<E>) -> Self {
        RetryError::Cancelled {
            attempts,
            last_error,
        }
    }

    /// Create a new deadline-exceeded error
    pub fn deadline_exceeded(attempts: u32, deadline: Duration, last_error: Option<E>) -> Self {
        RetryError::DeadlineExceeded {
            attempts,
            deadline,
            last_error,
        }
    }

    /// Create a new overflow error
    pub fn overflow(attempt: u32, source: E) -> Self {
        RetryError::Overflow { attempt, source }
    }

    /// Number of attempts made before the execution gave up
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::NonRetryable { attempt, .. } => *attempt,
            RetryError::Cancelled { attempts, .. } => *attempts,
            RetryError::DeadlineExceeded { attempts, .. } => *attempts,
            RetryError::Overflow { attempt, .. } => *attempt,
        }
    }

    /// Check if all attempts were used up
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// Check if the failure was classified as not retryable
    pub fn is_non_retryable(&self) -> bool {
        matches!(self, RetryError::NonRetryable { .. })
    }

    /// Check if a cancellation signal ended the execution
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// Check if the overall deadline ended the execution
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, RetryError::DeadlineExceeded { .. })
    }

    /// Check if delay growth overflowed
    pub fn is_overflow(&self) -> bool {
        matches!(self, RetryError::Overflow { .. })
    }

    /// Get the underlying failure, consuming this error
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::NonRetryable { source, .. } => Some(source),
            RetryError::Cancelled { last_error, .. } => last_error,
            RetryError::DeadlineExceeded { last_error, .. } => last_error,
            RetryError::Overflow { source, .. } => Some(source),
        }
    }

    /// Get a reference to the underlying failure
    pub fn source_ref(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::NonRetryable { source, .. } => Some(source),
            RetryError::Cancelled { last_error, .. } => last_error.as_ref(),
            RetryError::DeadlineExceeded { last_error, .. } => last_error.as_ref(),
            RetryError::Overflow { source, .. } => Some(source),
        }
    }

    /// Map the underlying failure type
    pub fn map_err<F, E2>(self, f: F) -> RetryError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                total_duration,
            } => RetryError::Exhausted {
                attempts,
                source: f(source),
                total_duration,
            },
            RetryError::NonRetryable { attempt, source } => RetryError::NonRetryable {
                attempt,
                source: f(source),
            },
            RetryError::Cancelled {
                attempts,
                last_error,
            } => RetryError::Cancelled {
                attempts,
                last_error: last_error.map(f),
            },
            RetryError::DeadlineExceeded {
                attempts,
                deadline,
                last_error,
            } => RetryError::DeadlineExceeded {
                attempts,
                deadline,
                last_error: last_error.map(f),
            },
            RetryError::Overflow { attempt, source } => RetryError::Overflow {
                attempt,
                source: f(source),
            },
        }
    }
}
