//! Attempt observation and logging
//!
//! The `AttemptObserver` trait is the engine's only observability surface:
//! the executor emits structured attempt events through it and never formats
//! log text itself. Implementations must not rely on aborting the retry
//! loop; a panicking observer is logged and ignored by the executor.

use std::error::Error;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Observer for attempt-level retry events
///
/// Implement this to wire logging, metrics, or test assertions into a retry
/// execution. Events fired for caller-driven terminations (`on_cancelled`)
/// and policy-driven ones (`on_exhausted`, `on_non_retryable`) are distinct,
/// so logs can tell the reasons apart.
pub trait AttemptObserver: Send + Sync {
    /// Called when an attempt is about to start
    ///
    /// `attempt` is 1-based; `max_attempts` is the policy bound.
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32);

    /// Called when an attempt failed with a retryable error and another
    /// attempt has been scheduled after `next_delay`
    fn on_retry_scheduled(&self, attempt: u32, error: &dyn Error, next_delay: Duration);

    /// Called when the operation succeeds
    fn on_success(&self, attempt: u32, total_duration: Duration);

    /// Called when all attempts are used up
    fn on_exhausted(&self, attempts: u32, final_error: &dyn Error);

    /// Called when a failure was classified as not retryable
    fn on_non_retryable(&self, attempt: u32, error: &dyn Error) {
        let _ = (attempt, error);
    }

    /// Called when the caller ends the execution during a backoff wait,
    /// either through a cancellation signal or an overall deadline
    fn on_cancelled(&self, attempts: u32, last_error: Option<&dyn Error>) {
        let _ = (attempts, last_error);
    }

    /// Called when the next delay is not representable and the execution
    /// gives up with the attempt's error
    fn on_overflow(&self, attempt: u32, error: &dyn Error) {
        let _ = (attempt, error);
    }
}

/// An observer that drops every event
///
/// The default when no observer is supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl AttemptObserver for NoOpObserver {
    fn on_attempt_start(&self, _attempt: u32, _max_attempts: u32) {}

    fn on_retry_scheduled(&self, _attempt: u32, _error: &dyn Error, _next_delay: Duration) {}

    fn on_success(&self, _attempt: u32, _total_duration: Duration) {}

    fn on_exhausted(&self, _attempts: u32, _final_error: &dyn Error) {}
}

/// An observer that logs events through the `tracing` crate
///
/// # Log levels
///
/// - `on_attempt_start`: DEBUG
/// - `on_retry_scheduled`: WARN
/// - `on_success`: INFO after a retry, DEBUG on the first attempt
/// - `on_exhausted`: ERROR
/// - `on_non_retryable`: WARN
/// - `on_cancelled`: WARN
/// - `on_overflow`: ERROR
#[derive(Debug, Clone)]
pub struct TracingObserver {
    /// Name of the operation being retried (for log context)
    operation: String,
}

impl TracingObserver {
    /// Create an observer labelled with the operation's name
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    /// Get the operation name
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new("retry")
    }
}

impl AttemptObserver for TracingObserver {
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
        tracing::debug!(
            operation = %self.operation,
            attempt = attempt,
            max_attempts = max_attempts,
            "starting attempt"
        );
    }

    fn on_retry_scheduled(&self, attempt: u32, error: &dyn Error, next_delay: Duration) {
        tracing::warn!(
            operation = %self.operation,
            attempt = attempt,
            error = %error,
            next_delay_ms = next_delay.as_millis() as u64,
            "attempt failed, retry scheduled"
        );
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        if attempt > 1 {
            tracing::info!(
                operation = %self.operation,
                attempt = attempt,
                total_duration_ms = total_duration.as_millis() as u64,
                "succeeded after retry"
            );
        } else {
            tracing::debug!(
                operation = %self.operation,
                duration_ms = total_duration.as_millis() as u64,
                "succeeded on first attempt"
            );
        }
    }

    fn on_exhausted(&self, attempts: u32, final_error: &dyn Error) {
        tracing::error!(
            operation = %self.operation,
            attempts = attempts,
            error = %final_error,
            "all retry attempts exhausted"
        );
    }

    fn on_non_retryable(&self, attempt: u32, error: &dyn Error) {
        tracing::warn!(
            operation = %self.operation,
            attempt = attempt,
            error = %error,
            "non-retryable failure, giving up"
        );
    }

    fn on_cancelled(&self, attempts: u32, last_error: Option<&dyn Error>) {
        match last_error {
            Some(err) => tracing::warn!(
                operation = %self.operation,
                attempts = attempts,
                error = %err,
                "retry cancelled during backoff wait"
            ),
            None => tracing::warn!(
                operation = %self.operation,
                attempts = attempts,
                "retry cancelled during backoff wait"
            ),
        }
    }

    fn on_overflow(&self, attempt: u32, error: &dyn Error) {
        tracing::error!(
            operation = %self.operation,
            attempt = attempt,
            error = %error,
            "next retry delay overflowed, giving up"
        );
    }
}

/// An observer that records event counts and the scheduled delay sequence
///
/// Useful for tests (the backoff progression is asserted from recorded
/// events rather than wall-clock timing) and for simple metrics.
#[derive(Debug, Default)]
pub struct StatsObserver {
    attempt_starts: AtomicU32,
    retries_scheduled: AtomicU32,
    successes: AtomicU32,
    exhaustions: AtomicU32,
    non_retryables: AtomicU32,
    cancellations: AtomicU32,
    overflows: AtomicU32,
    scheduled_delays: Mutex<Vec<Duration>>,
}

impl StatsObserver {
    /// Create a new stats observer
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attempts started
    pub fn attempt_starts(&self) -> u32 {
        self.attempt_starts.load(Ordering::SeqCst)
    }

    /// Number of retries scheduled after a retryable failure
    pub fn retries_scheduled(&self) -> u32 {
        self.retries_scheduled.load(Ordering::SeqCst)
    }

    /// Number of successful completions
    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    /// Number of attempts-exhausted terminations
    pub fn exhaustions(&self) -> u32 {
        self.exhaustions.load(Ordering::SeqCst)
    }

    /// Number of non-retryable terminations
    pub fn non_retryables(&self) -> u32 {
        self.non_retryables.load(Ordering::SeqCst)
    }

    /// Number of cancelled or deadline-exceeded terminations
    pub fn cancellations(&self) -> u32 {
        self.cancellations.load(Ordering::SeqCst)
    }

    /// Number of delay-overflow terminations
    pub fn overflows(&self) -> u32 {
        self.overflows.load(Ordering::SeqCst)
    }

    /// The delays scheduled between attempts, in order
    pub fn scheduled_delays(&self) -> Vec<Duration> {
        self.scheduled_delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AttemptObserver for StatsObserver {
    fn on_attempt_start(&self, _attempt: u32, _max_attempts: u32) {
        self.attempt_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_retry_scheduled(&self, _attempt: u32, _error: &dyn Error, next_delay: Duration) {
        self.retries_scheduled.fetch_add(1, Ordering::SeqCst);
        self.scheduled_delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(next_delay);
    }

    fn on_success(&self, _attempt: u32, _total_duration: Duration) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_exhausted(&self, _attempts: u32, _final_error: &dyn Error) {
        self.exhaustions.fetch_add(1, Ordering::SeqCst);
    }

    fn on_non_retryable(&self, _attempt: u32, _error: &dyn Error) {
        self.non_retryables.fetch_add(1, Ordering::SeqCst);
    }

    fn on_cancelled(&self, _attempts: u32, _last_error: Option<&dyn Error>) {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
    }

    fn on_overflow(&self, _attempt: u32, _error: &dyn Error) {
        self.overflows.fetch_add(1, Ordering::SeqCst);
    }
}

impl<T: AttemptObserver + ?Sized> AttemptObserver for std::sync::Arc<T> {
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
        (**self).on_attempt_start(attempt, max_attempts)
    }

    fn on_retry_scheduled(&self, attempt: u32, error: &dyn Error, next_delay: Duration) {
        (**self).on_retry_scheduled(attempt, error, next_delay)
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        (**self).on_success(attempt, total_duration)
    }

    fn on_exhausted(&self, attempts: u32, final_error: &dyn Error) {
        (**self).on_exhausted(attempts, final_error)
    }

    fn on_non_retryable(&self, attempt: u32, error: &dyn Error) {
        (**self).on_non_retryable(attempt, error)
    }

    fn on_cancelled(&self, attempts: u32, last_error: Option<&dyn Error>) {
        (**self).on_cancelled(attempts, last_error)
    }

    fn on_overflow(&self, attempt: u32, error: &dyn Error) {
        (**self).on_overflow(attempt, error)
    }
}

impl<T: AttemptObserver + ?Sized> AttemptObserver for Box<T> {
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
        (**self).on_attempt_start(attempt, max_attempts)
    }

    fn on_retry_scheduled(&self, attempt: u32, error: &dyn Error, next_delay: Duration) {
        (**self).on_retry_scheduled(attempt, error, next_delay)
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        (**self).on_success(attempt, total_duration)
    }

    fn on_exhausted(&self, attempts: u32, final_error: &dyn Error) {
        (**self).on_exhausted(attempts, final_error)
    }

    fn on_non_retryable(&self, attempt: u32, error: &dyn Error) {
        (**self).on_non_retryable(attempt, error)
    }

    fn on_cancelled(&self, attempts: u32, last_error: Option<&dyn Error>) {
        (**self).on_cancelled(attempts, last_error)
    }

    fn on_overflow(&self, attempt: u32, error: &dyn Error) {
        (**self).on_overflow(attempt, error)
    }
}
