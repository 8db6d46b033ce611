//! Retry execution engine
//!
//! The executor applies a [`RetryPolicy`] to a caller-supplied fallible
//! operation. Each `execute` call owns its attempt counter and delay state;
//! the executor holds nothing mutable across calls, so one executor (or one
//! shared policy) can serve any number of concurrent executions.
//!
//! The inter-attempt wait is the engine's only suspension point. In the
//! async path it is a `tokio::time::sleep` raced against the cancellation
//! token and the overall deadline; in the blocking path it is a sliced
//! `thread::sleep` that polls the token between slices.

use std::error::Error;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::RetryError;
use crate::observer::{AttemptObserver, NoOpObserver};
use crate::policy::RetryPolicy;
use crate::predicate::{AlwaysRetry, RetryPredicate};

/// Granularity at which the blocking wait polls for cancellation.
const SYNC_WAIT_SLICE: Duration = Duration::from_millis(10);

/// A successful retry execution
///
/// Pairs the operation's output with how many attempts it took; `attempts`
/// is always in `[1, max_attempts]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion<T> {
    /// The operation's output
    pub value: T,
    /// The attempt that succeeded (1-based)
    pub attempts: u32,
    /// Total time spent across all attempts
    pub total_duration: Duration,
}

/// Execute an async operation with retry behavior from a policy
///
/// The convenience form of the engine: every failure is considered
/// retryable and attempt events are dropped. For classification, observers,
/// cancellation, or deadlines use [`RetryExecutorBuilder`].
///
/// # Example
///
/// ```rust,no_run
/// use retry_engine::{retry_with_policy, RetryError, RetryPolicy};
///
/// async fn example() -> Result<String, RetryError<std::io::Error>> {
///     let policy = RetryPolicy::default();
///
///     retry_with_policy(&policy, || async {
///         // Your fallible operation here
///         Ok("success".to_string())
///     })
///     .await
/// }
/// ```
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Error + Send + 'static,
{
    RetryExecutor::new(policy.clone())
        .execute(op)
        .await
        .map(|completion| completion.value)
}

/// Builder for configuring a [`RetryExecutor`]
///
/// # Example
///
/// ```rust
/// use retry_engine::{RetryExecutorBuilder, RetryPolicy, TracingObserver};
///
/// let executor = RetryExecutorBuilder::new()
///     .with_policy(RetryPolicy::default())
///     .with_observer(TracingObserver::new("broker-publish"))
///     .build();
/// ```
pub struct RetryExecutorBuilder<P = AlwaysRetry, O = NoOpObserver> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    cancel: Option<CancellationToken>,
    deadline: Option<Duration>,
}

impl Default for RetryExecutorBuilder<AlwaysRetry, NoOpObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutorBuilder<AlwaysRetry, NoOpObserver> {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
            predicate: AlwaysRetry,
            observer: NoOpObserver,
            cancel: None,
            deadline: None,
        }
    }
}

impl<P, O> RetryExecutorBuilder<P, O> {
    /// Set the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the predicate deciding which failures are retryable
    pub fn with_predicate<P2>(self, predicate: P2) -> RetryExecutorBuilder<P2, O> {
        RetryExecutorBuilder {
            policy: self.policy,
            predicate,
            observer: self.observer,
            cancel: self.cancel,
            deadline: self.deadline,
        }
    }

    /// Set the observer receiving attempt events
    pub fn with_observer<O2>(self, observer: O2) -> RetryExecutorBuilder<P, O2> {
        RetryExecutorBuilder {
            policy: self.policy,
            predicate: self.predicate,
            observer,
            cancel: self.cancel,
            deadline: self.deadline,
        }
    }

    /// Wire a cancellation token into the backoff waits
    ///
    /// A token cancelled during a wait ends the execution promptly with
    /// [`RetryError::Cancelled`]. A token cancelled while the operation
    /// itself runs is the operation's own responsibility to honor.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Bound the whole execution by a deadline
    ///
    /// A deadline passing during a wait ends the execution with
    /// [`RetryError::DeadlineExceeded`], distinct from exhaustion and from
    /// cancellation.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Build the executor
    pub fn build(self) -> RetryExecutor<P, O> {
        RetryExecutor {
            policy: self.policy,
            predicate: self.predicate,
            observer: self.observer,
            cancel: self.cancel,
            deadline: self.deadline,
        }
    }
}

/// Applies a [`RetryPolicy`] to caller-supplied operations
///
/// Use [`RetryExecutorBuilder`] for anything beyond the retry-all,
/// unobserved default.
pub struct RetryExecutor<P = AlwaysRetry, O = NoOpObserver> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    cancel: Option<CancellationToken>,
    deadline: Option<Duration>,
}

impl RetryExecutor<AlwaysRetry, NoOpObserver> {
    /// Create an executor over a policy with the retry-all default
    pub fn new(policy: RetryPolicy) -> Self {
        RetryExecutorBuilder::new().with_policy(policy).build()
    }
}

/// How a backoff wait ended.
enum WaitOutcome {
    Elapsed,
    Cancelled,
    DeadlinePassed(Duration),
}

impl<P, O> RetryExecutor<P, O>
where
    O: AttemptObserver,
{
    /// Execute an async operation under this executor's policy
    ///
    /// Returns the operation's output with the attempts-used count, or a
    /// [`RetryError`] carrying the original failure verbatim.
    pub async fn execute<F, Fut, T, E>(&self, mut op: F) -> Result<Completion<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + Send + 'static,
        P: RetryPredicate<E>,
    {
        let start = tokio::time::Instant::now();
        // An unrepresentable deadline is unreachable, so treat it as unbounded.
        let deadline = self
            .deadline
            .and_then(|d| start.checked_add(d).map(|at| (d, at)));
        let max_attempts = self.policy.max_attempts();
        let mut attempt: u32 = 1;

        loop {
            self.notify(|| self.observer.on_attempt_start(attempt, max_attempts));

            match op().await {
                Ok(value) => {
                    let total_duration = start.elapsed();
                    self.notify(|| self.observer.on_success(attempt, total_duration));
                    return Ok(Completion {
                        value,
                        attempts: attempt,
                        total_duration,
                    });
                }
                Err(err) => {
                    if !self.predicate.should_retry(&err) {
                        self.notify(|| self.observer.on_non_retryable(attempt, &err));
                        return Err(RetryError::non_retryable(attempt, err));
                    }

                    if attempt >= max_attempts {
                        self.notify(|| self.observer.on_exhausted(attempt, &err));
                        return Err(RetryError::exhausted(attempt, err, start.elapsed()));
                    }

                    let delay = match self.policy.delay_after(attempt) {
                        Ok(delay) => delay,
                        Err(overflow) => {
                            self.notify(|| self.observer.on_overflow(overflow.attempt, &err));
                            return Err(RetryError::overflow(overflow.attempt, err));
                        }
                    };

                    self.notify(|| self.observer.on_retry_scheduled(attempt, &err, delay));

                    match self.wait(delay, deadline).await {
                        WaitOutcome::Elapsed => {}
                        WaitOutcome::Cancelled => {
                            self.notify(|| self.observer.on_cancelled(attempt, Some(&err)));
                            return Err(RetryError::cancelled(attempt, Some(err)));
                        }
                        WaitOutcome::DeadlinePassed(configured) => {
                            self.notify(|| self.observer.on_cancelled(attempt, Some(&err)));
                            return Err(RetryError::deadline_exceeded(
                                attempt,
                                configured,
                                Some(err),
                            ));
                        }
                    }

                    attempt += 1;
                }
            }
        }
    }

    /// Execute a blocking operation under this executor's policy
    ///
    /// The calling thread sleeps between attempts. Cancellation is honored
    /// at wait-slice granularity rather than instantly.
    pub fn execute_sync<F, T, E>(&self, mut op: F) -> Result<Completion<T>, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Error + Send + 'static,
        P: RetryPredicate<E>,
    {
        let start = std::time::Instant::now();
        let deadline = self
            .deadline
            .and_then(|d| start.checked_add(d).map(|at| (d, at)));
        let max_attempts = self.policy.max_attempts();
        let mut attempt: u32 = 1;

        loop {
            self.notify(|| self.observer.on_attempt_start(attempt, max_attempts));

            match op() {
                Ok(value) => {
                    let total_duration = start.elapsed();
                    self.notify(|| self.observer.on_success(attempt, total_duration));
                    return Ok(Completion {
                        value,
                        attempts: attempt,
                        total_duration,
                    });
                }
                Err(err) => {
                    if !self.predicate.should_retry(&err) {
                        self.notify(|| self.observer.on_non_retryable(attempt, &err));
                        return Err(RetryError::non_retryable(attempt, err));
                    }

                    if attempt >= max_attempts {
                        self.notify(|| self.observer.on_exhausted(attempt, &err));
                        return Err(RetryError::exhausted(attempt, err, start.elapsed()));
                    }

                    let delay = match self.policy.delay_after(attempt) {
                        Ok(delay) => delay,
                        Err(overflow) => {
                            self.notify(|| self.observer.on_overflow(overflow.attempt, &err));
                            return Err(RetryError::overflow(overflow.attempt, err));
                        }
                    };

                    self.notify(|| self.observer.on_retry_scheduled(attempt, &err, delay));

                    match self.wait_sync(delay, deadline) {
                        WaitOutcome::Elapsed => {}
                        WaitOutcome::Cancelled => {
                            self.notify(|| self.observer.on_cancelled(attempt, Some(&err)));
                            return Err(RetryError::cancelled(attempt, Some(err)));
                        }
                        WaitOutcome::DeadlinePassed(configured) => {
                            self.notify(|| self.observer.on_cancelled(attempt, Some(&err)));
                            return Err(RetryError::deadline_exceeded(
                                attempt,
                                configured,
                                Some(err),
                            ));
                        }
                    }

                    attempt += 1;
                }
            }
        }
    }

    /// Race the backoff sleep against cancellation and the deadline.
    async fn wait(
        &self,
        delay: Duration,
        deadline: Option<(Duration, tokio::time::Instant)>,
    ) -> WaitOutcome {
        let now = tokio::time::Instant::now();
        let (sleep_for, ends_at_deadline) = match deadline {
            Some((configured, at)) => {
                let remaining = at.saturating_duration_since(now);
                if remaining <= delay {
                    (remaining, Some(configured))
                } else {
                    (delay, None)
                }
            }
            None => (delay, None),
        };

        if let Some(token) = &self.cancel {
            tokio::select! {
                _ = token.cancelled() => return WaitOutcome::Cancelled,
                _ = tokio::time::sleep(sleep_for) => {}
            }
        } else {
            tokio::time::sleep(sleep_for).await;
        }

        match ends_at_deadline {
            Some(configured) => WaitOutcome::DeadlinePassed(configured),
            None => WaitOutcome::Elapsed,
        }
    }

    /// Blocking twin of [`wait`](Self::wait); polls the token between
    /// bounded sleep slices.
    fn wait_sync(
        &self,
        delay: Duration,
        deadline: Option<(Duration, std::time::Instant)>,
    ) -> WaitOutcome {
        let now = std::time::Instant::now();
        let (mut remaining, ends_at_deadline) = match deadline {
            Some((configured, at)) => {
                let left = at.saturating_duration_since(now);
                if left <= delay {
                    (left, Some(configured))
                } else {
                    (delay, None)
                }
            }
            None => (delay, None),
        };

        match &self.cancel {
            None => std::thread::sleep(remaining),
            Some(token) => {
                while !remaining.is_zero() {
                    if token.is_cancelled() {
                        return WaitOutcome::Cancelled;
                    }
                    let slice = remaining.min(SYNC_WAIT_SLICE);
                    std::thread::sleep(slice);
                    remaining = remaining.saturating_sub(slice);
                }
                if token.is_cancelled() {
                    return WaitOutcome::Cancelled;
                }
            }
        }

        match ends_at_deadline {
            Some(configured) => WaitOutcome::DeadlinePassed(configured),
            None => WaitOutcome::Elapsed,
        }
    }

    /// Deliver an observer notification without letting an observer panic
    /// mask the operation's real outcome.
    fn notify<F: FnOnce()>(&self, notification: F) {
        if catch_unwind(AssertUnwindSafe(notification)).is_err() {
            tracing::warn!("attempt observer panicked; event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::StatsObserver;
    use crate::predicate::ClosurePredicate;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), 2.0)
            .unwrap()
            .with_max_delay(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn immediate_success() {
        let observer = Arc::new(StatsObserver::new());

        let result: Result<Completion<&str>, RetryError<io::Error>> = RetryExecutorBuilder::new()
            .with_policy(quick_policy(3))
            .with_observer(observer.clone())
            .build()
            .execute(|| async { Ok("success") })
            .await;

        let completion = result.unwrap();
        assert_eq!(completion.value, "success");
        assert_eq!(completion.attempts, 1);
        assert_eq!(observer.attempt_starts(), 1);
        assert_eq!(observer.successes(), 1);
        assert_eq!(observer.retries_scheduled(), 0);
    }

    #[tokio::test]
    async fn success_after_retry_reports_attempts_used() {
        let observer = Arc::new(StatsObserver::new());
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Result<Completion<&str>, RetryError<io::Error>> = RetryExecutorBuilder::new()
            .with_policy(quick_policy(3))
            .with_observer(observer.clone())
            .build()
            .execute(|| {
                let calls = calls_clone.clone();
                async move {
                    let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if call < 2 {
                        Err(io::Error::new(io::ErrorKind::TimedOut, "timeout"))
                    } else {
                        Ok("success on retry")
                    }
                }
            })
            .await;

        let completion = result.unwrap();
        assert_eq!(completion.value, "success on retry");
        assert_eq!(completion.attempts, 2);
        assert_eq!(observer.attempt_starts(), 2);
        assert_eq!(observer.retries_scheduled(), 1);
        assert_eq!(observer.successes(), 1);
    }

    #[tokio::test]
    async fn exhaustion_uses_every_attempt() {
        let observer = Arc::new(StatsObserver::new());

        let result: Result<Completion<&str>, RetryError<io::Error>> = RetryExecutorBuilder::new()
            .with_policy(quick_policy(3))
            .with_observer(observer.clone())
            .build()
            .execute(|| async { Err(io::Error::new(io::ErrorKind::TimedOut, "always fails")) })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 3);
        assert_eq!(observer.attempt_starts(), 3);
        // Final failure reports exhaustion, not another scheduled retry.
        assert_eq!(observer.retries_scheduled(), 2);
        assert_eq!(observer.exhaustions(), 1);
    }

    #[tokio::test]
    async fn predicate_short_circuits_later_attempt() {
        let observer = Arc::new(StatsObserver::new());
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let predicate =
            ClosurePredicate::new(|err: &io::Error| err.kind() == io::ErrorKind::TimedOut);

        let result: Result<Completion<&str>, RetryError<io::Error>> = RetryExecutorBuilder::new()
            .with_policy(quick_policy(5))
            .with_predicate(predicate)
            .with_observer(observer.clone())
            .build()
            .execute(|| {
                let calls = calls_clone.clone();
                async move {
                    let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if call == 1 {
                        Err(io::Error::new(io::ErrorKind::TimedOut, "retryable"))
                    } else {
                        Err(io::Error::new(io::ErrorKind::NotFound, "not retryable"))
                    }
                }
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_non_retryable());
        assert_eq!(err.attempts(), 2);
        assert_eq!(observer.attempt_starts(), 2);
        assert_eq!(observer.retries_scheduled(), 1);
        assert_eq!(observer.non_retryables(), 1);
    }

    #[tokio::test]
    async fn convenience_function_retries_everything() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result = retry_with_policy(&quick_policy(3), || {
            let calls = calls_clone.clone();
            async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call < 2 {
                    Err(io::Error::new(io::ErrorKind::Other, "fail once"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn sync_executor_success_after_retries() {
        let observer = Arc::new(StatsObserver::new());
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Result<Completion<u32>, RetryError<io::Error>> = RetryExecutorBuilder::new()
            .with_policy(quick_policy(3))
            .with_observer(observer.clone())
            .build()
            .execute_sync(move || {
                let call = calls_clone.fetch_add(1, Ordering::SeqCst) + 1;
                if call < 3 {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "temporary"))
                } else {
                    Ok(42)
                }
            });

        let completion = result.unwrap();
        assert_eq!(completion.value, 42);
        assert_eq!(completion.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(observer.retries_scheduled(), 2);
    }

    #[test]
    fn sync_executor_pre_cancelled_token() {
        let token = CancellationToken::new();
        token.cancel();

        let result: Result<Completion<&str>, RetryError<io::Error>> = RetryExecutorBuilder::new()
            .with_policy(quick_policy(3))
            .with_cancellation(token)
            .build()
            .execute_sync(|| Err(io::Error::new(io::ErrorKind::TimedOut, "fails")));

        let err = result.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.attempts(), 1);
    }

    #[test]
    fn sync_executor_zero_deadline() {
        let result: Result<Completion<&str>, RetryError<io::Error>> = RetryExecutorBuilder::new()
            .with_policy(quick_policy(3))
            .with_deadline(Duration::ZERO)
            .build()
            .execute_sync(|| Err(io::Error::new(io::ErrorKind::TimedOut, "fails")));

        let err = result.unwrap_err();
        assert!(err.is_deadline_exceeded());
        assert_eq!(err.attempts(), 1);
    }
}
