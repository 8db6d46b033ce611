//! # retry-engine
//!
//! A policy-based retry execution engine: re-attempt a fallible operation a
//! bounded number of times, growing the wait between attempts geometrically,
//! classifying which failures are retryable, and reporting attempt-level
//! detail through an observer.
//!
//! # Features
//!
//! - Validated, immutable [`RetryPolicy`] values, shareable across
//!   concurrent executions and loadable from config via serde
//! - Exact geometric backoff with an optional cap and a checked overflow
//!   boundary (no jitter in the core arithmetic)
//! - Caller-defined retryability via [`RetryPredicate`], including set
//!   membership over failure categories ([`CategorySet`])
//! - Observable attempts via the [`AttemptObserver`] trait, with a built-in
//!   [`TracingObserver`] for logging and [`StatsObserver`] for tests/metrics
//! - Cooperative cancellation and overall deadlines for the backoff waits
//! - Async (`execute`) and blocking (`execute_sync`) execution
//!
//! # Example
//!
//! ```rust,no_run
//! use retry_engine::{retry_with_policy, RetryError, RetryPolicy};
//!
//! async fn example() -> Result<String, RetryError<std::io::Error>> {
//!     let policy = RetryPolicy::default();
//!
//!     retry_with_policy(&policy, || async {
//!         // Your fallible operation here
//!         Ok("success".to_string())
//!     })
//!     .await
//! }
//! ```

mod error;
mod executor;
mod observer;
mod policy;
mod predicate;

pub use error::RetryError;
pub use executor::{retry_with_policy, Completion, RetryExecutor, RetryExecutorBuilder};
pub use observer::{AttemptObserver, NoOpObserver, StatsObserver, TracingObserver};
pub use policy::{InvalidPolicy, PolicyOverflow, RetryPolicy};
pub use predicate::{
    AlwaysRetry, Categorized, CategorySet, ClosurePredicate, NeverRetry, RetryPredicate,
};

pub use tokio_util::sync::CancellationToken;
