//! Retryability classification
//!
//! A `RetryPredicate` decides whether a failed attempt may be retried. The
//! engine treats failures opaquely: classification is entirely the caller's,
//! either through an arbitrary predicate or through set membership over
//! caller-defined failure categories.

use std::collections::HashSet;
use std::hash::Hash;

/// Decides whether an error should be retried
pub trait RetryPredicate<E: ?Sized>: Send + Sync {
    /// Determine whether the given error should be retried
    fn should_retry(&self, error: &E) -> bool;
}

/// Retry every failure (the default)
///
/// Matches the behavior of retry helpers that catch any error; restrict
/// with [`CategorySet`] or [`ClosurePredicate`] where only some failures
/// are transient.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E: ?Sized> RetryPredicate<E> for AlwaysRetry {
    fn should_retry(&self, _error: &E) -> bool {
        true
    }
}

/// Never retry; every failure is terminal on the first occurrence
#[derive(Debug, Clone, Copy)]
pub struct NeverRetry;

impl<E: ?Sized> RetryPredicate<E> for NeverRetry {
    fn should_retry(&self, _error: &E) -> bool {
        false
    }
}

/// A predicate backed by a closure
pub struct ClosurePredicate<F> {
    predicate: F,
}

impl<F> ClosurePredicate<F> {
    /// Create a new closure-based predicate
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<E, F> RetryPredicate<E> for ClosurePredicate<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &E) -> bool {
        (self.predicate)(error)
    }
}

/// Exposes the failure category of an error
///
/// Categories are caller-defined; the engine only ever compares them for
/// set membership.
pub trait Categorized {
    /// The caller's failure-category type
    type Category;

    /// The category this failure belongs to
    fn category(&self) -> Self::Category;
}

/// Retry only failures whose category is in the set
///
/// A failure outside the set is never retried, regardless of remaining
/// attempts.
#[derive(Debug, Clone)]
pub struct CategorySet<C> {
    retryable: HashSet<C>,
}

impl<C: Eq + Hash> CategorySet<C> {
    /// Build a set from the retryable categories
    pub fn new(categories: impl IntoIterator<Item = C>) -> Self {
        Self {
            retryable: categories.into_iter().collect(),
        }
    }

    /// Check whether a category is retryable
    pub fn contains(&self, category: &C) -> bool {
        self.retryable.contains(category)
    }
}

impl<E, C> RetryPredicate<E> for CategorySet<C>
where
    E: Categorized<Category = C>,
    C: Eq + Hash + Send + Sync,
{
    fn should_retry(&self, error: &E) -> bool {
        self.retryable.contains(&error.category())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Category {
        Transient,
        PermissionDenied,
        Invalid,
    }

    #[derive(Debug)]
    struct Failure(Category);

    impl Categorized for Failure {
        type Category = Category;

        fn category(&self) -> Category {
            self.0
        }
    }

    #[test]
    fn always_retry_accepts_everything() {
        let predicate = AlwaysRetry;

        for kind in [
            io::ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied,
            io::ErrorKind::TimedOut,
        ] {
            assert!(predicate.should_retry(&io::Error::new(kind, "failure")));
        }
    }

    #[test]
    fn never_retry_rejects_everything() {
        let predicate = NeverRetry;
        assert!(!predicate.should_retry(&io::Error::new(io::ErrorKind::TimedOut, "timeout")));
    }

    #[test]
    fn closure_predicate_is_selective() {
        let predicate = ClosurePredicate::new(|err: &io::Error| {
            matches!(
                err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::ConnectionReset
            )
        });

        assert!(predicate.should_retry(&io::Error::new(io::ErrorKind::TimedOut, "timeout")));
        assert!(!predicate.should_retry(&io::Error::new(io::ErrorKind::NotFound, "not found")));
    }

    #[test]
    fn category_set_membership() {
        let predicate = CategorySet::new([Category::Transient]);

        assert!(predicate.should_retry(&Failure(Category::Transient)));
        assert!(!predicate.should_retry(&Failure(Category::PermissionDenied)));
        assert!(!predicate.should_retry(&Failure(Category::Invalid)));
    }

    #[test]
    fn empty_category_set_retries_nothing() {
        let predicate: CategorySet<Category> = CategorySet::new([]);

        assert!(!predicate.should_retry(&Failure(Category::Transient)));
    }
}
