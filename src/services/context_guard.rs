//! Entry point for every unit of work.

use std::future::Future;

use tracing::trace;

use super::execution_context::{ContextSnapshot, ExecutionContext};

/// Runs a unit of work in a clean execution context.
///
/// The unit starts with every field empty. Whatever the caller had is
/// restored when the unit finishes, on success, error, panic, or when the
/// future is dropped mid-flight. Nesting is allowed: a unit started from
/// inside another unit sees an empty context and hands the outer one back.
pub struct ContextGuard;

impl ContextGuard {
    pub async fn run<F>(unit: F) -> F::Output
    where
        F: Future,
    {
        let outer = ExecutionContext::current();
        if !outer.is_empty() {
            trace!(?outer, "entering nested unit; outer context suspended");
        }
        ExecutionContext::scope(ContextSnapshot::default(), unit).await
    }

    /// Synchronous variant for inline units.
    pub fn run_sync<F, R>(unit: F) -> R
    where
        F: FnOnce() -> R,
    {
        ExecutionContext::sync_scope(ContextSnapshot::default(), unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::panic::AssertUnwindSafe;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_unit_starts_empty_and_restores_outer() {
        let outer_tenant = Uuid::new_v4();
        ContextGuard::run(async move {
            ExecutionContext::set_tenant(Some(outer_tenant)).unwrap();

            ContextGuard::run(async {
                assert!(ExecutionContext::current().is_empty());
                ExecutionContext::set_tenant(Some(Uuid::new_v4())).unwrap();
            })
            .await;

            assert_eq!(ExecutionContext::current().tenant_id, Some(outer_tenant));
        })
        .await;
    }

    #[tokio::test]
    async fn test_restores_after_panic() {
        let outer_tenant = Uuid::new_v4();
        ContextGuard::run(async move {
            ExecutionContext::set_tenant(Some(outer_tenant)).unwrap();

            let result = AssertUnwindSafe(ContextGuard::run(async {
                ExecutionContext::set_tenant(Some(Uuid::new_v4())).unwrap();
                panic!("unit blew up");
            }))
            .catch_unwind()
            .await;

            assert!(result.is_err());
            assert_eq!(ExecutionContext::current().tenant_id, Some(outer_tenant));
        })
        .await;
    }

    #[tokio::test]
    async fn test_restores_after_error() {
        let outer_tenant = Uuid::new_v4();
        ContextGuard::run(async move {
            ExecutionContext::set_tenant(Some(outer_tenant)).unwrap();

            let result: Result<(), &str> = ContextGuard::run(async {
                ExecutionContext::set_tenant(Some(Uuid::new_v4())).unwrap();
                Err("failed")
            })
            .await;

            assert!(result.is_err());
            assert_eq!(ExecutionContext::current().tenant_id, Some(outer_tenant));
        })
        .await;
    }

    #[test]
    fn test_run_sync() {
        let seen = ContextGuard::run_sync(|| {
            ExecutionContext::set_tenant(Some(Uuid::new_v4())).unwrap();
            ExecutionContext::current().tenant_id
        });
        assert!(seen.is_some());
        assert!(ExecutionContext::current().is_empty());
    }
}
