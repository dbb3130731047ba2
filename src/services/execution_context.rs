//! Ambient per-unit execution context.
//!
//! Holds the identifiers (tenant, collective, automation run, agent task
//! run) of the unit of work currently executing. The store is task-local:
//! each unit entered through [`ContextGuard`](super::context_guard::ContextGuard)
//! gets its own empty instance, so concurrent units on the same worker
//! thread never observe each other, and leaving the unit restores whatever
//! the caller had.
//!
//! Mutation is only possible inside a guarded unit. Reads outside one see
//! an empty snapshot.

use std::cell::RefCell;
use std::future::Future;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::errors::ContextError;

tokio::task_local! {
    static CURRENT: RefCell<ContextSnapshot>;
}

/// Value copy of the execution context at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContextSnapshot {
    pub tenant_id: Option<Uuid>,
    pub collective_id: Option<Uuid>,
    pub automation_run_id: Option<Uuid>,
    pub agent_task_run_id: Option<Uuid>,
}

impl ContextSnapshot {
    pub fn for_tenant(tenant_id: Uuid) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            ..Self::default()
        }
    }

    pub fn with_collective(mut self, collective_id: Option<Uuid>) -> Self {
        self.collective_id = collective_id;
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// A collective is only meaningful inside a tenant.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.collective_id.is_some() && self.tenant_id.is_none() {
            return Err(ContextError::missing_tenant());
        }
        Ok(())
    }
}

/// Accessors for the current unit's context.
pub struct ExecutionContext;

impl ExecutionContext {
    /// Snapshot of the current context; empty outside a guarded unit.
    pub fn current() -> ContextSnapshot {
        CURRENT.try_with(|cell| *cell.borrow()).unwrap_or_default()
    }

    /// Whether the caller is inside a guarded unit.
    pub fn is_active() -> bool {
        CURRENT.try_with(|_| ()).is_ok()
    }

    /// Replace every field at once.
    pub fn set(snapshot: ContextSnapshot) -> Result<(), ContextError> {
        snapshot.validate()?;
        Self::update(|current| *current = snapshot)
    }

    /// Set or clear the tenant. Clearing the tenant also clears the collective.
    pub fn set_tenant(tenant_id: Option<Uuid>) -> Result<(), ContextError> {
        Self::update(|current| {
            if tenant_id != current.tenant_id {
                current.collective_id = None;
            }
            current.tenant_id = tenant_id;
        })
    }

    /// Set or clear the collective; setting one requires a tenant.
    pub fn set_collective(collective_id: Option<Uuid>) -> Result<(), ContextError> {
        let mut candidate = Self::current_in_unit()?;
        candidate.collective_id = collective_id;
        candidate.validate()?;
        Self::update(|current| current.collective_id = collective_id)
    }

    pub fn set_automation_run(run_id: Option<Uuid>) -> Result<(), ContextError> {
        Self::update(|current| current.automation_run_id = run_id)
    }

    pub fn set_agent_task_run(run_id: Option<Uuid>) -> Result<(), ContextError> {
        Self::update(|current| current.agent_task_run_id = run_id)
    }

    /// Reset every field to empty.
    pub fn clear() -> Result<(), ContextError> {
        Self::update(|current| *current = ContextSnapshot::default())
    }

    /// Run `unit` with a fresh context initialised to `initial`.
    ///
    /// The caller's context is untouched while `unit` runs and is visible
    /// again once it completes, panics, or is dropped.
    pub(crate) async fn scope<F>(initial: ContextSnapshot, unit: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(RefCell::new(initial), unit).await
    }

    /// Synchronous counterpart of [`ExecutionContext::scope`].
    pub(crate) fn sync_scope<F, R>(initial: ContextSnapshot, unit: F) -> R
    where
        F: FnOnce() -> R,
    {
        CURRENT.sync_scope(RefCell::new(initial), unit)
    }

    fn current_in_unit() -> Result<ContextSnapshot, ContextError> {
        CURRENT
            .try_with(|cell| *cell.borrow())
            .map_err(|_| ContextError::OutsideUnit)
    }

    fn update(f: impl FnOnce(&mut ContextSnapshot)) -> Result<(), ContextError> {
        CURRENT
            .try_with(|cell| f(&mut cell.borrow_mut()))
            .map_err(|_| ContextError::OutsideUnit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_outside_unit_is_empty() {
        assert!(ExecutionContext::current().is_empty());
        assert!(!ExecutionContext::is_active());
    }

    #[test]
    fn test_mutation_outside_unit_fails() {
        assert_eq!(
            ExecutionContext::set_tenant(Some(Uuid::new_v4())),
            Err(ContextError::OutsideUnit)
        );
        assert_eq!(ExecutionContext::clear(), Err(ContextError::OutsideUnit));
    }

    #[tokio::test]
    async fn test_set_and_clear() {
        let tenant = Uuid::new_v4();
        let run = Uuid::new_v4();
        ExecutionContext::scope(ContextSnapshot::default(), async move {
            ExecutionContext::set_tenant(Some(tenant)).unwrap();
            ExecutionContext::set_automation_run(Some(run)).unwrap();

            let snapshot = ExecutionContext::current();
            assert_eq!(snapshot.tenant_id, Some(tenant));
            assert_eq!(snapshot.automation_run_id, Some(run));

            ExecutionContext::clear().unwrap();
            assert!(ExecutionContext::current().is_empty());
        })
        .await;
    }

    #[tokio::test]
    async fn test_collective_requires_tenant() {
        ExecutionContext::scope(ContextSnapshot::default(), async {
            assert_eq!(
                ExecutionContext::set_collective(Some(Uuid::new_v4())),
                Err(ContextError::missing_tenant())
            );

            let bad = ContextSnapshot {
                collective_id: Some(Uuid::new_v4()),
                ..ContextSnapshot::default()
            };
            assert!(ExecutionContext::set(bad).is_err());
        })
        .await;
    }

    #[tokio::test]
    async fn test_changing_tenant_drops_collective() {
        let collective = Uuid::new_v4();
        ExecutionContext::scope(ContextSnapshot::default(), async move {
            ExecutionContext::set_tenant(Some(Uuid::new_v4())).unwrap();
            ExecutionContext::set_collective(Some(collective)).unwrap();
            assert_eq!(ExecutionContext::current().collective_id, Some(collective));

            ExecutionContext::set_tenant(None).unwrap();
            let snapshot = ExecutionContext::current();
            assert_eq!(snapshot.tenant_id, None);
            assert_eq!(snapshot.collective_id, None);
        })
        .await;
    }

    #[test]
    fn test_sync_scope_restores_outer() {
        let outer = ContextSnapshot::for_tenant(Uuid::new_v4());
        ExecutionContext::sync_scope(outer, || {
            ExecutionContext::sync_scope(ContextSnapshot::default(), || {
                assert!(ExecutionContext::current().is_empty());
            });
            assert_eq!(ExecutionContext::current(), outer);
        });
    }
}
