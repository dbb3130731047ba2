//! Scope contracts for units of work.
//!
//! A unit is either tenant-scoped or system-scoped, never both:
//!
//! - [`TenantScope`] units resolve their tenant from their own arguments and
//!   establish it before touching tenant data. Services obtain the tenant id
//!   for repository calls only through [`TenantScope::require_tenant`].
//! - [`SystemScope`] units do cross-tenant maintenance and must start with
//!   no tenant at all. A tenant leaking into one is a dispatch bug and
//!   fails with [`ContextError::UnexpectedContext`] before the body runs.

use std::future::Future;

use tracing::error;
use uuid::Uuid;

use crate::domain::errors::ContextError;

use super::execution_context::{ContextSnapshot, ExecutionContext};

pub struct TenantScope;

impl TenantScope {
    pub fn establish_tenant(tenant_id: Uuid) -> Result<(), ContextError> {
        ExecutionContext::set_tenant(Some(tenant_id))
    }

    pub fn establish_collective(collective_id: Uuid) -> Result<(), ContextError> {
        ExecutionContext::set_collective(Some(collective_id))
    }

    /// Establish the tenant and, when given, the collective of a unit.
    pub fn establish(tenant_id: Uuid, collective_id: Option<Uuid>) -> Result<(), ContextError> {
        Self::establish_tenant(tenant_id)?;
        if let Some(collective_id) = collective_id {
            Self::establish_collective(collective_id)?;
        }
        Ok(())
    }

    pub fn require_tenant() -> Result<Uuid, ContextError> {
        ExecutionContext::current()
            .tenant_id
            .ok_or_else(ContextError::missing_tenant)
    }

    pub fn require_collective() -> Result<Uuid, ContextError> {
        ExecutionContext::current()
            .collective_id
            .ok_or_else(ContextError::missing_collective)
    }

    pub fn clear_collective() -> Result<(), ContextError> {
        ExecutionContext::set_collective(None)
    }
}

pub struct SystemScope;

impl SystemScope {
    pub fn verify_no_tenant_context() -> Result<(), ContextError> {
        match ExecutionContext::current().tenant_id {
            Some(tenant_id) => {
                error!(%tenant_id, "tenant context leaked into a system-scoped unit");
                Err(ContextError::UnexpectedContext { tenant_id })
            }
            None => Ok(()),
        }
    }

    /// Run a system-scoped body after verifying there is no tenant.
    pub async fn run<F>(body: F) -> Result<F::Output, ContextError>
    where
        F: Future,
    {
        Self::verify_no_tenant_context()?;
        Ok(body.await)
    }

    /// Run `body` with `tenant_id` established; the tenant is gone again
    /// once `body` finishes, however it finishes.
    pub async fn with_tenant<F, Fut>(tenant_id: Uuid, body: F) -> Result<Fut::Output, ContextError>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        Self::enter(ContextSnapshot::for_tenant(tenant_id), body).await
    }

    pub async fn with_tenant_and_collective<F, Fut>(
        tenant_id: Uuid,
        collective_id: Uuid,
        body: F,
    ) -> Result<Fut::Output, ContextError>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let snapshot = ContextSnapshot::for_tenant(tenant_id).with_collective(Some(collective_id));
        Self::enter(snapshot, body).await
    }

    async fn enter<F, Fut>(snapshot: ContextSnapshot, body: F) -> Result<Fut::Output, ContextError>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        Self::verify_no_tenant_context()?;
        if !ExecutionContext::is_active() {
            return Err(ContextError::OutsideUnit);
        }
        snapshot.validate()?;
        Ok(ExecutionContext::scope(snapshot, body()).await)
    }
}
