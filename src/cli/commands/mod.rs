//! CLI command implementations.

pub mod maintenance;
pub mod migrate;
pub mod rule;
pub mod run;
pub mod task;
pub mod worker;

use std::future::Future;

use anyhow::Result;
use uuid::Uuid;

use crate::services::{ContextGuard, TenantScope};

/// Run `body` as one unit of work scoped to `tenant_id`.
pub(crate) async fn in_tenant<T, Fut>(tenant_id: Uuid, collective_id: Option<Uuid>, body: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    ContextGuard::run(async move {
        TenantScope::establish(tenant_id, collective_id)?;
        body.await
    })
    .await
}
