use crate::StoreResult;
use async_trait::async_trait;
use trellis_types::{
    AuditAppend, AuditEntry, ProjectId, TemplateVersion, TemplateVersionId, TenantId,
    WorkInstance, WorkInstanceId,
};

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn page(page: usize, per_page: usize) -> Self {
        Self {
            limit: per_page,
            offset: page.saturating_sub(1).saturating_mul(per_page),
        }
    }
}

/// Storage interface for immutable template versions.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Publish a version. Replacing a version already referenced by an
    /// instance is a conflict; referenced schemas never change.
    async fn put_version(&self, version: TemplateVersion) -> StoreResult<()>;

    /// Tenant-scoped lookup; `None` covers both "missing" and
    /// "exists under another tenant".
    async fn get_version(
        &self,
        tenant_id: &TenantId,
        version_id: &TemplateVersionId,
    ) -> StoreResult<Option<TemplateVersion>>;

    /// Record that an instance now references this version, locking its
    /// schema forever.
    async fn mark_referenced(
        &self,
        tenant_id: &TenantId,
        version_id: &TemplateVersionId,
    ) -> StoreResult<()>;
}

/// Storage interface for work instances.
///
/// `replace_instance` swaps the whole aggregate in one operation; the
/// engine mutates a clone and commits with a single swap, which is the
/// all-or-nothing transactional boundary for `update_step` and `decide`.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn create_instance(&self, instance: WorkInstance) -> StoreResult<()>;

    async fn get_instance(
        &self,
        tenant_id: &TenantId,
        instance_id: &WorkInstanceId,
    ) -> StoreResult<Option<WorkInstance>>;

    /// Atomically replace the stored aggregate. Fails with `NotFound` if
    /// the instance does not exist under the instance's tenant.
    async fn replace_instance(&self, instance: WorkInstance) -> StoreResult<()>;

    /// Instances for one project, newest-first.
    async fn list_for_project(
        &self,
        tenant_id: &TenantId,
        project_id: &ProjectId,
        window: QueryWindow,
    ) -> StoreResult<Vec<WorkInstance>>;

    async fn count_for_project(
        &self,
        tenant_id: &TenantId,
        project_id: &ProjectId,
    ) -> StoreResult<usize>;
}

/// Storage interface for append-only audit chains, one per tenant.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append an event and return the canonical, hash-linked stored entry.
    async fn append_audit(&self, event: AuditAppend) -> StoreResult<AuditEntry>;

    /// Read a tenant's entries newest-first.
    async fn list_audit(
        &self,
        tenant_id: &TenantId,
        window: QueryWindow,
    ) -> StoreResult<Vec<AuditEntry>>;

    /// The latest hash anchor of a tenant's chain.
    async fn latest_audit_hash(&self, tenant_id: &TenantId) -> StoreResult<Option<String>>;
}

/// Directory of known projects. Stands in for the surrounding
/// project-management application; the engine only asks whether a project
/// resolves under a tenant.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn register_project(
        &self,
        tenant_id: TenantId,
        project_id: ProjectId,
    ) -> StoreResult<()>;

    async fn project_exists(
        &self,
        tenant_id: &TenantId,
        project_id: &ProjectId,
    ) -> StoreResult<bool>;
}

/// Unified storage bundle consumed by the engine and daemon.
pub trait TrellisStore:
    TemplateStore + InstanceStore + AuditStore + ProjectDirectory + Send + Sync
{
}

impl<T> TrellisStore for T where
    T: TemplateStore + InstanceStore + AuditStore + ProjectDirectory + Send + Sync
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_translates_to_offset() {
        let w = QueryWindow::page(1, 25);
        assert_eq!((w.limit, w.offset), (25, 0));

        let w = QueryWindow::page(3, 10);
        assert_eq!((w.limit, w.offset), (10, 20));

        // Page 0 is treated as page 1.
        let w = QueryWindow::page(0, 10);
        assert_eq!(w.offset, 0);
    }
}
