//! In-memory reference implementation for Trellis storage traits.
//!
//! This adapter is deterministic and test-friendly. Production deployments
//! should use a transactional backend (PostgreSQL, behind the `postgres`
//! feature) for source-of-truth data.

use crate::traits::{
    AuditStore, InstanceStore, ProjectDirectory, QueryWindow, TemplateStore,
};
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use trellis_types::{
    AuditAppend, AuditEntry, ProjectId, TemplateVersion, TemplateVersionId, TenantId,
    WorkInstance, WorkInstanceId,
};
use uuid::Uuid;

type TemplateKey = (TenantId, TemplateVersionId);
type InstanceKey = (TenantId, WorkInstanceId);
type ProjectKey = (TenantId, ProjectId);

/// In-memory Trellis storage adapter.
#[derive(Default)]
pub struct InMemoryTrellisStore {
    templates: RwLock<HashMap<TemplateKey, TemplateVersion>>,
    referenced: RwLock<HashSet<TemplateKey>>,
    instances: RwLock<HashMap<InstanceKey, WorkInstance>>,
    audits: RwLock<HashMap<TenantId, Vec<AuditEntry>>>,
    projects: RwLock<HashSet<ProjectKey>>,
}

impl InMemoryTrellisStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateStore for InMemoryTrellisStore {
    async fn put_version(&self, version: TemplateVersion) -> StoreResult<()> {
        let referenced = self
            .referenced
            .read()
            .map_err(|_| StoreError::Backend("referenced lock poisoned".to_string()))?;
        let key = (version.tenant_id.clone(), version.id.clone());
        if referenced.contains(&key) {
            return Err(StoreError::Conflict(format!(
                "template version {} is referenced by an instance and immutable",
                version.id
            )));
        }
        drop(referenced);

        let mut guard = self
            .templates
            .write()
            .map_err(|_| StoreError::Backend("templates lock poisoned".to_string()))?;
        guard.insert(key, version);
        Ok(())
    }

    async fn get_version(
        &self,
        tenant_id: &TenantId,
        version_id: &TemplateVersionId,
    ) -> StoreResult<Option<TemplateVersion>> {
        let guard = self
            .templates
            .read()
            .map_err(|_| StoreError::Backend("templates lock poisoned".to_string()))?;
        Ok(guard
            .get(&(tenant_id.clone(), version_id.clone()))
            .cloned())
    }

    async fn mark_referenced(
        &self,
        tenant_id: &TenantId,
        version_id: &TemplateVersionId,
    ) -> StoreResult<()> {
        let templates = self
            .templates
            .read()
            .map_err(|_| StoreError::Backend("templates lock poisoned".to_string()))?;
        let key = (tenant_id.clone(), version_id.clone());
        if !templates.contains_key(&key) {
            return Err(StoreError::NotFound(format!(
                "template version {} not found",
                version_id
            )));
        }
        drop(templates);

        let mut referenced = self
            .referenced
            .write()
            .map_err(|_| StoreError::Backend("referenced lock poisoned".to_string()))?;
        referenced.insert(key);
        Ok(())
    }
}

#[async_trait]
impl InstanceStore for InMemoryTrellisStore {
    async fn create_instance(&self, instance: WorkInstance) -> StoreResult<()> {
        let mut guard = self
            .instances
            .write()
            .map_err(|_| StoreError::Backend("instances lock poisoned".to_string()))?;
        let key = (instance.tenant_id.clone(), instance.id.clone());
        if guard.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "instance {} already exists",
                instance.id
            )));
        }
        guard.insert(key, instance);
        Ok(())
    }

    async fn get_instance(
        &self,
        tenant_id: &TenantId,
        instance_id: &WorkInstanceId,
    ) -> StoreResult<Option<WorkInstance>> {
        let guard = self
            .instances
            .read()
            .map_err(|_| StoreError::Backend("instances lock poisoned".to_string()))?;
        Ok(guard
            .get(&(tenant_id.clone(), instance_id.clone()))
            .cloned())
    }

    async fn replace_instance(&self, instance: WorkInstance) -> StoreResult<()> {
        let mut guard = self
            .instances
            .write()
            .map_err(|_| StoreError::Backend("instances lock poisoned".to_string()))?;
        let key = (instance.tenant_id.clone(), instance.id.clone());
        if !guard.contains_key(&key) {
            return Err(StoreError::NotFound(format!(
                "instance {} not found",
                instance.id
            )));
        }
        guard.insert(key, instance);
        Ok(())
    }

    async fn list_for_project(
        &self,
        tenant_id: &TenantId,
        project_id: &ProjectId,
        window: QueryWindow,
    ) -> StoreResult<Vec<WorkInstance>> {
        let guard = self
            .instances
            .read()
            .map_err(|_| StoreError::Backend("instances lock poisoned".to_string()))?;
        let mut values = guard
            .values()
            .filter(|i| &i.tenant_id == tenant_id && &i.project_id == project_id)
            .cloned()
            .collect::<Vec<_>>();
        // Id tie-break keeps same-tick listings stable across calls.
        values.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        Ok(apply_window(values, window))
    }

    async fn count_for_project(
        &self,
        tenant_id: &TenantId,
        project_id: &ProjectId,
    ) -> StoreResult<usize> {
        let guard = self
            .instances
            .read()
            .map_err(|_| StoreError::Backend("instances lock poisoned".to_string()))?;
        Ok(guard
            .values()
            .filter(|i| &i.tenant_id == tenant_id && &i.project_id == project_id)
            .count())
    }
}

#[async_trait]
impl AuditStore for InMemoryTrellisStore {
    async fn append_audit(&self, event: AuditAppend) -> StoreResult<AuditEntry> {
        let mut guard = self
            .audits
            .write()
            .map_err(|_| StoreError::Backend("audit lock poisoned".to_string()))?;
        let chain = guard.entry(event.tenant_id.clone()).or_default();

        let previous_hash = chain.last().map(|e| e.hash.clone());
        let sequence = chain.len() as u64 + 1;
        let hash = compute_audit_hash(&event, previous_hash.as_deref(), sequence)?;

        let entry = AuditEntry {
            entry_id: format!("audit-{}", Uuid::new_v4()),
            sequence,
            action: event.action,
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            outcome: event.outcome,
            tenant_id: event.tenant_id,
            project_id: event.project_id,
            actor_id: event.actor_id,
            timestamp: event.timestamp,
            previous_hash,
            hash,
        };

        chain.push(entry.clone());
        Ok(entry)
    }

    async fn list_audit(
        &self,
        tenant_id: &TenantId,
        window: QueryWindow,
    ) -> StoreResult<Vec<AuditEntry>> {
        let guard = self
            .audits
            .read()
            .map_err(|_| StoreError::Backend("audit lock poisoned".to_string()))?;
        let mut values = guard.get(tenant_id).cloned().unwrap_or_default();
        values.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(apply_window(values, window))
    }

    async fn latest_audit_hash(&self, tenant_id: &TenantId) -> StoreResult<Option<String>> {
        let guard = self
            .audits
            .read()
            .map_err(|_| StoreError::Backend("audit lock poisoned".to_string()))?;
        Ok(guard
            .get(tenant_id)
            .and_then(|chain| chain.last())
            .map(|e| e.hash.clone()))
    }
}

#[async_trait]
impl ProjectDirectory for InMemoryTrellisStore {
    async fn register_project(
        &self,
        tenant_id: TenantId,
        project_id: ProjectId,
    ) -> StoreResult<()> {
        let mut guard = self
            .projects
            .write()
            .map_err(|_| StoreError::Backend("projects lock poisoned".to_string()))?;
        guard.insert((tenant_id, project_id));
        Ok(())
    }

    async fn project_exists(
        &self,
        tenant_id: &TenantId,
        project_id: &ProjectId,
    ) -> StoreResult<bool> {
        let guard = self
            .projects
            .read()
            .map_err(|_| StoreError::Backend("projects lock poisoned".to_string()))?;
        Ok(guard.contains(&(tenant_id.clone(), project_id.clone())))
    }
}

pub(crate) fn compute_audit_hash(
    event: &AuditAppend,
    previous_hash: Option<&str>,
    sequence: u64,
) -> StoreResult<String> {
    let serializable = serde_json::json!({
        "previous_hash": previous_hash,
        "sequence": sequence,
        "action": event.action,
        "entity_type": event.entity_type,
        "entity_id": event.entity_id,
        "outcome": event.outcome,
        "tenant_id": event.tenant_id.as_str(),
        "project_id": event.project_id.as_ref().map(|p| p.as_str()),
        "actor_id": event.actor_id.as_str(),
        "timestamp": event.timestamp,
    });
    let serialized =
        serde_json::to_vec(&serializable).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(blake3::hash(&serialized).to_hex().to_string())
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_types::{ActorId, FieldType, StepTemplate};

    fn sample_version(tenant: &str) -> TemplateVersion {
        TemplateVersion::new(TenantId::new(tenant), "Inspection", 1)
            .with_step(StepTemplate::new("s1", "Prep").with_field("qty", FieldType::Number))
    }

    fn sample_append(tenant: &str, action: &str) -> AuditAppend {
        AuditAppend::new(
            action,
            "step",
            "step-1",
            "ok",
            TenantId::new(tenant),
            ActorId::new("actor-1"),
        )
    }

    #[tokio::test]
    async fn version_lookup_is_tenant_scoped() {
        let store = InMemoryTrellisStore::new();
        let version = sample_version("t1");
        let id = version.id.clone();
        store.put_version(version).await.unwrap();

        assert!(store
            .get_version(&TenantId::new("t1"), &id)
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get_version(&TenantId::new("t2"), &id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn referenced_version_cannot_be_republished() {
        let store = InMemoryTrellisStore::new();
        let version = sample_version("t1");
        let id = version.id.clone();
        store.put_version(version.clone()).await.unwrap();

        store
            .mark_referenced(&TenantId::new("t1"), &id)
            .await
            .unwrap();

        let result = store.put_version(version).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn replace_requires_existing_instance() {
        let store = InMemoryTrellisStore::new();
        let version = sample_version("t1");
        let instance = WorkInstance::instantiate(
            TenantId::new("t1"),
            ProjectId::new("p1"),
            &version,
        );

        let result = store.replace_instance(instance.clone()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));

        store.create_instance(instance.clone()).await.unwrap();
        store.replace_instance(instance).await.unwrap();
    }

    #[tokio::test]
    async fn listing_filters_tenant_and_project() {
        let store = InMemoryTrellisStore::new();
        let version = sample_version("t1");
        for project in ["p1", "p1", "p2"] {
            let instance = WorkInstance::instantiate(
                TenantId::new("t1"),
                ProjectId::new(project),
                &version,
            );
            store.create_instance(instance).await.unwrap();
        }
        let foreign = WorkInstance::instantiate(
            TenantId::new("t2"),
            ProjectId::new("p1"),
            &version,
        );
        store.create_instance(foreign).await.unwrap();

        let listed = store
            .list_for_project(
                &TenantId::new("t1"),
                &ProjectId::new("p1"),
                QueryWindow::default(),
            )
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);

        let count = store
            .count_for_project(&TenantId::new("t1"), &ProjectId::new("p1"))
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn listing_orders_same_tick_instances_deterministically() {
        let store = InMemoryTrellisStore::new();
        let version = sample_version("t1");
        let stamp = chrono::Utc::now();

        let mut ids = Vec::new();
        for _ in 0..4 {
            let mut instance = WorkInstance::instantiate(
                TenantId::new("t1"),
                ProjectId::new("p1"),
                &version,
            );
            instance.created_at = stamp;
            ids.push(instance.id.clone());
            store.create_instance(instance).await.unwrap();
        }
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        let first: Vec<_> = store
            .list_for_project(
                &TenantId::new("t1"),
                &ProjectId::new("p1"),
                QueryWindow::default(),
            )
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(first, ids);

        let second: Vec<_> = store
            .list_for_project(
                &TenantId::new("t1"),
                &ProjectId::new("p1"),
                QueryWindow::default(),
            )
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn audit_chain_hashes_are_linked_per_tenant() {
        let store = InMemoryTrellisStore::new();
        let first = store.append_audit(sample_append("t1", "a")).await.unwrap();
        let second = store.append_audit(sample_append("t1", "b")).await.unwrap();
        let other = store.append_audit(sample_append("t2", "c")).await.unwrap();

        assert_eq!(second.previous_hash, Some(first.hash.clone()));
        assert_eq!(second.sequence, 2);

        // A different tenant starts its own chain.
        assert_eq!(other.previous_hash, None);
        assert_eq!(other.sequence, 1);

        assert_eq!(
            store.latest_audit_hash(&TenantId::new("t1")).await.unwrap(),
            Some(second.hash)
        );
    }

    #[tokio::test]
    async fn audit_listing_is_newest_first_and_windowed() {
        let store = InMemoryTrellisStore::new();
        for action in ["a", "b", "c"] {
            store.append_audit(sample_append("t1", action)).await.unwrap();
        }

        let all = store
            .list_audit(&TenantId::new("t1"), QueryWindow::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].action, "c");

        let windowed = store
            .list_audit(&TenantId::new("t1"), QueryWindow { limit: 1, offset: 1 })
            .await
            .unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].action, "b");
    }

    #[tokio::test]
    async fn project_directory_is_tenant_scoped() {
        let store = InMemoryTrellisStore::new();
        store
            .register_project(TenantId::new("t1"), ProjectId::new("p1"))
            .await
            .unwrap();

        assert!(store
            .project_exists(&TenantId::new("t1"), &ProjectId::new("p1"))
            .await
            .unwrap());
        assert!(!store
            .project_exists(&TenantId::new("t2"), &ProjectId::new("p1"))
            .await
            .unwrap());
    }
}
