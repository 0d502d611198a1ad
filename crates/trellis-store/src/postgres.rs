//! PostgreSQL adapter for Trellis storage.
//!
//! This adapter is the transactional source-of-truth backend. Aggregates
//! (template versions, work instances) are stored as JSONB documents with
//! the columns needed for tenant scoping and listing pulled out alongside.

use crate::memory::compute_audit_hash;
use crate::traits::{
    AuditStore, InstanceStore, ProjectDirectory, QueryWindow, TemplateStore,
};
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Acquire, Row};
use trellis_types::{
    AuditAppend, AuditEntry, ProjectId, TemplateVersion, TemplateVersionId, TenantId,
    WorkInstance, WorkInstanceId,
};
use uuid::Uuid;

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresTrellisStore {
    pool: PgPool,
}

impl PostgresTrellisStore {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StoreResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StoreResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS trellis_template_versions (
                tenant_id TEXT NOT NULL,
                version_id TEXT NOT NULL,
                doc JSONB NOT NULL,
                referenced BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (tenant_id, version_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS trellis_instances (
                tenant_id TEXT NOT NULL,
                instance_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                doc JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (tenant_id, instance_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS trellis_audit_entries (
                entry_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                sequence BIGINT NOT NULL,
                action TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                outcome TEXT NOT NULL,
                project_id TEXT,
                actor_id TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                previous_hash TEXT,
                hash TEXT NOT NULL,
                UNIQUE (tenant_id, sequence)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS trellis_projects (
                tenant_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                registered_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (tenant_id, project_id)
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl TemplateStore for PostgresTrellisStore {
    async fn put_version(&self, version: TemplateVersion) -> StoreResult<()> {
        let doc = serde_json::to_value(&version)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let conn = tx
            .acquire()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let referenced: Option<bool> = sqlx::query(
            r#"
            SELECT referenced FROM trellis_template_versions
             WHERE tenant_id = $1 AND version_id = $2
               FOR UPDATE
            "#,
        )
        .bind(version.tenant_id.as_str())
        .bind(version.id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
        .map(|row| row.try_get("referenced"))
        .transpose()
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        if referenced == Some(true) {
            return Err(StoreError::Conflict(format!(
                "template version {} is referenced by an instance and immutable",
                version.id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO trellis_template_versions (tenant_id, version_id, doc, referenced, created_at)
            VALUES ($1, $2, $3, FALSE, $4)
            ON CONFLICT (tenant_id, version_id) DO UPDATE SET
                doc = EXCLUDED.doc
            "#,
        )
        .bind(version.tenant_id.as_str())
        .bind(version.id.as_str())
        .bind(doc)
        .bind(version.created_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_version(
        &self,
        tenant_id: &TenantId,
        version_id: &TemplateVersionId,
    ) -> StoreResult<Option<TemplateVersion>> {
        let row = sqlx::query(
            r#"
            SELECT doc FROM trellis_template_versions
             WHERE tenant_id = $1 AND version_id = $2
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(version_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        row.map(|r| doc_column(&r)).transpose()
    }

    async fn mark_referenced(
        &self,
        tenant_id: &TenantId,
        version_id: &TemplateVersionId,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE trellis_template_versions
               SET referenced = TRUE
             WHERE tenant_id = $1 AND version_id = $2
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(version_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "template version {} not found",
                version_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl InstanceStore for PostgresTrellisStore {
    async fn create_instance(&self, instance: WorkInstance) -> StoreResult<()> {
        let doc = serde_json::to_value(&instance)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO trellis_instances
                (tenant_id, instance_id, project_id, doc, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(instance.tenant_id.as_str())
        .bind(instance.id.as_str())
        .bind(instance.project_id.as_str())
        .bind(doc)
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(())
    }

    async fn get_instance(
        &self,
        tenant_id: &TenantId,
        instance_id: &WorkInstanceId,
    ) -> StoreResult<Option<WorkInstance>> {
        let row = sqlx::query(
            r#"
            SELECT doc FROM trellis_instances
             WHERE tenant_id = $1 AND instance_id = $2
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(instance_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        row.map(|r| doc_column(&r)).transpose()
    }

    async fn replace_instance(&self, instance: WorkInstance) -> StoreResult<()> {
        let doc = serde_json::to_value(&instance)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE trellis_instances
               SET doc = $1,
                   updated_at = $2
             WHERE tenant_id = $3 AND instance_id = $4
            "#,
        )
        .bind(doc)
        .bind(instance.updated_at)
        .bind(instance.tenant_id.as_str())
        .bind(instance.id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "instance {} not found",
                instance.id
            )));
        }
        Ok(())
    }

    async fn list_for_project(
        &self,
        tenant_id: &TenantId,
        project_id: &ProjectId,
        window: QueryWindow,
    ) -> StoreResult<Vec<WorkInstance>> {
        let rows = if window.limit == 0 {
            sqlx::query(
                r#"
                SELECT doc FROM trellis_instances
                 WHERE tenant_id = $1 AND project_id = $2
                 ORDER BY created_at DESC, instance_id ASC
                 OFFSET $3
                "#,
            )
            .bind(tenant_id.as_str())
            .bind(project_id.as_str())
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT doc FROM trellis_instances
                 WHERE tenant_id = $1 AND project_id = $2
                 ORDER BY created_at DESC, instance_id ASC
                 LIMIT $3 OFFSET $4
                "#,
            )
            .bind(tenant_id.as_str())
            .bind(project_id.as_str())
            .bind(to_i64(window.limit)?)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
        };

        rows.iter().map(doc_column).collect()
    }

    async fn count_for_project(
        &self,
        tenant_id: &TenantId,
        project_id: &ProjectId,
    ) -> StoreResult<usize> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total FROM trellis_instances
             WHERE tenant_id = $1 AND project_id = $2
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(project_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let total: i64 = row
            .try_get("total")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(total as usize)
    }
}

#[async_trait]
impl AuditStore for PostgresTrellisStore {
    async fn append_audit(&self, event: AuditAppend) -> StoreResult<AuditEntry> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let conn = tx
            .acquire()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        sqlx::query("LOCK TABLE trellis_audit_entries IN EXCLUSIVE MODE")
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let last = sqlx::query(
            r#"
            SELECT sequence, hash FROM trellis_audit_entries
             WHERE tenant_id = $1
             ORDER BY sequence DESC
             LIMIT 1
            "#,
        )
        .bind(event.tenant_id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let (sequence, previous_hash) = if let Some(row) = last {
            let seq: i64 = row
                .try_get("sequence")
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let prev: String = row
                .try_get("hash")
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            (seq + 1, Some(prev))
        } else {
            (1_i64, None)
        };

        let hash = compute_audit_hash(&event, previous_hash.as_deref(), sequence as u64)?;
        let entry_id = format!("audit-{}", Uuid::new_v4());

        sqlx::query(
            r#"
            INSERT INTO trellis_audit_entries
                (entry_id, tenant_id, sequence, action, entity_type, entity_id, outcome,
                 project_id, actor_id, timestamp, previous_hash, hash)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(entry_id.clone())
        .bind(event.tenant_id.as_str())
        .bind(sequence)
        .bind(event.action.clone())
        .bind(event.entity_type.clone())
        .bind(event.entity_id.clone())
        .bind(event.outcome.clone())
        .bind(event.project_id.as_ref().map(|p| p.as_str().to_string()))
        .bind(event.actor_id.as_str())
        .bind(event.timestamp)
        .bind(previous_hash.clone())
        .bind(hash.clone())
        .execute(&mut *conn)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(AuditEntry {
            entry_id,
            sequence: sequence as u64,
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
        })
    }

    async fn list_audit(
        &self,
        tenant_id: &TenantId,
        window: QueryWindow,
    ) -> StoreResult<Vec<AuditEntry>> {
        let rows = if window.limit == 0 {
            sqlx::query(
                r#"
                SELECT entry_id, tenant_id, sequence, action, entity_type, entity_id, outcome,
                       project_id, actor_id, timestamp, previous_hash, hash
                  FROM trellis_audit_entries
                 WHERE tenant_id = $1
                 ORDER BY sequence DESC
                 OFFSET $2
                "#,
            )
            .bind(tenant_id.as_str())
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT entry_id, tenant_id, sequence, action, entity_type, entity_id, outcome,
                       project_id, actor_id, timestamp, previous_hash, hash
                  FROM trellis_audit_entries
                 WHERE tenant_id = $1
                 ORDER BY sequence DESC
                 LIMIT $2 OFFSET $3
                "#,
            )
            .bind(tenant_id.as_str())
            .bind(to_i64(window.limit)?)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
        };

        rows.into_iter().map(audit_row_to_entry).collect()
    }

    async fn latest_audit_hash(&self, tenant_id: &TenantId) -> StoreResult<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT hash FROM trellis_audit_entries
             WHERE tenant_id = $1
             ORDER BY sequence DESC
             LIMIT 1
            "#,
        )
        .bind(tenant_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(row
            .map(|r| r.try_get::<String, _>("hash"))
            .transpose()
            .map_err(|e| StoreError::Backend(e.to_string()))?)
    }
}

#[async_trait]
impl ProjectDirectory for PostgresTrellisStore {
    async fn register_project(
        &self,
        tenant_id: TenantId,
        project_id: ProjectId,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO trellis_projects (tenant_id, project_id, registered_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (tenant_id, project_id) DO NOTHING
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(project_id.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn project_exists(
        &self,
        tenant_id: &TenantId,
        project_id: &ProjectId,
    ) -> StoreResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 AS present FROM trellis_projects
             WHERE tenant_id = $1 AND project_id = $2
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(project_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(row.is_some())
    }
}

fn doc_column<T: serde::de::DeserializeOwned>(row: &sqlx::postgres::PgRow) -> StoreResult<T> {
    let doc: serde_json::Value = row
        .try_get("doc")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    serde_json::from_value(doc).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn audit_row_to_entry(row: sqlx::postgres::PgRow) -> StoreResult<AuditEntry> {
    let project_id: Option<String> = row
        .try_get("project_id")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(AuditEntry {
        entry_id: row
            .try_get("entry_id")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        sequence: row
            .try_get::<i64, _>("sequence")
            .map_err(|e| StoreError::Backend(e.to_string()))? as u64,
        action: row
            .try_get("action")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        entity_type: row
            .try_get("entity_type")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        entity_id: row
            .try_get("entity_id")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        outcome: row
            .try_get("outcome")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        tenant_id: TenantId::new(
            row.try_get::<String, _>("tenant_id")
                .map_err(|e| StoreError::Backend(e.to_string()))?,
        ),
        project_id: project_id.map(ProjectId::new),
        actor_id: trellis_types::ActorId::new(
            row.try_get::<String, _>("actor_id")
                .map_err(|e| StoreError::Backend(e.to_string()))?,
        ),
        timestamp: row
            .try_get("timestamp")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        previous_hash: row
            .try_get("previous_hash")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
        hash: row
            .try_get("hash")
            .map_err(|e| StoreError::Backend(e.to_string()))?,
    })
}

fn map_sqlx_conflict(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::Conflict(db_err.message().to_string());
        }
    }
    StoreError::Backend(err.to_string())
}

fn to_i64(value: usize) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::Backend("window value too large".to_string()))
}
