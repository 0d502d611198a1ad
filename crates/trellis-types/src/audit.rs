//! Append-only audit records.
//!
//! Every externally observable mutation (update, approval, export) emits
//! one entry after its transaction commits. Stored records are hash-linked
//! so tampering or silent truncation is detectable.

use crate::{ActorId, ProjectId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An audit event as submitted by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditAppend {
    /// Action name, e.g. `step.update`, `step.decide`, `deliverable.export`.
    pub action: String,
    /// Target entity type, e.g. `work_instance`, `step`.
    pub entity_type: String,
    pub entity_id: String,
    /// Outcome code: `ok`, `not_found`, `validation_failed`, `error`.
    pub outcome: String,
    pub tenant_id: TenantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    pub actor_id: ActorId,
    pub timestamp: DateTime<Utc>,
}

/// A stored audit entry: the append payload plus chain position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: String,
    /// Monotonically increasing per-tenant sequence, starting at 1.
    pub sequence: u64,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub outcome: String,
    pub tenant_id: TenantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    pub actor_id: ActorId,
    pub timestamp: DateTime<Utc>,
    /// Hash of the preceding entry in this tenant's chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    pub hash: String,
}

impl AuditAppend {
    pub fn new(
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        outcome: impl Into<String>,
        tenant_id: TenantId,
        actor_id: ActorId,
    ) -> Self {
        Self {
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            outcome: outcome.into(),
            tenant_id,
            project_id: None,
            actor_id,
            timestamp: Utc::now(),
        }
    }

    pub fn with_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_builder_sets_project() {
        let append = AuditAppend::new(
            "step.update",
            "step",
            "step-1",
            "ok",
            TenantId::new("t1"),
            ActorId::new("a1"),
        )
        .with_project(ProjectId::new("p1"));

        assert_eq!(append.project_id, Some(ProjectId::new("p1")));
        assert_eq!(append.outcome, "ok");
    }
}
