//! Work instances: executions of a template version against one project.
//!
//! An instance's step set is fixed at creation. Each step carries a frozen
//! snapshot of its field schema taken from the template version at
//! instantiation time; the snapshot, not the live template, governs typing
//! for the lifetime of the step.

use crate::{
    ActorId, Approval, FieldSchema, FieldType, FieldValue, ProjectId, StepId, StepTemplate,
    TemplateVersion, TemplateVersionId, TenantId, TypedValue, WorkInstanceId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Step Status ──────────────────────────────────────────────────────

/// The lifecycle of a single step.
///
/// `pending -> in_progress -> {completed, blocked}`; `completed` reaches
/// `approved`/`rejected` through the approval ledger. A `rejected` step may
/// be set back to `in_progress` by a caller-supplied status update
/// (resubmission); the engine deliberately does not forbid that transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Blocked,
    Approved,
    Rejected,
}

impl StepStatus {
    /// Terminal from the engine's own perspective.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// Statuses that stamp `completed_at` when entered.
    pub fn is_completion(&self) -> bool {
        matches!(self, Self::Completed | Self::Approved | Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Step ─────────────────────────────────────────────────────────────

/// One unit of work inside an instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    /// Copied from the template at creation; immutable afterwards.
    pub step_key: String,
    pub name: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<ActorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Frozen schema snapshot; governs value typing for this step forever.
    pub schema: FieldSchema,
    /// At most one entry per field key (upsert semantics).
    pub values: Vec<FieldValue>,
    /// Immutable decision records, oldest first.
    pub approvals: Vec<Approval>,
}

impl Step {
    /// Materialize a step from its template declaration, deep-copying the
    /// field schema into the frozen snapshot.
    pub fn from_template(template: &StepTemplate) -> Self {
        Self {
            id: StepId::generate(),
            step_key: template.step_key.clone(),
            name: template.name.clone(),
            status: StepStatus::Pending,
            assignee_id: None,
            deadline_at: None,
            started_at: None,
            completed_at: None,
            schema: template.schema.clone(),
            values: Vec::new(),
            approvals: Vec::new(),
        }
    }

    /// Apply a status transition, stamping lifecycle timestamps.
    pub fn set_status(&mut self, status: StepStatus, now: DateTime<Utc>) {
        if status == StepStatus::InProgress && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if status.is_completion() {
            self.completed_at = Some(now);
        }
        self.status = status;
    }

    /// Declared type for a field key; keys absent from the frozen snapshot
    /// default to `string` (swallow-unknown-field behavior, preserved).
    pub fn declared_type(&self, field_key: &str) -> FieldType {
        self.schema.field_type(field_key).unwrap_or(FieldType::String)
    }

    /// Replace-or-insert the value for a field key. Never duplicates a key;
    /// the second write replaces the first in place.
    pub fn upsert_value(&mut self, field_key: &str, value: TypedValue, now: DateTime<Utc>) {
        match self.values.iter_mut().find(|v| v.field_key == field_key) {
            Some(existing) => {
                existing.value = value;
                existing.updated_at = now;
            }
            None => self
                .values
                .push(FieldValue::new(field_key, value, now)),
        }
    }

    pub fn value(&self, field_key: &str) -> Option<&FieldValue> {
        self.values.iter().find(|v| v.field_key == field_key)
    }

    /// Values ordered by field key; the deliverable traversal order.
    pub fn values_by_key(&self) -> Vec<&FieldValue> {
        let mut out: Vec<&FieldValue> = self.values.iter().collect();
        out.sort_by(|a, b| a.field_key.cmp(&b.field_key));
        out
    }

    pub fn latest_approval(&self) -> Option<&Approval> {
        self.approvals.last()
    }
}

// ── Work Instance ────────────────────────────────────────────────────

/// Overall instance status, derived from step states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    #[default]
    Active,
    Completed,
}

/// A single execution of a template version against one project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkInstance {
    pub id: WorkInstanceId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub template_version_id: TemplateVersionId,
    pub template_name: String,
    pub status: InstanceStatus,
    /// Fixed at creation; content evolves, membership does not.
    pub steps: Vec<Step>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkInstance {
    /// Create an instance from a template version, materializing every step
    /// with a frozen copy of its field schema. This is the only place
    /// schema is snapshotted.
    pub fn instantiate(
        tenant_id: TenantId,
        project_id: ProjectId,
        template: &TemplateVersion,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: WorkInstanceId::generate(),
            tenant_id,
            project_id,
            template_version_id: template.id.clone(),
            template_name: template.name.clone(),
            status: InstanceStatus::Active,
            steps: template.steps.iter().map(Step::from_template).collect(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn step(&self, step_id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &StepId) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| &s.id == step_id)
    }

    /// Recompute the derived overall status; `completed` once every step
    /// has been approved.
    pub fn recompute_status(&mut self) {
        let all_approved = !self.steps.is_empty()
            && self.steps.iter().all(|s| s.status == StepStatus::Approved);
        self.status = if all_approved {
            InstanceStatus::Completed
        } else {
            InstanceStatus::Active
        };
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub fn summary(&self) -> InstanceSummary {
        InstanceSummary {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            template_version_id: self.template_version_id.clone(),
            template_name: self.template_name.clone(),
            status: self.status,
            step_count: self.steps.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Listing projection: step count plus minimal template identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub id: WorkInstanceId,
    pub project_id: ProjectId,
    pub template_version_id: TemplateVersionId,
    pub template_name: String,
    pub status: InstanceStatus,
    pub step_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldSpec;

    fn sample_template() -> TemplateVersion {
        TemplateVersion::new(TenantId::new("t1"), "Punch List", 1)
            .with_step(
                StepTemplate::new("s1", "Walkthrough").with_field("qty", FieldType::Number),
            )
            .with_step(StepTemplate::new("s2", "Signoff"))
    }

    #[test]
    fn instantiation_freezes_schema_copies() {
        let mut template = sample_template();
        let instance = WorkInstance::instantiate(
            TenantId::new("t1"),
            ProjectId::new("p1"),
            &template,
        );

        assert_eq!(instance.steps.len(), 2);
        assert_eq!(instance.steps[0].step_key, "s1");
        assert_eq!(instance.steps[0].status, StepStatus::Pending);

        // Mutating the template afterwards must not affect the snapshot.
        template.steps[0].schema.fields[0] = FieldSpec::new("qty", FieldType::String);
        assert_eq!(
            instance.steps[0].declared_type("qty"),
            FieldType::Number
        );
    }

    #[test]
    fn status_stamps_started_and_completed() {
        let template = sample_template();
        let mut instance =
            WorkInstance::instantiate(TenantId::new("t1"), ProjectId::new("p1"), &template);
        let now = Utc::now();

        let step = &mut instance.steps[0];
        step.set_status(StepStatus::InProgress, now);
        assert_eq!(step.started_at, Some(now));

        // started_at is stamped once, not refreshed.
        let later = now + chrono::Duration::seconds(60);
        step.set_status(StepStatus::InProgress, later);
        assert_eq!(step.started_at, Some(now));

        step.set_status(StepStatus::Completed, later);
        assert_eq!(step.completed_at, Some(later));
    }

    #[test]
    fn rejected_step_can_resume_in_progress() {
        let template = sample_template();
        let mut instance =
            WorkInstance::instantiate(TenantId::new("t1"), ProjectId::new("p1"), &template);
        let now = Utc::now();

        let step = &mut instance.steps[0];
        step.set_status(StepStatus::InProgress, now);
        step.set_status(StepStatus::Rejected, now);
        assert!(step.status.is_terminal());

        step.set_status(StepStatus::InProgress, now);
        assert_eq!(step.status, StepStatus::InProgress);
    }

    #[test]
    fn upsert_replaces_in_place() {
        let template = sample_template();
        let mut instance =
            WorkInstance::instantiate(TenantId::new("t1"), ProjectId::new("p1"), &template);
        let now = Utc::now();

        let step = &mut instance.steps[0];
        step.upsert_value("qty", TypedValue::Number(1.0), now);
        step.upsert_value("qty", TypedValue::Number(2.0), now);

        assert_eq!(step.values.len(), 1);
        assert_eq!(step.value("qty").unwrap().value, TypedValue::Number(2.0));
    }

    #[test]
    fn values_by_key_sorts_deterministically() {
        let template = sample_template();
        let mut instance =
            WorkInstance::instantiate(TenantId::new("t1"), ProjectId::new("p1"), &template);
        let now = Utc::now();

        let step = &mut instance.steps[0];
        step.upsert_value("zeta", TypedValue::Text("z".into()), now);
        step.upsert_value("alpha", TypedValue::Text("a".into()), now);

        let keys: Vec<&str> = step
            .values_by_key()
            .iter()
            .map(|v| v.field_key.as_str())
            .collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
    }

    #[test]
    fn instance_completes_when_all_steps_approved() {
        let template = sample_template();
        let mut instance =
            WorkInstance::instantiate(TenantId::new("t1"), ProjectId::new("p1"), &template);
        let now = Utc::now();

        instance.recompute_status();
        assert_eq!(instance.status, InstanceStatus::Active);

        for step in &mut instance.steps {
            step.set_status(StepStatus::Approved, now);
        }
        instance.recompute_status();
        assert_eq!(instance.status, InstanceStatus::Completed);
    }

    #[test]
    fn summary_carries_template_identity() {
        let template = sample_template();
        let instance =
            WorkInstance::instantiate(TenantId::new("t1"), ProjectId::new("p1"), &template);
        let summary = instance.summary();
        assert_eq!(summary.step_count, 2);
        assert_eq!(summary.template_name, "Punch List");
        assert_eq!(summary.template_version_id, template.id);
    }
}
