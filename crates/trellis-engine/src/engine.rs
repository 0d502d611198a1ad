//! Engine orchestration over the storage traits.
//!
//! Mutating operations follow one discipline:
//! 1. load the instance aggregate (tenant-scoped),
//! 2. mutate a private clone,
//! 3. commit with a single `replace_instance` swap,
//! 4. audit the outcome after the swap (success and failure alike).
//!
//! The swap in step 3 is the transactional boundary: a failed swap leaves
//! the stored aggregate untouched, so a partial write is never observable.

use crate::attachments::{AttachmentSink, LoggingAttachmentSink};
use crate::audit::AuditTrail;
use crate::coerce::coerce;
use crate::context::TenantContext;
use crate::error::{EngineError, EngineResult};
use crate::export::{self, DeliverableDocument};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::info;
use trellis_store::{
    AuditStore, InstanceStore, ProjectDirectory, QueryWindow, TemplateStore, TrellisStore,
};
use trellis_types::{
    ActorId, Approval, AuditAppend, Decision, InstanceSummary, ProjectId, Step, StepId,
    StepStatus, StepTemplate, TemplateVersion, TemplateVersionId, TenantId, ValidationErrors,
    WorkInstance, WorkInstanceId,
};

// ── Requests and projections ─────────────────────────────────────────

/// Partial update applied to one step. Absent members are left unchanged;
/// all present members land in one atomic scope.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StepUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<ActorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_at: Option<DateTime<Utc>>,
    /// Raw values keyed by field key; coerced against the step's frozen
    /// schema snapshot. Ordered so application order is deterministic.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_values: BTreeMap<String, serde_json::Value>,
    /// Opaque payloads forwarded untouched to the attachment collaborator
    /// after the update commits.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<serde_json::Value>,
}

/// One approve/reject decision request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<ActorId>,
}

/// One page of instance summaries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstancePage {
    pub items: Vec<InstanceSummary>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

// ── Engine ───────────────────────────────────────────────────────────

/// The workflow engine. Cheap to clone; all state lives behind the
/// storage handles.
#[derive(Clone)]
pub struct Engine {
    templates: Arc<dyn TemplateStore>,
    instances: Arc<dyn InstanceStore>,
    projects: Arc<dyn ProjectDirectory>,
    attachments: Arc<dyn AttachmentSink>,
    audit: AuditTrail,
}

impl Engine {
    pub fn new(
        templates: Arc<dyn TemplateStore>,
        instances: Arc<dyn InstanceStore>,
        projects: Arc<dyn ProjectDirectory>,
        audit_store: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            templates,
            instances,
            projects,
            attachments: Arc::new(LoggingAttachmentSink),
            audit: AuditTrail::new(audit_store),
        }
    }

    /// Build an engine whose four storage roles are served by one store.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: TrellisStore + 'static,
    {
        Self::new(store.clone(), store.clone(), store.clone(), store)
    }

    pub fn with_attachment_sink(mut self, sink: Arc<dyn AttachmentSink>) -> Self {
        self.attachments = sink;
        self
    }

    // ── Template authoring ───────────────────────────────────────────

    /// Publish a template version under the caller's tenant.
    pub async fn publish_template(
        &self,
        ctx: &TenantContext,
        name: &str,
        version: u32,
        steps: Vec<StepTemplate>,
    ) -> EngineResult<TemplateVersion> {
        let result = self.publish_template_inner(ctx, name, version, steps).await;
        self.record(
            ctx,
            "template.publish",
            "template_version",
            result
                .as_ref()
                .map(|v| v.id.to_string())
                .unwrap_or_else(|_| format!("{name}@{version}")),
            None,
            outcome_of(&result),
        )
        .await;
        result
    }

    async fn publish_template_inner(
        &self,
        ctx: &TenantContext,
        name: &str,
        version: u32,
        steps: Vec<StepTemplate>,
    ) -> EngineResult<TemplateVersion> {
        validate_template(name, &steps)?;

        let mut template = TemplateVersion::new(ctx.tenant_id.clone(), name, version);
        template.steps = steps;
        self.templates.put_version(template.clone()).await?;

        info!(
            tenant_id = %ctx.tenant_id,
            template_version_id = %template.id,
            steps = template.step_count(),
            "published template version"
        );
        Ok(template)
    }

    // ── Projects ─────────────────────────────────────────────────────

    /// Register a project under the caller's tenant.
    pub async fn register_project(
        &self,
        ctx: &TenantContext,
        project_id: ProjectId,
    ) -> EngineResult<()> {
        let result = self
            .projects
            .register_project(ctx.tenant_id.clone(), project_id.clone())
            .await
            .map_err(EngineError::from);
        self.record(
            ctx,
            "project.register",
            "project",
            project_id.to_string(),
            Some(project_id),
            outcome_of(&result),
        )
        .await;
        result
    }

    // ── Instantiation ────────────────────────────────────────────────

    /// Bind a template version to a project, materializing a work instance
    /// with a frozen copy of every step's field schema.
    pub async fn create_instance(
        &self,
        ctx: &TenantContext,
        project_id: ProjectId,
        template_version_id: &TemplateVersionId,
    ) -> EngineResult<WorkInstance> {
        let result = self
            .create_instance_inner(ctx, project_id.clone(), template_version_id)
            .await;
        self.record(
            ctx,
            "instance.create",
            "work_instance",
            result
                .as_ref()
                .map(|i| i.id.to_string())
                .unwrap_or_else(|_| template_version_id.to_string()),
            Some(project_id),
            outcome_of(&result),
        )
        .await;
        result
    }

    async fn create_instance_inner(
        &self,
        ctx: &TenantContext,
        project_id: ProjectId,
        template_version_id: &TemplateVersionId,
    ) -> EngineResult<WorkInstance> {
        if !self
            .projects
            .project_exists(&ctx.tenant_id, &project_id)
            .await?
        {
            return Err(EngineError::NotFound(format!(
                "project {project_id} not found"
            )));
        }

        let template = self
            .templates
            .get_version(&ctx.tenant_id, template_version_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "template version {template_version_id} not found"
                ))
            })?;

        let instance = WorkInstance::instantiate(ctx.tenant_id.clone(), project_id, &template);
        self.instances.create_instance(instance.clone()).await?;
        self.templates
            .mark_referenced(&ctx.tenant_id, template_version_id)
            .await?;

        info!(
            tenant_id = %ctx.tenant_id,
            instance_id = %instance.id,
            template_version_id = %template_version_id,
            "created work instance"
        );
        Ok(instance)
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub async fn get_instance(
        &self,
        ctx: &TenantContext,
        instance_id: &WorkInstanceId,
    ) -> EngineResult<WorkInstance> {
        self.load_instance(&ctx.tenant_id, instance_id).await
    }

    /// Page through a project's instances, newest-first.
    pub async fn list_instances(
        &self,
        ctx: &TenantContext,
        project_id: &ProjectId,
        page: usize,
        per_page: usize,
    ) -> EngineResult<InstancePage> {
        if !self
            .projects
            .project_exists(&ctx.tenant_id, project_id)
            .await?
        {
            return Err(EngineError::NotFound(format!(
                "project {project_id} not found"
            )));
        }

        let window = QueryWindow::page(page, per_page);
        let items = self
            .instances
            .list_for_project(&ctx.tenant_id, project_id, window)
            .await?
            .iter()
            .map(WorkInstance::summary)
            .collect();
        let total = self
            .instances
            .count_for_project(&ctx.tenant_id, project_id)
            .await?;

        Ok(InstancePage {
            items,
            total,
            page: page.max(1),
            per_page,
        })
    }

    // ── Step updates ─────────────────────────────────────────────────

    /// Apply a partial update to one step. Status stamps, assignment,
    /// deadline, and field-value coercion land in one atomic swap.
    pub async fn update_step(
        &self,
        ctx: &TenantContext,
        instance_id: &WorkInstanceId,
        step_id: &StepId,
        update: StepUpdate,
    ) -> EngineResult<Step> {
        let attachments = update.attachments.clone();
        let result = self
            .update_step_inner(ctx, instance_id, step_id, update)
            .await;
        let project_id = result.as_ref().ok().map(|(project_id, _)| project_id.clone());
        self.record(
            ctx,
            "step.update",
            "step",
            step_id.to_string(),
            project_id,
            outcome_of(&result),
        )
        .await;

        let (_, step) = result?;
        if !attachments.is_empty() {
            self.attachments.forward(ctx, step_id, &attachments).await;
        }
        Ok(step)
    }

    async fn update_step_inner(
        &self,
        ctx: &TenantContext,
        instance_id: &WorkInstanceId,
        step_id: &StepId,
        update: StepUpdate,
    ) -> EngineResult<(ProjectId, Step)> {
        let mut instance = self.load_instance(&ctx.tenant_id, instance_id).await?;
        let now = Utc::now();

        let step = instance
            .step_mut(step_id)
            .ok_or_else(|| EngineError::NotFound(format!("step {step_id} not found")))?;

        if let Some(status) = update.status {
            step.set_status(status, now);
        }
        if let Some(assignee) = update.assignee_id {
            step.assignee_id = Some(assignee);
        }
        if let Some(deadline) = update.deadline_at {
            step.deadline_at = Some(deadline);
        }
        for (field_key, raw) in &update.field_values {
            let value = coerce(raw, step.declared_type(field_key));
            step.upsert_value(field_key, value, now);
        }

        let updated_step = step.clone();
        instance.recompute_status();
        instance.touch(now);

        self.instances.replace_instance(instance.clone()).await?;
        Ok((instance.project_id, updated_step))
    }

    // ── Approvals ────────────────────────────────────────────────────

    /// Record an approve/reject decision: one immutable approval row plus
    /// the step's terminal status, committed together.
    pub async fn decide(
        &self,
        ctx: &TenantContext,
        instance_id: &WorkInstanceId,
        step_id: &StepId,
        request: DecisionRequest,
    ) -> EngineResult<Approval> {
        let result = self.decide_inner(ctx, instance_id, step_id, request).await;
        let project_id = result.as_ref().ok().map(|(project_id, _)| project_id.clone());
        self.record(
            ctx,
            "step.decide",
            "step",
            step_id.to_string(),
            project_id,
            outcome_of(&result),
        )
        .await;
        result.map(|(_, approval)| approval)
    }

    async fn decide_inner(
        &self,
        ctx: &TenantContext,
        instance_id: &WorkInstanceId,
        step_id: &StepId,
        request: DecisionRequest,
    ) -> EngineResult<(ProjectId, Approval)> {
        let mut instance = self.load_instance(&ctx.tenant_id, instance_id).await?;
        let now = Utc::now();

        let step = instance
            .step_mut(step_id)
            .ok_or_else(|| EngineError::NotFound(format!("step {step_id} not found")))?;

        let requested_by = request.requested_by.or_else(|| step.assignee_id.clone());
        let mut approval = Approval::new(
            step_id.clone(),
            request.decision,
            ctx.actor_id.clone(),
            now,
        );
        if let Some(comment) = request.comment {
            approval = approval.with_comment(comment);
        }
        if let Some(requested_by) = requested_by {
            approval = approval.with_requested_by(requested_by);
        }

        step.approvals.push(approval.clone());
        step.set_status(request.decision.step_status(), now);

        instance.recompute_status();
        instance.touch(now);

        self.instances.replace_instance(instance.clone()).await?;
        Ok((instance.project_id, approval))
    }

    // ── Export ───────────────────────────────────────────────────────

    /// Export the deliverable projection. Read-only apart from the audit
    /// entry recording the export event.
    pub async fn export(
        &self,
        ctx: &TenantContext,
        instance_id: &WorkInstanceId,
    ) -> EngineResult<DeliverableDocument> {
        let result = self
            .load_instance(&ctx.tenant_id, instance_id)
            .await
            .map(|instance| (instance.project_id.clone(), export::render(&instance, Utc::now())));
        let project_id = result.as_ref().ok().map(|(project_id, _)| project_id.clone());
        self.record(
            ctx,
            "deliverable.export",
            "work_instance",
            instance_id.to_string(),
            project_id,
            outcome_of(&result),
        )
        .await;
        result.map(|(_, document)| document)
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn load_instance(
        &self,
        tenant_id: &TenantId,
        instance_id: &WorkInstanceId,
    ) -> EngineResult<WorkInstance> {
        self.instances
            .get_instance(tenant_id, instance_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("instance {instance_id} not found")))
    }

    async fn record(
        &self,
        ctx: &TenantContext,
        action: &str,
        entity_type: &str,
        entity_id: String,
        project_id: Option<ProjectId>,
        outcome: &str,
    ) {
        let mut event = AuditAppend::new(
            action,
            entity_type,
            entity_id,
            outcome,
            ctx.tenant_id.clone(),
            ctx.actor_id.clone(),
        );
        if let Some(project_id) = project_id {
            event = event.with_project(project_id);
        }
        self.audit.record(event).await;
    }
}

fn outcome_of<T>(result: &EngineResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(err) => err.outcome_code(),
    }
}

fn validate_template(name: &str, steps: &[StepTemplate]) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if name.trim().is_empty() {
        errors.push("name", "must not be empty");
    }

    let mut seen_steps = HashSet::new();
    for step in steps {
        if !seen_steps.insert(step.step_key.as_str()) {
            errors.push("steps", format!("duplicate step key `{}`", step.step_key));
        }
        let mut seen_fields = HashSet::new();
        for field in &step.schema.fields {
            if !seen_fields.insert(field.field_key.as_str()) {
                errors.push(
                    "steps",
                    format!(
                        "duplicate field key `{}` in step `{}`",
                        field.field_key, step.step_key
                    ),
                );
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
