//! Versioned templates: reusable multi-step procedure definitions.
//!
//! A TemplateVersion is an immutable published revision. Once any work
//! instance references it, its step/field schema must never change; new
//! requirements require publishing a new version.

use crate::{FieldSchema, FieldSpec, FieldType, TemplateVersionId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One step declaration inside a template version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTemplate {
    /// Stable key, copied verbatim into every instantiated step.
    pub step_key: String,
    /// Human-readable name.
    pub name: String,
    /// Ordered field schema; the source of each step's frozen snapshot.
    pub schema: FieldSchema,
}

impl StepTemplate {
    pub fn new(step_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            step_key: step_key.into(),
            name: name.into(),
            schema: FieldSchema::default(),
        }
    }

    pub fn with_field(mut self, field_key: impl Into<String>, field_type: FieldType) -> Self {
        self.schema.fields.push(FieldSpec::new(field_key, field_type));
        self
    }
}

/// An immutable published revision of a template.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateVersion {
    pub id: TemplateVersionId,
    pub tenant_id: TenantId,
    /// Template identity carried into instance summaries and exports.
    pub name: String,
    /// Monotonic revision number within the template.
    pub version: u32,
    /// Ordered step declarations.
    pub steps: Vec<StepTemplate>,
    pub created_at: DateTime<Utc>,
}

impl TemplateVersion {
    pub fn new(tenant_id: TenantId, name: impl Into<String>, version: u32) -> Self {
        Self {
            id: TemplateVersionId::generate(),
            tenant_id,
            name: name.into(),
            version,
            steps: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_step(mut self, step: StepTemplate) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_ordered_steps() {
        let version = TemplateVersion::new(TenantId::new("t1"), "Site Inspection", 1)
            .with_step(
                StepTemplate::new("prep", "Preparation")
                    .with_field("crew_size", FieldType::Number)
                    .with_field("scheduled_on", FieldType::Date),
            )
            .with_step(StepTemplate::new("walkthrough", "Walkthrough"));

        assert_eq!(version.step_count(), 2);
        assert_eq!(version.steps[0].step_key, "prep");
        assert_eq!(
            version.steps[0].schema.field_type("crew_size"),
            Some(FieldType::Number)
        );
        assert_eq!(version.steps[1].schema.len(), 0);
    }

    #[test]
    fn versions_carry_tenant_identity() {
        let version = TemplateVersion::new(TenantId::new("t1"), "Handover", 3);
        assert_eq!(version.tenant_id, TenantId::new("t1"));
        assert_eq!(version.version, 3);
    }
}
