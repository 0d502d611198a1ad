//! Deliverable export: the canonical read-only projection of an instance.
//!
//! Steps appear in stored order; within a step, values appear in field-key
//! order. Given unchanged state, two exports are byte-identical except for
//! `generated_at`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trellis_types::{
    ExportedValue, ProjectId, StepStatus, TemplateVersionId, WorkInstance, WorkInstanceId,
};

/// Format discriminator carried by every deliverable document.
pub const DELIVERABLE_FORMAT: &str = "trellis.deliverable.v1";

/// The exported document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliverableDocument {
    pub format: String,
    pub generated_at: DateTime<Utc>,
    pub instance_id: WorkInstanceId,
    pub template_version_id: TemplateVersionId,
    pub project_id: ProjectId,
    pub steps: Vec<DeliverableStep>,
}

/// One step within the deliverable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliverableStep {
    pub id: String,
    pub step_key: String,
    pub status: StepStatus,
    pub values: Vec<ExportedValue>,
}

/// Project an instance into its deliverable document.
pub fn render(instance: &WorkInstance, generated_at: DateTime<Utc>) -> DeliverableDocument {
    DeliverableDocument {
        format: DELIVERABLE_FORMAT.to_string(),
        generated_at,
        instance_id: instance.id.clone(),
        template_version_id: instance.template_version_id.clone(),
        project_id: instance.project_id.clone(),
        steps: instance
            .steps
            .iter()
            .map(|step| DeliverableStep {
                id: step.id.to_string(),
                step_key: step.step_key.clone(),
                status: step.status,
                values: step.values_by_key().into_iter().map(|v| v.export()).collect(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_types::{
        FieldType, ProjectId, StepTemplate, TemplateVersion, TenantId, TypedValue,
    };

    fn sample_instance() -> WorkInstance {
        let template = TemplateVersion::new(TenantId::new("t1"), "Handover", 1).with_step(
            StepTemplate::new("s1", "Checks")
                .with_field("qty", FieldType::Number)
                .with_field("note", FieldType::String),
        );
        let mut instance =
            WorkInstance::instantiate(TenantId::new("t1"), ProjectId::new("p1"), &template);
        let now = Utc::now();
        let step = &mut instance.steps[0];
        step.upsert_value("note", TypedValue::Text("ok".into()), now);
        step.upsert_value("qty", TypedValue::Number(12.0), now);
        instance
    }

    #[test]
    fn values_are_ordered_by_field_key() {
        let doc = render(&sample_instance(), Utc::now());
        let keys: Vec<&str> = doc.steps[0]
            .values
            .iter()
            .map(|v| v.field_key.as_str())
            .collect();
        assert_eq!(keys, vec!["note", "qty"]);
    }

    #[test]
    fn export_is_deterministic_apart_from_timestamp() {
        let instance = sample_instance();
        let stamp = Utc::now();
        let first = serde_json::to_string(&render(&instance, stamp)).unwrap();
        let second = serde_json::to_string(&render(&instance, stamp)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn every_slot_is_serialized_even_when_null() {
        let doc = render(&sample_instance(), Utc::now());
        let json = serde_json::to_value(&doc).unwrap();
        let qty = &json["steps"][0]["values"][1];
        assert_eq!(qty["field_key"], "qty");
        assert_eq!(qty["value_number"], 12.0);
        assert!(qty["value_string"].is_null());
        assert!(qty["value_json"].is_null());
        assert_eq!(json["format"], DELIVERABLE_FORMAT);
    }
}
