//! Trellis core domain types.
//!
//! This crate defines the data model of the templated workflow engine:
//! - versioned templates and their per-step field schemas
//! - work instances and their step lifecycle
//! - typed field values (a tagged union, one value per step/field key)
//! - immutable approval decisions
//! - append-only audit records
//!
//! Design stance:
//! - Records are plain data. Persistence and engine logic live in the
//!   `trellis-store` and `trellis-engine` crates.
//! - Every record carries its tenant id; isolation is enforced at the
//!   repository boundary, never inferred from ambient state.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod approval;
mod audit;
mod error;
mod field;
mod ids;
mod instance;
mod template;

pub use approval::{Approval, Decision};
pub use audit::{AuditAppend, AuditEntry};
pub use error::{FieldError, ValidationErrors};
pub use field::{
    ExportedValue, FieldSchema, FieldSpec, FieldType, FieldValue, TypedValue, UnknownFieldType,
};
pub use ids::{
    ActorId, ApprovalId, ProjectId, StepId, TemplateVersionId, TenantId, WorkInstanceId,
};
pub use instance::{InstanceStatus, InstanceSummary, Step, StepStatus, WorkInstance};
pub use template::{StepTemplate, TemplateVersion};
