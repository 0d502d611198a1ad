//! The Trellis workflow engine.
//!
//! Coordinates the core operations over storage:
//! - template version publication and project-bound instantiation
//! - atomic step updates (status, assignment, deadline, typed field values)
//! - the approval ledger driving steps into terminal states
//! - deterministic deliverable export
//!
//! Every operation takes an explicit [`TenantContext`]; there is no ambient
//! tenant or actor state. Mutations follow a clone-mutate-swap discipline:
//! the engine mutates a private copy of the instance aggregate and commits
//! it with a single whole-document replace, which is the all-or-nothing
//! boundary.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod attachments;
mod audit;
mod coerce;
mod context;
mod engine;
mod error;
mod export;

pub use attachments::{AttachmentSink, LoggingAttachmentSink};
pub use audit::AuditTrail;
pub use coerce::coerce;
pub use context::TenantContext;
pub use engine::{DecisionRequest, Engine, InstancePage, StepUpdate};
pub use error::{EngineError, EngineResult};
pub use export::{DeliverableDocument, DeliverableStep, DELIVERABLE_FORMAT};
