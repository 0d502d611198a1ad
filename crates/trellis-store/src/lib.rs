//! Trellis storage abstractions.
//!
//! This crate defines the persistence contract for the workflow engine:
//! - tenant-scoped template version storage with referenced-version
//!   immutability
//! - work instance storage whose whole-document swap is the engine's
//!   transactional boundary
//! - append-only, hash-linked audit chains (one per tenant)
//! - the project directory collaborator
//!
//! Design stance:
//! - Every method takes the tenant id explicitly; isolation is enforced
//!   here, at the repository boundary, not trusted from caller input.
//! - The in-memory adapter is the deterministic reference implementation;
//!   PostgreSQL (behind the `postgres` feature) is the transactional
//!   source-of-truth backend.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryTrellisStore;
pub use traits::{
    AuditStore, InstanceStore, ProjectDirectory, QueryWindow, TemplateStore, TrellisStore,
};
