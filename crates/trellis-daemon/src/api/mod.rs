//! REST API surface.

pub mod context;
pub mod envelope;
pub mod extract;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
