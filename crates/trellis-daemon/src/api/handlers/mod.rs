//! API request handlers.

mod admin;
mod instances;
mod system;

pub use admin::*;
pub use instances::*;
pub use system::*;
