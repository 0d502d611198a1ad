//! Shared API state.

use chrono::{DateTime, Utc};
use trellis_engine::Engine;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            started_at: Utc::now(),
        }
    }
}
