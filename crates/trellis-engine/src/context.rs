//! Explicit per-call tenant context.
//!
//! Callers (the HTTP layer, tests, embedding applications) construct one of
//! these per request and pass it into every engine operation. The engine
//! never reads tenant or actor identity from ambient state.

use trellis_types::{ActorId, TenantId};

/// Who is acting, and within which isolation boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub actor_id: ActorId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId, actor_id: ActorId) -> Self {
        Self {
            tenant_id,
            actor_id,
        }
    }
}
