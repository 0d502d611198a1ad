//! Tenant context extraction from request headers.
//!
//! The daemon stands behind a session layer that resolves authentication
//! and forwards identity as `X-Tenant-Id` / `X-Actor-Id`. Missing headers
//! mean that layer is absent or broken, which is a deployment fault.

use crate::error::{ApiError, ApiResult};
use axum::http::HeaderMap;
use trellis_engine::TenantContext;
use trellis_types::{ActorId, TenantId};

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Resolve the acting tenant and actor from forwarded headers.
pub fn tenant_context(headers: &HeaderMap) -> ApiResult<TenantContext> {
    let tenant = header_value(headers, TENANT_HEADER)?;
    let actor = header_value(headers, ACTOR_HEADER)?;
    Ok(TenantContext::new(TenantId::new(tenant), ActorId::new(actor)))
}

fn header_value(headers: &HeaderMap, name: &str) -> ApiResult<String> {
    let value = headers
        .get(name)
        .ok_or_else(|| ApiError::TenantContextMissing(format!("missing {name} header")))?;
    let value = value
        .to_str()
        .map_err(|_| ApiError::TenantContextMissing(format!("non-text {name} header")))?
        .trim();
    if value.is_empty() {
        return Err(ApiError::TenantContextMissing(format!(
            "empty {name} header"
        )));
    }
    Ok(value.to_string())
}
