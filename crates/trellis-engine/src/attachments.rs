//! Attachment pass-through.
//!
//! Step updates may carry opaque attachment payloads. The engine does not
//! store or inspect them; they are forwarded untouched to a collaborator
//! (file storage lives outside this system).

use crate::context::TenantContext;
use async_trait::async_trait;
use tracing::debug;
use trellis_types::StepId;

/// Collaborator receiving attachment payloads from step updates.
#[async_trait]
pub trait AttachmentSink: Send + Sync {
    async fn forward(
        &self,
        ctx: &TenantContext,
        step_id: &StepId,
        attachments: &[serde_json::Value],
    );
}

/// Default sink: logs the hand-off and drops the payloads.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingAttachmentSink;

#[async_trait]
impl AttachmentSink for LoggingAttachmentSink {
    async fn forward(
        &self,
        ctx: &TenantContext,
        step_id: &StepId,
        attachments: &[serde_json::Value],
    ) {
        debug!(
            tenant_id = %ctx.tenant_id,
            step_id = %step_id,
            count = attachments.len(),
            "forwarding step attachments"
        );
    }
}
