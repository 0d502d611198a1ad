//! Best-effort audit emission.
//!
//! The trail is written after a business mutation has committed. A failed
//! audit write is retried once and then dropped with a warning; it never
//! rolls back or fails the mutation it describes.

use std::sync::Arc;
use tracing::warn;
use trellis_store::AuditStore;
use trellis_types::AuditAppend;

/// Write-side handle over the audit chain.
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn AuditStore>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Append one entry, retry-once-then-warn.
    pub async fn record(&self, event: AuditAppend) {
        let first = self.store.append_audit(event.clone()).await;
        let Err(first_err) = first else {
            return;
        };

        if let Err(retry_err) = self.store.append_audit(event.clone()).await {
            warn!(
                action = %event.action,
                entity_type = %event.entity_type,
                entity_id = %event.entity_id,
                tenant_id = %event.tenant_id,
                first_error = %first_err,
                retry_error = %retry_err,
                "audit append dropped after retry"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use trellis_store::{InMemoryTrellisStore, QueryWindow, StoreError, StoreResult};
    use trellis_types::{ActorId, AuditEntry, TenantId};

    struct FlakyAuditStore {
        inner: InMemoryTrellisStore,
        failures_left: AtomicUsize,
        attempts: AtomicUsize,
    }

    impl FlakyAuditStore {
        fn failing(n: usize) -> Self {
            Self {
                inner: InMemoryTrellisStore::new(),
                failures_left: AtomicUsize::new(n),
                attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AuditStore for FlakyAuditStore {
        async fn append_audit(&self, event: AuditAppend) -> StoreResult<AuditEntry> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Backend("injected failure".to_string()));
            }
            self.inner.append_audit(event).await
        }

        async fn list_audit(
            &self,
            tenant_id: &TenantId,
            window: QueryWindow,
        ) -> StoreResult<Vec<AuditEntry>> {
            self.inner.list_audit(tenant_id, window).await
        }

        async fn latest_audit_hash(&self, tenant_id: &TenantId) -> StoreResult<Option<String>> {
            self.inner.latest_audit_hash(tenant_id).await
        }
    }

    fn sample_event() -> AuditAppend {
        AuditAppend::new(
            "step.update",
            "step",
            "step-1",
            "ok",
            TenantId::new("t1"),
            ActorId::new("a1"),
        )
    }

    #[tokio::test]
    async fn retry_recovers_single_failure() {
        let store = Arc::new(FlakyAuditStore::failing(1));
        let trail = AuditTrail::new(store.clone());

        trail.record(sample_event()).await;

        assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
        let entries = store
            .list_audit(&TenantId::new("t1"), QueryWindow::default())
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn double_failure_is_dropped_not_raised() {
        let store = Arc::new(FlakyAuditStore::failing(2));
        let trail = AuditTrail::new(store.clone());

        // Must return normally despite both attempts failing.
        trail.record(sample_event()).await;

        assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
        let entries = store
            .list_audit(&TenantId::new("t1"), QueryWindow::default())
            .await
            .unwrap();
        assert!(entries.is_empty());
    }
}
