//! Best-effort audit recorder.

use std::sync::Arc;

use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::models::{AuditLogEntry, NewAuditEntry};
use super::store::AuditStore;

/// Writes audit entries. Recording never fails the caller: store errors are
/// logged on the `audit` target and counted, then dropped.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    enabled: bool,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store, enabled: true }
    }

    /// A recorder that accepts entries and writes nothing.
    pub fn disabled(store: Arc<dyn AuditStore>) -> Self {
        Self { store, enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Persist one entry, returning it when the write succeeded.
    pub async fn record(&self, entry: NewAuditEntry) -> Option<AuditLogEntry> {
        if !self.enabled {
            return None;
        }
        let entry = entry.into_entry();

        match self.store.insert(&entry).await {
            Ok(()) => {
                counter!("taskgate_audit_writes_total", "result" => "ok").increment(1);
                debug!(
                    target: "audit",
                    audit_id = %entry.id,
                    action = %entry.action,
                    resource = %entry.resource,
                    user_id = %entry.user_id,
                    "Audit entry recorded"
                );
                Some(entry)
            }
            Err(err) => {
                counter!("taskgate_audit_writes_total", "result" => "error").increment(1);
                error!(
                    target: "audit",
                    action = %entry.action,
                    resource = %entry.resource,
                    user_id = %entry.user_id,
                    error = %err,
                    "Failed to record audit entry"
                );
                None
            }
        }
    }

    /// Record off the request path.
    pub fn spawn(&self, entry: NewAuditEntry) -> JoinHandle<()> {
        let recorder = self.clone();
        tokio::spawn(async move {
            recorder.record(entry).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::models::AuditAction;
    use crate::audit::store::{InMemoryAuditStore, MockAuditStore};
    use crate::error::GateError;
    use crate::rbac::{OrganizationId, UserId};

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let mut store = MockAuditStore::new();
        store
            .expect_insert()
            .times(1)
            .returning(|_| Err(GateError::internal("connection reset")));
        let recorder = AuditRecorder::new(Arc::new(store));

        let written = recorder
            .record(NewAuditEntry::new(AuditAction::Delete, "tasks"))
            .await;
        assert!(written.is_none());
    }

    #[tokio::test]
    async fn test_spawned_failure_does_not_panic() {
        let mut store = MockAuditStore::new();
        store
            .expect_insert()
            .returning(|_| Err(GateError::internal("disk full")));
        let recorder = AuditRecorder::new(Arc::new(store));

        let handle = recorder.spawn(NewAuditEntry::new(AuditAction::Create, "tasks"));
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_records_actor() {
        let store = InMemoryAuditStore::new();
        let recorder = AuditRecorder::new(Arc::new(store.clone()));
        let user = UserId::new();

        recorder
            .record(NewAuditEntry::new(AuditAction::Update, "tasks").actor(user, OrganizationId::new()))
            .await
            .unwrap();
        assert_eq!(store.entries()[0].user_id, user);
    }

    #[tokio::test]
    async fn test_disabled_recorder_skips_store() {
        let mut store = MockAuditStore::new();
        store.expect_insert().never();
        let recorder = AuditRecorder::disabled(Arc::new(store));
        assert!(recorder.record(NewAuditEntry::new(AuditAction::Create, "tasks")).await.is_none());
    }
}
