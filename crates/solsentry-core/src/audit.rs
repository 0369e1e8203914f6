//! Audit logging.
//!
//! Every mutating API request produces an [`AuditEntry`] once the response
//! status is known. The [`AuditManager`] fans each entry out to all
//! registered backends; the write counts as recorded if at least one of
//! them accepts it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solsentry_storage::{NewAuditRecord, Role, Store};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::error::AuditError;

/// A single audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Authenticated caller, if any.
    pub actor_id: Option<Uuid>,
    pub actor_role: Option<Role>,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Free-form context (query string, latency, ...).
    pub detail: serde_json::Value,
}

impl AuditEntry {
    /// A new entry stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>, status: u16) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor_id: None,
            actor_role: None,
            method: method.into(),
            path: path.into(),
            status,
            ip_address: None,
            user_agent: None,
            detail: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    #[must_use]
    pub fn with_actor(mut self, id: Uuid, role: Role) -> Self {
        self.actor_id = Some(id);
        self.actor_role = Some(role);
        self
    }

    #[must_use]
    pub fn with_client(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip;
        self.user_agent = user_agent;
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// A destination for audit entries.
///
/// Implementations must be safe to share across async tasks.
#[async_trait::async_trait]
pub trait AuditBackend: Send + Sync {
    /// The backend's name (for error reporting).
    fn name(&self) -> &str;

    /// Persist an entry. Must not silently drop it.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry could not be persisted.
    async fn log(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Fans entries out to every registered backend.
pub struct AuditManager {
    backends: RwLock<Vec<Arc<dyn AuditBackend>>>,
}

impl Default for AuditManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            backends: RwLock::new(Vec::new()),
        }
    }

    /// Register a backend.
    pub async fn add_backend(&self, backend: Arc<dyn AuditBackend>) {
        self.backends.write().await.push(backend);
    }

    /// Write `entry` to every backend.
    ///
    /// Succeeds when at least one backend accepts the entry, or when none
    /// are registered.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::AllBackendsFailed`] if every backend fails.
    pub async fn log(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let backends = self.backends.read().await;

        if backends.is_empty() {
            return Ok(());
        }

        let mut any_success = false;
        for backend in backends.iter() {
            match backend.log(entry).await {
                Ok(()) => any_success = true,
                Err(e) => {
                    warn!(
                        backend = backend.name(),
                        error = %e,
                        "audit backend failed"
                    );
                }
            }
        }

        if any_success {
            Ok(())
        } else {
            Err(AuditError::AllBackendsFailed)
        }
    }

    /// Names of the registered backends.
    pub async fn backend_names(&self) -> Vec<String> {
        self.backends
            .read()
            .await
            .iter()
            .map(|b| b.name().to_owned())
            .collect()
    }
}

impl std::fmt::Debug for AuditManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditManager").finish_non_exhaustive()
    }
}

/// Writes entries into the `audit_log` table through a [`Store`].
pub struct StoreAuditBackend {
    store: Arc<dyn Store>,
}

impl StoreAuditBackend {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for StoreAuditBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreAuditBackend").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl AuditBackend for StoreAuditBackend {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "store"
    }

    async fn log(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let record = NewAuditRecord {
            actor_id: entry.actor_id,
            actor_role: entry.actor_role.map(|r| r.to_string()),
            method: entry.method.clone(),
            path: entry.path.clone(),
            status: i32::from(entry.status),
            ip_address: entry.ip_address.clone(),
            user_agent: entry.user_agent.clone(),
            detail: entry.detail.clone(),
        };
        self.store
            .write_audit(record)
            .await
            .map_err(|e| AuditError::BackendFailure {
                name: self.name().to_owned(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use solsentry_storage::{MemoryStore, Page};

    use super::*;

    struct Counting {
        fail: bool,
        seen: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl AuditBackend for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn log(&self, _entry: &AuditEntry) -> Result<(), AuditError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AuditError::BackendFailure {
                    name: "counting".to_owned(),
                    reason: "disk full".to_owned(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn counting(fail: bool) -> Arc<Counting> {
        Arc::new(Counting {
            fail,
            seen: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn no_backends_is_noop() {
        let mgr = AuditManager::new();
        assert!(mgr.log(&AuditEntry::new("POST", "/v1/x", 200)).await.is_ok());
    }

    #[tokio::test]
    async fn one_success_is_enough() {
        let mgr = AuditManager::new();
        let bad = counting(true);
        let good = counting(false);
        mgr.add_backend(bad.clone()).await;
        mgr.add_backend(good.clone()).await;

        mgr.log(&AuditEntry::new("POST", "/v1/x", 201)).await.unwrap();
        assert_eq!(bad.seen.load(Ordering::SeqCst), 1);
        assert_eq!(good.seen.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.backend_names().await, vec!["counting", "counting"]);
    }

    #[tokio::test]
    async fn all_failing_is_an_error() {
        let mgr = AuditManager::new();
        mgr.add_backend(counting(true)).await;
        mgr.add_backend(counting(true)).await;
        let err = mgr.log(&AuditEntry::new("DELETE", "/v1/x", 204)).await.unwrap_err();
        assert!(matches!(err, AuditError::AllBackendsFailed));
    }

    #[tokio::test]
    async fn store_backend_persists_record() {
        let store = Arc::new(MemoryStore::new());
        let backend = StoreAuditBackend::new(store.clone());
        let actor = Uuid::new_v4();
        let entry = AuditEntry::new("PUT", "/v1/admin/users/1/role", 200)
            .with_actor(actor, Role::Admin)
            .with_client(Some("10.0.0.1".to_owned()), Some("curl/8".to_owned()))
            .with_detail(serde_json::json!({ "latency_ms": 3 }));

        backend.log(&entry).await.unwrap();

        let rows = store.list_audit(None, Page::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].actor_id, Some(actor));
        assert_eq!(rows[0].actor_role.as_deref(), Some("admin"));
        assert_eq!(rows[0].status, 200);
        assert_eq!(rows[0].ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(rows[0].detail["latency_ms"], 3);
    }
}
