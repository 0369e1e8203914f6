//! In-memory store for tests and local development.
//!
//! All tables live in plain `Vec`s behind one `RwLock`, kept in insertion
//! order so "newest first" is a reverse walk. Nothing is persisted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    fold_email, Analysis, AnalysisOutcome, AnalysisStatus, AuditRecord, Contract,
    ContractSummary, ContractUpdate, NewAnalysis, NewAuditRecord, NewContract, NewNotification,
    NewUser, Notification, Page, Role, User,
};
use crate::{Store, StorageError};

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    contracts: Vec<Contract>,
    analyses: Vec<Analysis>,
    notifications: Vec<Notification>,
    audit: Vec<AuditRecord>,
}

/// An in-memory [`Store`]. Clones share the same underlying tables.
///
/// # Examples
///
/// ```
/// # use solsentry_storage::{MemoryStore, NewUser, Role, Store};
/// # #[tokio::main]
/// # async fn main() {
/// let store = MemoryStore::new();
/// let user = store
///     .create_user(NewUser {
///         email: "dev@example.com".to_owned(),
///         username: "dev".to_owned(),
///         password_hash: "x".to_owned(),
///         role: Role::User,
///     })
///     .await
///     .unwrap();
/// assert_eq!(store.get_user(user.id).await.unwrap().email, "dev@example.com");
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T: Clone>(items: impl Iterator<Item = T>, page: Page) -> Vec<T> {
    let skip = usize::try_from(page.offset).unwrap_or(0);
    let take = usize::try_from(page.limit).unwrap_or(0);
    items.skip(skip).take(take).collect()
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StorageError> {
        let email = fold_email(&user.email);
        let mut t = self.tables.write().await;
        if t.users.iter().any(|u| u.email == email) {
            return Err(StorageError::Conflict {
                reason: "email already registered".to_owned(),
            });
        }
        if t.users.iter().any(|u| u.username == user.username) {
            return Err(StorageError::Conflict {
                reason: "username already taken".to_owned(),
            });
        }

        let now = Utc::now();
        let row = User {
            id: Uuid::new_v4(),
            email,
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
            active: true,
            created_at: now,
            updated_at: now,
        };
        t.users.push(row.clone());
        Ok(row)
    }

    async fn get_user(&self, id: Uuid) -> Result<User, StorageError> {
        let t = self.tables.read().await;
        t.users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or(StorageError::not_found("user"))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StorageError> {
        let email = fold_email(email);
        let t = self.tables.read().await;
        t.users
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(StorageError::not_found("user"))
    }

    async fn list_users(&self, page: Page) -> Result<Vec<User>, StorageError> {
        let t = self.tables.read().await;
        Ok(paginate(t.users.iter().cloned(), page))
    }

    async fn update_user_role(&self, id: Uuid, role: Role) -> Result<User, StorageError> {
        let mut t = self.tables.write().await;
        let user = t
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StorageError::not_found("user"))?;
        user.role = role;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_user_active(&self, id: Uuid, active: bool) -> Result<User, StorageError> {
        let mut t = self.tables.write().await;
        let user = t
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StorageError::not_found("user"))?;
        user.active = active;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn count_users(&self) -> Result<i64, StorageError> {
        Ok(to_i64(self.tables.read().await.users.len()))
    }

    async fn create_contract(&self, contract: NewContract) -> Result<Contract, StorageError> {
        let mut t = self.tables.write().await;
        if !t.users.iter().any(|u| u.id == contract.owner_id) {
            return Err(StorageError::not_found("user"));
        }

        let now = Utc::now();
        let row = Contract {
            id: Uuid::new_v4(),
            owner_id: contract.owner_id,
            name: contract.name,
            description: contract.description,
            source: contract.source,
            source_hash: contract.source_hash,
            compiler_version: contract.compiler_version,
            created_at: now,
            updated_at: now,
        };
        t.contracts.push(row.clone());
        Ok(row)
    }

    async fn get_contract(&self, id: Uuid) -> Result<Contract, StorageError> {
        let t = self.tables.read().await;
        t.contracts
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(StorageError::not_found("contract"))
    }

    async fn list_contracts(
        &self,
        owner: Option<Uuid>,
        page: Page,
    ) -> Result<Vec<ContractSummary>, StorageError> {
        let t = self.tables.read().await;
        let rows = t
            .contracts
            .iter()
            .rev()
            .filter(|c| owner.is_none_or(|o| c.owner_id == o))
            .map(ContractSummary::from);
        Ok(paginate(rows, page))
    }

    async fn update_contract(
        &self,
        id: Uuid,
        update: ContractUpdate,
    ) -> Result<Contract, StorageError> {
        let mut t = self.tables.write().await;
        let c = t
            .contracts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StorageError::not_found("contract"))?;

        if let Some(name) = update.name {
            c.name = name;
        }
        if let Some(description) = update.description {
            c.description = description;
        }
        if let Some(source) = update.source {
            c.source = source;
        }
        if let Some(hash) = update.source_hash {
            c.source_hash = hash;
        }
        if let Some(version) = update.compiler_version {
            c.compiler_version = version;
        }
        c.updated_at = Utc::now();
        Ok(c.clone())
    }

    async fn delete_contract(&self, id: Uuid) -> Result<(), StorageError> {
        let mut t = self.tables.write().await;
        let before = t.contracts.len();
        t.contracts.retain(|c| c.id != id);
        if t.contracts.len() == before {
            return Err(StorageError::not_found("contract"));
        }
        t.analyses.retain(|a| a.contract_id != id);
        Ok(())
    }

    async fn count_contracts(&self) -> Result<i64, StorageError> {
        Ok(to_i64(self.tables.read().await.contracts.len()))
    }

    async fn create_analysis(&self, analysis: NewAnalysis) -> Result<Analysis, StorageError> {
        let mut t = self.tables.write().await;
        if !t.contracts.iter().any(|c| c.id == analysis.contract_id) {
            return Err(StorageError::not_found("contract"));
        }

        let row = Analysis {
            id: Uuid::new_v4(),
            contract_id: analysis.contract_id,
            requested_by: analysis.requested_by,
            kind: analysis.kind,
            status: AnalysisStatus::Pending,
            risk_score: 0,
            summary: String::new(),
            findings: serde_json::Value::Array(Vec::new()),
            gas_report: serde_json::Value::Null,
            rewritten_source: None,
            model: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        t.analyses.push(row.clone());
        Ok(row)
    }

    async fn mark_analysis_running(&self, id: Uuid) -> Result<(), StorageError> {
        let mut t = self.tables.write().await;
        let a = t
            .analyses
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StorageError::not_found("analysis"))?;
        a.status = AnalysisStatus::Running;
        Ok(())
    }

    async fn complete_analysis(
        &self,
        id: Uuid,
        outcome: AnalysisOutcome,
    ) -> Result<Analysis, StorageError> {
        let mut t = self.tables.write().await;
        let a = t
            .analyses
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StorageError::not_found("analysis"))?;
        a.status = AnalysisStatus::Completed;
        a.risk_score = outcome.risk_score;
        a.summary = outcome.summary;
        a.findings = outcome.findings;
        a.gas_report = outcome.gas_report;
        a.rewritten_source = outcome.rewritten_source;
        a.model = outcome.model;
        a.error = outcome.error;
        a.completed_at = Some(Utc::now());
        Ok(a.clone())
    }

    async fn fail_analysis(&self, id: Uuid, error: &str) -> Result<Analysis, StorageError> {
        let mut t = self.tables.write().await;
        let a = t
            .analyses
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StorageError::not_found("analysis"))?;
        a.status = AnalysisStatus::Failed;
        a.error = Some(error.to_owned());
        a.completed_at = Some(Utc::now());
        Ok(a.clone())
    }

    async fn fail_interrupted_analyses(&self, error: &str) -> Result<Vec<Analysis>, StorageError> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        let mut failed = Vec::new();
        for a in t
            .analyses
            .iter_mut()
            .filter(|a| matches!(a.status, AnalysisStatus::Pending | AnalysisStatus::Running))
        {
            a.status = AnalysisStatus::Failed;
            a.error = Some(error.to_owned());
            a.completed_at = Some(now);
            failed.push(a.clone());
        }
        Ok(failed)
    }

    async fn get_analysis(&self, id: Uuid) -> Result<Analysis, StorageError> {
        let t = self.tables.read().await;
        t.analyses
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(StorageError::not_found("analysis"))
    }

    async fn list_analyses(&self, contract_id: Uuid) -> Result<Vec<Analysis>, StorageError> {
        let t = self.tables.read().await;
        Ok(t.analyses
            .iter()
            .rev()
            .filter(|a| a.contract_id == contract_id)
            .cloned()
            .collect())
    }

    async fn count_analyses_by_status(
        &self,
    ) -> Result<Vec<(AnalysisStatus, i64)>, StorageError> {
        let t = self.tables.read().await;
        Ok(AnalysisStatus::ALL
            .iter()
            .map(|s| (*s, to_i64(t.analyses.iter().filter(|a| a.status == *s).count())))
            .collect())
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StorageError> {
        let mut t = self.tables.write().await;
        let row = Notification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            kind: notification.kind,
            title: notification.title,
            body: notification.body,
            link: notification.link,
            read_at: None,
            created_at: Utc::now(),
        };
        t.notifications.push(row.clone());
        Ok(row)
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        page: Page,
    ) -> Result<Vec<Notification>, StorageError> {
        let t = self.tables.read().await;
        let rows = t
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id && (!unread_only || n.read_at.is_none()))
            .cloned();
        Ok(paginate(rows, page))
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<i64, StorageError> {
        let t = self.tables.read().await;
        Ok(to_i64(
            t.notifications
                .iter()
                .filter(|n| n.user_id == user_id && n.read_at.is_none())
                .count(),
        ))
    }

    async fn mark_notification_read(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Notification, StorageError> {
        let mut t = self.tables.write().await;
        let n = t
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
            .ok_or(StorageError::not_found("notification"))?;
        if n.read_at.is_none() {
            n.read_at = Some(Utc::now());
        }
        Ok(n.clone())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, StorageError> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        let mut updated = 0u64;
        for n in t
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && n.read_at.is_none())
        {
            n.read_at = Some(now);
            updated = updated.saturating_add(1);
        }
        Ok(updated)
    }

    async fn delete_notification(&self, user_id: Uuid, id: Uuid) -> Result<(), StorageError> {
        let mut t = self.tables.write().await;
        let before = t.notifications.len();
        t.notifications
            .retain(|n| !(n.id == id && n.user_id == user_id));
        if t.notifications.len() == before {
            return Err(StorageError::not_found("notification"));
        }
        Ok(())
    }

    async fn purge_read_notifications(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let mut t = self.tables.write().await;
        let before = t.notifications.len();
        t.notifications
            .retain(|n| n.read_at.is_none() || n.created_at >= older_than);
        Ok(u64::try_from(before.saturating_sub(t.notifications.len())).unwrap_or(u64::MAX))
    }

    async fn write_audit(&self, record: NewAuditRecord) -> Result<(), StorageError> {
        let mut t = self.tables.write().await;
        t.audit.push(AuditRecord {
            id: Uuid::new_v4(),
            actor_id: record.actor_id,
            actor_role: record.actor_role,
            method: record.method,
            path: record.path,
            status: record.status,
            ip_address: record.ip_address,
            user_agent: record.user_agent,
            detail: record.detail,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_audit(
        &self,
        actor: Option<Uuid>,
        page: Page,
    ) -> Result<Vec<AuditRecord>, StorageError> {
        let t = self.tables.read().await;
        let rows = t
            .audit
            .iter()
            .rev()
            .filter(|r| actor.is_none_or(|a| r.actor_id == Some(a)))
            .cloned();
        Ok(paginate(rows, page))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::AnalysisKind;

    fn new_user(email: &str, username: &str) -> NewUser {
        NewUser {
            email: email.to_owned(),
            username: username.to_owned(),
            password_hash: "hash".to_owned(),
            role: Role::User,
        }
    }

    fn new_contract(owner_id: Uuid, name: &str) -> NewContract {
        NewContract {
            owner_id,
            name: name.to_owned(),
            description: String::new(),
            source: "contract A {}".to_owned(),
            source_hash: "abc".to_owned(),
            compiler_version: None,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict_case_insensitive() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@x.io", "a")).await.unwrap();
        let err = store.create_user(new_user("A@X.io", "b")).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn duplicate_username_is_conflict() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@x.io", "same")).await.unwrap();
        let err = store.create_user(new_user("b@x.io", "same")).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn lookup_by_email_ignores_case() {
        let store = MemoryStore::new();
        let u = store.create_user(new_user("Dev@X.io", "dev")).await.unwrap();
        let found = store.get_user_by_email("dev@x.io").await.unwrap();
        assert_eq!(found.id, u.id);
    }

    #[tokio::test]
    async fn email_folding_covers_non_ascii() {
        let store = MemoryStore::new();
        let u = store.create_user(new_user("Élodie@X.io", "elodie")).await.unwrap();
        assert_eq!(u.email, "élodie@x.io");
        let found = store.get_user_by_email("ÉLODIE@x.IO").await.unwrap();
        assert_eq!(found.id, u.id);
        let err = store.create_user(new_user("élodie@x.io", "other")).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn contract_requires_existing_owner() {
        let store = MemoryStore::new();
        let err = store
            .create_contract(new_contract(Uuid::new_v4(), "A"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { entity: "user" }));
    }

    #[tokio::test]
    async fn list_contracts_newest_first_and_filtered() {
        let store = MemoryStore::new();
        let a = store.create_user(new_user("a@x.io", "a")).await.unwrap();
        let b = store.create_user(new_user("b@x.io", "b")).await.unwrap();
        store.create_contract(new_contract(a.id, "first")).await.unwrap();
        store.create_contract(new_contract(b.id, "other")).await.unwrap();
        store.create_contract(new_contract(a.id, "second")).await.unwrap();

        let all = store.list_contracts(None, Page::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].name, "second");

        let mine = store.list_contracts(Some(a.id), Page::default()).await.unwrap();
        let names: Vec<_> = mine.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);

        let paged = store.list_contracts(None, Page::new(1, 1)).await.unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].name, "other");
    }

    #[tokio::test]
    async fn delete_contract_cascades_to_analyses() {
        let store = MemoryStore::new();
        let u = store.create_user(new_user("a@x.io", "a")).await.unwrap();
        let c = store.create_contract(new_contract(u.id, "A")).await.unwrap();
        let a = store
            .create_analysis(NewAnalysis {
                contract_id: c.id,
                requested_by: u.id,
                kind: AnalysisKind::Security,
            })
            .await
            .unwrap();

        store.delete_contract(c.id).await.unwrap();
        assert!(matches!(
            store.get_analysis(a.id).await.unwrap_err(),
            StorageError::NotFound { .. }
        ));
        assert!(matches!(
            store.delete_contract(c.id).await.unwrap_err(),
            StorageError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn analysis_lifecycle_and_status_counts() {
        let store = MemoryStore::new();
        let u = store.create_user(new_user("a@x.io", "a")).await.unwrap();
        let c = store.create_contract(new_contract(u.id, "A")).await.unwrap();
        let a = store
            .create_analysis(NewAnalysis {
                contract_id: c.id,
                requested_by: u.id,
                kind: AnalysisKind::Security,
            })
            .await
            .unwrap();
        assert_eq!(a.status, AnalysisStatus::Pending);

        store.mark_analysis_running(a.id).await.unwrap();
        let done = store
            .complete_analysis(
                a.id,
                AnalysisOutcome {
                    risk_score: 42,
                    summary: "ok".to_owned(),
                    ..AnalysisOutcome::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(done.status, AnalysisStatus::Completed);
        assert_eq!(done.risk_score, 42);
        assert!(done.completed_at.is_some());

        let counts = store.count_analyses_by_status().await.unwrap();
        assert_eq!(counts.len(), 4);
        assert!(counts.contains(&(AnalysisStatus::Completed, 1)));
        assert!(counts.contains(&(AnalysisStatus::Pending, 0)));
    }

    #[tokio::test]
    async fn interrupted_analyses_are_failed() {
        let store = MemoryStore::new();
        let u = store.create_user(new_user("a@x.io", "a")).await.unwrap();
        let c = store.create_contract(new_contract(u.id, "A")).await.unwrap();
        let new = || NewAnalysis {
            contract_id: c.id,
            requested_by: u.id,
            kind: AnalysisKind::Security,
        };
        let pending = store.create_analysis(new()).await.unwrap();
        let running = store.create_analysis(new()).await.unwrap();
        store.mark_analysis_running(running.id).await.unwrap();
        let done = store.create_analysis(new()).await.unwrap();
        store
            .complete_analysis(done.id, AnalysisOutcome::default())
            .await
            .unwrap();

        let failed = store.fail_interrupted_analyses("interrupted").await.unwrap();
        let mut ids: Vec<Uuid> = failed.iter().map(|a| a.id).collect();
        ids.sort();
        let mut expected = vec![pending.id, running.id];
        expected.sort();
        assert_eq!(ids, expected);
        assert!(failed.iter().all(|a| a.error.as_deref() == Some("interrupted")));

        let done = store.get_analysis(done.id).await.unwrap();
        assert_eq!(done.status, AnalysisStatus::Completed);
        assert!(store.fail_interrupted_analyses("again").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn notifications_are_scoped_to_owner() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let n = store
            .create_notification(NewNotification {
                user_id: owner,
                kind: "test".to_owned(),
                title: "t".to_owned(),
                body: "b".to_owned(),
                link: None,
            })
            .await
            .unwrap();

        let err = store
            .mark_notification_read(Uuid::new_v4(), n.id)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
        let err = store
            .delete_notification(Uuid::new_v4(), n.id)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));

        assert_eq!(store.count_unread(owner).await.unwrap(), 1);
        store.mark_notification_read(owner, n.id).await.unwrap();
        assert_eq!(store.count_unread(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mark_all_read_and_purge() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        for i in 0..3 {
            store
                .create_notification(NewNotification {
                    user_id: owner,
                    kind: "test".to_owned(),
                    title: format!("n{i}"),
                    body: String::new(),
                    link: None,
                })
                .await
                .unwrap();
        }

        assert_eq!(store.mark_all_read(owner).await.unwrap(), 3);
        assert_eq!(store.mark_all_read(owner).await.unwrap(), 0);

        // Nothing is older than a cutoff in the past.
        let past = Utc::now() - chrono::Duration::days(1);
        assert_eq!(store.purge_read_notifications(past).await.unwrap(), 0);

        let future = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(store.purge_read_notifications(future).await.unwrap(), 3);
        assert!(store
            .list_notifications(owner, false, Page::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn audit_filter_by_actor() {
        let store = MemoryStore::new();
        let actor = Uuid::new_v4();
        for actor_id in [Some(actor), None, Some(actor)] {
            store
                .write_audit(NewAuditRecord {
                    actor_id,
                    actor_role: None,
                    method: "POST".to_owned(),
                    path: "/v1/contracts".to_owned(),
                    status: 201,
                    ip_address: None,
                    user_agent: None,
                    detail: serde_json::Value::Null,
                })
                .await
                .unwrap();
        }

        assert_eq!(store.list_audit(None, Page::default()).await.unwrap().len(), 3);
        assert_eq!(
            store.list_audit(Some(actor), Page::default()).await.unwrap().len(),
            2
        );
    }
}
