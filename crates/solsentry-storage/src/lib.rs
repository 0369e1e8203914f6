//! Persistence layer for `SolSentry`.
//!
//! This crate defines the [`Store`] trait, a typed repository over users,
//! contracts, analyses, notifications, and audit records, and the models it
//! speaks in. It knows nothing about HTTP, JWTs, or how analyses are produced.
//!
//! Two implementations are provided:
//!
//! - [`PostgresStore`]: production backend on `sqlx` (feature `postgres`)
//! - [`MemoryStore`]: in-memory, for tests and local development

mod error;
mod memory;
pub mod models;
#[cfg(feature = "postgres")]
mod postgres;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use models::{
    fold_email, Analysis, AnalysisKind, AnalysisOutcome, AnalysisStatus, AuditRecord, Contract,
    ContractSummary, ContractUpdate, NewAnalysis, NewAuditRecord, NewContract, NewNotification,
    NewUser, Notification, Page, Role, User,
};
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

/// A pluggable relational store.
///
/// Implementations must be safe to share across async tasks. Every lookup
/// that misses returns [`StorageError::NotFound`]; uniqueness violations
/// return [`StorageError::Conflict`].
#[async_trait::async_trait]
pub trait Store: Send + Sync + 'static {
    // ── Users ────────────────────────────────────────────────────────

    /// Insert a new user. Email and username are unique. Emails are stored in
    /// [`fold_email`] form.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] on a duplicate email or username.
    async fn create_user(&self, user: NewUser) -> Result<User, StorageError>;

    /// Fetch a user by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no such user exists.
    async fn get_user(&self, id: Uuid) -> Result<User, StorageError>;

    /// Fetch a user by email, compared in [`fold_email`] form.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no such user exists.
    async fn get_user_by_email(&self, email: &str) -> Result<User, StorageError>;

    /// List users, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] on backend failure.
    async fn list_users(&self, page: Page) -> Result<Vec<User>, StorageError>;

    /// Change a user's role.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no such user exists.
    async fn update_user_role(&self, id: Uuid, role: Role) -> Result<User, StorageError>;

    /// Activate or deactivate a user.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no such user exists.
    async fn set_user_active(&self, id: Uuid, active: bool) -> Result<User, StorageError>;

    /// Total number of users.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] on backend failure.
    async fn count_users(&self) -> Result<i64, StorageError>;

    // ── Contracts ────────────────────────────────────────────────────

    /// Insert a new contract.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the owner does not exist.
    async fn create_contract(&self, contract: NewContract) -> Result<Contract, StorageError>;

    /// Fetch a contract (with source) by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no such contract exists.
    async fn get_contract(&self, id: Uuid) -> Result<Contract, StorageError>;

    /// List contracts newest first, optionally restricted to one owner.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] on backend failure.
    async fn list_contracts(
        &self,
        owner: Option<Uuid>,
        page: Page,
    ) -> Result<Vec<ContractSummary>, StorageError>;

    /// Apply a partial update and bump `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no such contract exists.
    async fn update_contract(
        &self,
        id: Uuid,
        update: ContractUpdate,
    ) -> Result<Contract, StorageError>;

    /// Delete a contract and all of its analyses.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no such contract exists.
    async fn delete_contract(&self, id: Uuid) -> Result<(), StorageError>;

    /// Total number of contracts.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] on backend failure.
    async fn count_contracts(&self) -> Result<i64, StorageError>;

    // ── Analyses ─────────────────────────────────────────────────────

    /// Insert a `pending` analysis.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the contract does not exist.
    async fn create_analysis(&self, analysis: NewAnalysis) -> Result<Analysis, StorageError>;

    /// Move an analysis to `running`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no such analysis exists.
    async fn mark_analysis_running(&self, id: Uuid) -> Result<(), StorageError>;

    /// Record a successful outcome and set `completed_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no such analysis exists.
    async fn complete_analysis(
        &self,
        id: Uuid,
        outcome: AnalysisOutcome,
    ) -> Result<Analysis, StorageError>;

    /// Record a failure and set `completed_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no such analysis exists.
    async fn fail_analysis(&self, id: Uuid, error: &str) -> Result<Analysis, StorageError>;

    /// Fail every `pending` or `running` analysis with `error`. Used at
    /// startup for runs a previous process never finished. Returns the
    /// failed rows.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] on backend failure.
    async fn fail_interrupted_analyses(&self, error: &str) -> Result<Vec<Analysis>, StorageError>;

    /// Fetch an analysis by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no such analysis exists.
    async fn get_analysis(&self, id: Uuid) -> Result<Analysis, StorageError>;

    /// List analyses of a contract, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] on backend failure.
    async fn list_analyses(&self, contract_id: Uuid) -> Result<Vec<Analysis>, StorageError>;

    /// Count analyses grouped by status. Every status is present in the result.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] on backend failure.
    async fn count_analyses_by_status(
        &self,
    ) -> Result<Vec<(AnalysisStatus, i64)>, StorageError>;

    // ── Notifications ────────────────────────────────────────────────

    /// Insert a notification.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] on backend failure.
    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StorageError>;

    /// List a user's notifications, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] on backend failure.
    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        page: Page,
    ) -> Result<Vec<Notification>, StorageError>;

    /// Number of unread notifications for a user.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] on backend failure.
    async fn count_unread(&self, user_id: Uuid) -> Result<i64, StorageError>;

    /// Mark one notification read. Scoped to its owner.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if it does not exist or belongs to
    /// another user.
    async fn mark_notification_read(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Notification, StorageError>;

    /// Mark every unread notification of a user read. Returns the count.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] on backend failure.
    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, StorageError>;

    /// Delete a notification. Scoped to its owner.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if it does not exist or belongs to
    /// another user.
    async fn delete_notification(&self, user_id: Uuid, id: Uuid) -> Result<(), StorageError>;

    /// Delete read notifications created before `older_than`. Returns the count.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] on backend failure.
    async fn purge_read_notifications(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<u64, StorageError>;

    // ── Audit ────────────────────────────────────────────────────────

    /// Append an audit record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] on backend failure.
    async fn write_audit(&self, record: NewAuditRecord) -> Result<(), StorageError>;

    /// List audit records newest first, optionally for one actor.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] on backend failure.
    async fn list_audit(
        &self,
        actor: Option<Uuid>,
        page: Page,
    ) -> Result<Vec<AuditRecord>, StorageError>;

    // ── Health ───────────────────────────────────────────────────────

    /// Cheap liveness check against the backend.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the backend is unreachable.
    async fn ping(&self) -> Result<(), StorageError>;
}
