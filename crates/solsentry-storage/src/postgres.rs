//! PostgreSQL store.
//!
//! Feature-gated behind `postgres`. Every query is a runtime-bound `sqlx`
//! statement with positional parameters; no compile-time database access is
//! required. The schema in `migrations/0001_init.sql` is applied on connect.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    fold_email, Analysis, AnalysisOutcome, AnalysisStatus, AuditRecord, Contract,
    ContractSummary, ContractUpdate, NewAnalysis, NewAuditRecord, NewContract, NewNotification,
    NewUser, Notification, Page, Role, User,
};
use crate::{Store, StorageError};

const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

/// A [`Store`] backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore")
            .field("pool", &"[PgPool]")
            .finish_non_exhaustive()
    }
}

impl PostgresStore {
    /// Connect to PostgreSQL and apply the bundled schema.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the connection or migration fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Open {
                reason: e.to_string(),
            })?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| StorageError::Open {
                reason: format!("migration failed: {e}"),
            })?;

        tracing::info!("database schema up to date");
        Ok(Self { pool })
    }

    /// Wrap an existing pool without running migrations.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CONTRACT_SUMMARY_COLUMNS: &str =
    "id, owner_id, name, description, source_hash, compiler_version, created_at, updated_at";

#[async_trait::async_trait]
impl Store for PostgresStore {
    // ── Users ────────────────────────────────────────────────────────

    async fn create_user(&self, user: NewUser) -> Result<User, StorageError> {
        let row = sqlx::query_as::<_, User>(
            r"INSERT INTO users (id, email, username, password_hash, role)
              VALUES ($1, $2, $3, $4, $5)
              RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(fold_email(&user.email))
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_user(&self, id: Uuid) -> Result<User, StorageError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::not_found("user"))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StorageError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(fold_email(email))
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::not_found("user"))
    }

    async fn list_users(&self, page: Page) -> Result<Vec<User>, StorageError> {
        let rows = sqlx::query_as::<_, User>(
            "SELECT * FROM users ORDER BY created_at LIMIT $1 OFFSET $2",
        )
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn update_user_role(&self, id: Uuid, role: Role) -> Result<User, StorageError> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET role = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::not_found("user"))
    }

    async fn set_user_active(&self, id: Uuid, active: bool) -> Result<User, StorageError> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET active = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::not_found("user"))
    }

    async fn count_users(&self) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ── Contracts ────────────────────────────────────────────────────

    async fn create_contract(&self, contract: NewContract) -> Result<Contract, StorageError> {
        let row = sqlx::query_as::<_, Contract>(
            r"INSERT INTO contracts (id, owner_id, name, description, source, source_hash, compiler_version)
              VALUES ($1, $2, $3, $4, $5, $6, $7)
              RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(contract.owner_id)
        .bind(&contract.name)
        .bind(&contract.description)
        .bind(&contract.source)
        .bind(&contract.source_hash)
        .bind(&contract.compiler_version)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_contract(&self, id: Uuid) -> Result<Contract, StorageError> {
        sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::not_found("contract"))
    }

    async fn list_contracts(
        &self,
        owner: Option<Uuid>,
        page: Page,
    ) -> Result<Vec<ContractSummary>, StorageError> {
        let sql = format!(
            r"SELECT {CONTRACT_SUMMARY_COLUMNS} FROM contracts
              WHERE ($1::uuid IS NULL OR owner_id = $1)
              ORDER BY created_at DESC
              LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, ContractSummary>(&sql)
            .bind(owner)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn update_contract(
        &self,
        id: Uuid,
        update: ContractUpdate,
    ) -> Result<Contract, StorageError> {
        let (set_version, version) = match update.compiler_version {
            Some(v) => (true, v),
            None => (false, None),
        };

        sqlx::query_as::<_, Contract>(
            r"UPDATE contracts SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                source = COALESCE($4, source),
                source_hash = COALESCE($5, source_hash),
                compiler_version = CASE WHEN $6 THEN $7 ELSE compiler_version END,
                updated_at = now()
              WHERE id = $1
              RETURNING *",
        )
        .bind(id)
        .bind(update.name)
        .bind(update.description)
        .bind(update.source)
        .bind(update.source_hash)
        .bind(set_version)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::not_found("contract"))
    }

    async fn delete_contract(&self, id: Uuid) -> Result<(), StorageError> {
        // Analyses go with it via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM contracts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("contract"));
        }
        Ok(())
    }

    async fn count_contracts(&self) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contracts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ── Analyses ─────────────────────────────────────────────────────

    async fn create_analysis(&self, analysis: NewAnalysis) -> Result<Analysis, StorageError> {
        let row = sqlx::query_as::<_, Analysis>(
            r"INSERT INTO analyses (id, contract_id, requested_by, kind)
              VALUES ($1, $2, $3, $4)
              RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(analysis.contract_id)
        .bind(analysis.requested_by)
        .bind(analysis.kind)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match StorageError::from(e) {
            StorageError::NotFound { .. } => StorageError::not_found("contract"),
            other => other,
        })?;

        Ok(row)
    }

    async fn mark_analysis_running(&self, id: Uuid) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE analyses SET status = 'running' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("analysis"));
        }
        Ok(())
    }

    async fn complete_analysis(
        &self,
        id: Uuid,
        outcome: AnalysisOutcome,
    ) -> Result<Analysis, StorageError> {
        sqlx::query_as::<_, Analysis>(
            r"UPDATE analyses SET
                status = 'completed',
                risk_score = $2,
                summary = $3,
                findings = $4,
                gas_report = $5,
                rewritten_source = $6,
                model = $7,
                error = $8,
                completed_at = now()
              WHERE id = $1
              RETURNING *",
        )
        .bind(id)
        .bind(outcome.risk_score)
        .bind(&outcome.summary)
        .bind(&outcome.findings)
        .bind(&outcome.gas_report)
        .bind(&outcome.rewritten_source)
        .bind(&outcome.model)
        .bind(&outcome.error)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::not_found("analysis"))
    }

    async fn fail_analysis(&self, id: Uuid, error: &str) -> Result<Analysis, StorageError> {
        sqlx::query_as::<_, Analysis>(
            r"UPDATE analyses SET status = 'failed', error = $2, completed_at = now()
              WHERE id = $1
              RETURNING *",
        )
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::not_found("analysis"))
    }

    async fn fail_interrupted_analyses(&self, error: &str) -> Result<Vec<Analysis>, StorageError> {
        let rows = sqlx::query_as::<_, Analysis>(
            r"UPDATE analyses SET status = 'failed', error = $1, completed_at = now()
              WHERE status IN ('pending', 'running')
              RETURNING *",
        )
        .bind(error)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_analysis(&self, id: Uuid) -> Result<Analysis, StorageError> {
        sqlx::query_as::<_, Analysis>("SELECT * FROM analyses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::not_found("analysis"))
    }

    async fn list_analyses(&self, contract_id: Uuid) -> Result<Vec<Analysis>, StorageError> {
        let rows = sqlx::query_as::<_, Analysis>(
            "SELECT * FROM analyses WHERE contract_id = $1 ORDER BY created_at DESC",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count_analyses_by_status(
        &self,
    ) -> Result<Vec<(AnalysisStatus, i64)>, StorageError> {
        let rows = sqlx::query_as::<_, (AnalysisStatus, i64)>(
            "SELECT status, COUNT(*) FROM analyses GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(AnalysisStatus::ALL
            .iter()
            .map(|s| {
                let n = rows.iter().find(|(st, _)| st == s).map_or(0, |(_, n)| *n);
                (*s, n)
            })
            .collect())
    }

    // ── Notifications ────────────────────────────────────────────────

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StorageError> {
        let row = sqlx::query_as::<_, Notification>(
            r"INSERT INTO notifications (id, user_id, kind, title, body, link)
              VALUES ($1, $2, $3, $4, $5, $6)
              RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(notification.user_id)
        .bind(&notification.kind)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&notification.link)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        page: Page,
    ) -> Result<Vec<Notification>, StorageError> {
        let rows = sqlx::query_as::<_, Notification>(
            r"SELECT * FROM notifications
              WHERE user_id = $1 AND (NOT $2 OR read_at IS NULL)
              ORDER BY created_at DESC
              LIMIT $3 OFFSET $4",
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn mark_notification_read(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Notification, StorageError> {
        sqlx::query_as::<_, Notification>(
            r"UPDATE notifications SET read_at = COALESCE(read_at, now())
              WHERE id = $1 AND user_id = $2
              RETURNING *",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::not_found("notification"))
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = now() WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_notification(&self, user_id: Uuid, id: Uuid) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("notification"));
        }
        Ok(())
    }

    async fn purge_read_notifications(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "DELETE FROM notifications WHERE read_at IS NOT NULL AND created_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ── Audit ────────────────────────────────────────────────────────

    async fn write_audit(&self, record: NewAuditRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"INSERT INTO audit_log (id, actor_id, actor_role, method, path, status, ip_address, user_agent, detail)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(Uuid::new_v4())
        .bind(record.actor_id)
        .bind(&record.actor_role)
        .bind(&record.method)
        .bind(&record.path)
        .bind(record.status)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .bind(&record.detail)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_audit(
        &self,
        actor: Option<Uuid>,
        page: Page,
    ) -> Result<Vec<AuditRecord>, StorageError> {
        let rows = sqlx::query_as::<_, AuditRecord>(
            r"SELECT * FROM audit_log
              WHERE ($1::uuid IS NULL OR actor_id = $1)
              ORDER BY created_at DESC
              LIMIT $2 OFFSET $3",
        )
        .bind(actor)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ── Health ───────────────────────────────────────────────────────

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
