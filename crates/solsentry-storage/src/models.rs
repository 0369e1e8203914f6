//! Persistent domain models.
//!
//! Row types carry `sqlx::FromRow` when the `postgres` feature is enabled so
//! the same structs serve both backends. All IDs are UUIDs and all timestamps
//! are UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Roles ────────────────────────────────────────────────────────────

/// Platform role attached to every user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular account: owns and analyzes its own contracts.
    User,
    /// Read access to every contract and analysis.
    Auditor,
    /// Full access, including user management and the audit log.
    Admin,
}

impl Role {
    /// Whether this role may read resources owned by other users.
    #[must_use]
    pub const fn can_read_all(self) -> bool {
        matches!(self, Self::Auditor | Self::Admin)
    }

    /// Whether this role may modify resources owned by other users.
    #[must_use]
    pub const fn can_write_all(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Auditor => write!(f, "auditor"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "auditor" => Ok(Self::Auditor),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

// ── Users ────────────────────────────────────────────────────────────

/// A registered account.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`Store::create_user`](crate::Store::create_user).
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

// ── Contracts ────────────────────────────────────────────────────────

/// A stored Solidity source unit.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Contract {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub source: String,
    pub source_hash: String,
    pub compiler_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Contract listing entry (no source body).
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct ContractSummary {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub source_hash: String,
    pub compiler_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Contract> for ContractSummary {
    fn from(c: &Contract) -> Self {
        Self {
            id: c.id,
            owner_id: c.owner_id,
            name: c.name.clone(),
            description: c.description.clone(),
            source_hash: c.source_hash.clone(),
            compiler_version: c.compiler_version.clone(),
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Input for [`Store::create_contract`](crate::Store::create_contract).
#[derive(Debug, Clone)]
pub struct NewContract {
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub source: String,
    pub source_hash: String,
    pub compiler_version: Option<String>,
}

/// Partial update. `None` fields are left unchanged. When `source` is set,
/// `source_hash` and `compiler_version` must be set alongside it.
#[derive(Debug, Clone, Default)]
pub struct ContractUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub source_hash: Option<String>,
    pub compiler_version: Option<Option<String>>,
}

// ── Analyses ─────────────────────────────────────────────────────────

/// What an analysis run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Security,
    Gas,
    Rewrite,
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Security => write!(f, "security"),
            Self::Gas => write!(f, "gas"),
            Self::Rewrite => write!(f, "rewrite"),
        }
    }
}

/// Lifecycle of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl AnalysisStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 4] = [Self::Pending, Self::Running, Self::Completed, Self::Failed];

    /// Whether the run has finished (successfully or not).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A single analysis run against a contract.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Analysis {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub requested_by: Uuid,
    pub kind: AnalysisKind,
    pub status: AnalysisStatus,
    pub risk_score: i32,
    pub summary: String,
    pub findings: serde_json::Value,
    pub gas_report: serde_json::Value,
    pub rewritten_source: Option<String>,
    pub model: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for [`Store::create_analysis`](crate::Store::create_analysis).
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub contract_id: Uuid,
    pub requested_by: Uuid,
    pub kind: AnalysisKind,
}

/// Result payload written when an analysis completes.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOutcome {
    pub risk_score: i32,
    pub summary: String,
    pub findings: serde_json::Value,
    pub gas_report: serde_json::Value,
    pub rewritten_source: Option<String>,
    pub model: Option<String>,
    /// Non-fatal error (e.g. the AI provider failed but heuristics succeeded).
    pub error: Option<String>,
}

// ── Notifications ────────────────────────────────────────────────────

/// An in-app notification for a user.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for [`Store::create_notification`](crate::Store::create_notification).
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

// ── Audit ────────────────────────────────────────────────────────────

/// A persisted audit log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub actor_role: Option<String>,
    pub method: String,
    pub path: String,
    pub status: i32,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Input for [`Store::write_audit`](crate::Store::write_audit).
#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    pub actor_id: Option<Uuid>,
    pub actor_role: Option<String>,
    pub method: String,
    pub path: String,
    pub status: i32,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub detail: serde_json::Value,
}

/// Canonical form of an email address: trimmed and Unicode lower-cased.
///
/// Every backend stores and compares emails in this form.
#[must_use]
pub fn fold_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Pagination window shared by every list operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    /// Hard upper bound on `limit`.
    pub const MAX_LIMIT: i64 = 500;

    /// Build a page, clamping `limit` to `1..=MAX_LIMIT` and `offset` to `>= 0`.
    #[must_use]
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset: offset.max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(50, 0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("auditor".parse::<Role>().unwrap(), Role::Auditor);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn role_capabilities() {
        assert!(!Role::User.can_read_all());
        assert!(Role::Auditor.can_read_all());
        assert!(!Role::Auditor.can_write_all());
        assert!(Role::Admin.can_write_all());
    }

    #[test]
    fn fold_email_is_unicode_aware() {
        assert_eq!(fold_email("  Dev@X.IO "), "dev@x.io");
        assert_eq!(fold_email("ÉLODIE@Straße.de"), "élodie@straße.de");
    }

    #[test]
    fn page_clamps_bounds() {
        let p = Page::new(10_000, -5);
        assert_eq!(p.limit, Page::MAX_LIMIT);
        assert_eq!(p.offset, 0);
        assert_eq!(Page::new(0, 3).limit, 1);
    }
}
