//! Storage error types.
//!
//! Every variant carries enough context to diagnose the failure without a
//! debugger. Backend-specific errors are flattened into [`StorageError::Backend`].

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested row does not exist (or is not visible to the caller).
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// A uniqueness constraint was violated (duplicate email, username, ...).
    #[error("conflict: {reason}")]
    Conflict { reason: String },

    /// Failed to connect to the backend or run the schema migration.
    #[error("failed to open storage: {reason}")]
    Open { reason: String },

    /// The backend returned an error while executing a query.
    #[error("storage backend error: {reason}")]
    Backend { reason: String },
}

impl StorageError {
    /// Shorthand for a [`StorageError::NotFound`] on the given entity.
    #[must_use]
    pub const fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound { entity: "row" },
            sqlx::Error::Database(db_err) => {
                // PostgreSQL unique violation
                match db_err.code().as_deref() {
                    Some("23505") => Self::Conflict {
                        reason: db_err
                            .constraint()
                            .map_or_else(|| "resource already exists".to_owned(), |c| {
                                format!("unique constraint '{c}' violated")
                            }),
                    },
                    // Foreign key violation: the referenced parent row is gone.
                    Some("23503") => Self::NotFound {
                        entity: "referenced row",
                    },
                    _ => Self::Backend {
                        reason: db_err.to_string(),
                    },
                }
            }
            _ => Self::Backend {
                reason: err.to_string(),
            },
        }
    }
}
