//! Server configuration for `SolSentry`.
//!
//! Loads configuration from environment variables with sensible defaults.
//! All settings can be overridden via `SOLSENTRY_*` environment variables.

use std::net::SocketAddr;

const DEFAULT_PORT: u16 = 8080;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Storage backend type.
    pub storage_backend: StorageBackendType,
    /// Maximum pooled database connections (Postgres only).
    pub db_max_connections: u32,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// HS256 signing secret. A random one is generated at startup when unset.
    pub jwt_secret: Option<String>,
    /// Token lifetime in seconds.
    pub jwt_ttl_secs: u64,
    /// `iss` claim written into and required from every token.
    pub jwt_issuer: String,
    /// API key for the AI provider. AI features are disabled without it.
    pub ai_api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API.
    pub ai_base_url: String,
    pub ai_model: String,
    pub ai_timeout_secs: u64,
    /// Upper bound on in-flight AI requests, server wide.
    pub ai_max_concurrent: usize,
    /// General API budget per client IP.
    pub rate_limit_per_minute: u32,
    /// AI endpoint budget per user.
    pub ai_rate_limit_per_hour: u32,
    /// Largest accepted contract source.
    pub max_source_bytes: usize,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
    /// Path to the audit log file (if file audit is enabled).
    pub audit_file_path: Option<String>,
    /// Seconds between retention worker runs.
    pub retention_interval_secs: u64,
    /// Read notifications older than this are purged.
    pub notification_retention_days: u32,
    /// Bootstrap admin created at startup when both are set.
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    /// Username for the bootstrap admin. Derived from the email when unset.
    pub admin_username: Option<String>,
}

/// Supported storage backend types.
#[derive(Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// PostgreSQL persistent storage.
    Postgres { url: String },
}

impl std::fmt::Debug for StorageBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "Memory"),
            // The URL usually embeds a password.
            Self::Postgres { .. } => f
                .debug_struct("Postgres")
                .field("url", &"[REDACTED]")
                .finish(),
        }
    }
}

fn redact(value: Option<&String>) -> &'static str {
    if value.is_some() { "[REDACTED]" } else { "<unset>" }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("storage_backend", &self.storage_backend)
            .field("db_max_connections", &self.db_max_connections)
            .field("log_level", &self.log_level)
            .field("jwt_secret", &redact(self.jwt_secret.as_ref()))
            .field("jwt_ttl_secs", &self.jwt_ttl_secs)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("ai_api_key", &redact(self.ai_api_key.as_ref()))
            .field("ai_base_url", &self.ai_base_url)
            .field("ai_model", &self.ai_model)
            .field("ai_timeout_secs", &self.ai_timeout_secs)
            .field("ai_max_concurrent", &self.ai_max_concurrent)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("ai_rate_limit_per_hour", &self.ai_rate_limit_per_hour)
            .field("max_source_bytes", &self.max_source_bytes)
            .field("cors_origins", &self.cors_origins)
            .field("audit_file_path", &self.audit_file_path)
            .field("retention_interval_secs", &self.retention_interval_secs)
            .field("notification_retention_days", &self.notification_retention_days)
            .field("admin_email", &self.admin_email)
            .field("admin_password", &redact(self.admin_password.as_ref()))
            .field("admin_username", &self.admin_username)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT`: port to bind on, binds to `0.0.0.0`
    /// - `SOLSENTRY_BIND_ADDR`: full bind address (overrides `PORT`, default: `127.0.0.1:8080`)
    /// - `SOLSENTRY_STORAGE`: `memory` or `postgres` (default: `memory`)
    /// - `DATABASE_URL`: PostgreSQL connection string (required when `SOLSENTRY_STORAGE=postgres`)
    /// - `SOLSENTRY_DB_MAX_CONNECTIONS`: pool size (default: `10`)
    /// - `SOLSENTRY_LOG_LEVEL`: log filter (default: `info`)
    /// - `SOLSENTRY_JWT_SECRET`, `SOLSENTRY_JWT_TTL_SECS` (default: `86400`), `SOLSENTRY_JWT_ISSUER` (default: `solsentry`)
    /// - `SOLSENTRY_AI_API_KEY`, `SOLSENTRY_AI_BASE_URL`, `SOLSENTRY_AI_MODEL`,
    ///   `SOLSENTRY_AI_TIMEOUT_SECS` (default: `60`), `SOLSENTRY_AI_MAX_CONCURRENT` (default: `4`)
    /// - `SOLSENTRY_RATE_LIMIT_PER_MINUTE` (default: `120`), `SOLSENTRY_AI_RATE_LIMIT_PER_HOUR` (default: `30`)
    /// - `SOLSENTRY_MAX_SOURCE_BYTES` (default: `204800`)
    /// - `SOLSENTRY_CORS_ORIGINS`: comma separated, or `*` (default: `*`)
    /// - `SOLSENTRY_AUDIT_FILE`: path to audit log file (optional)
    /// - `SOLSENTRY_RETENTION_INTERVAL_SECS` (default: `3600`), `SOLSENTRY_NOTIFICATION_RETENTION_DAYS` (default: `30`)
    /// - `SOLSENTRY_ADMIN_EMAIL`, `SOLSENTRY_ADMIN_PASSWORD`: bootstrap admin
    /// - `SOLSENTRY_ADMIN_USERNAME`: bootstrap admin username (optional)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Empty values
    /// count as unset.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parse_or = |key: &str, default: u64| -> u64 {
            get(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        };

        // Priority: SOLSENTRY_BIND_ADDR > PORT > default 127.0.0.1:8080
        let bind_addr = if let Some(addr) = get("SOLSENTRY_BIND_ADDR") {
            addr.parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))
        } else if let Some(port_str) = get("PORT") {
            let port: u16 = port_str.parse().unwrap_or(DEFAULT_PORT);
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))
        };

        let storage_backend = match get("SOLSENTRY_STORAGE")
            .unwrap_or_else(|| "memory".to_owned())
            .to_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => {
                let url = get("DATABASE_URL")
                    .unwrap_or_else(|| "postgres://localhost/solsentry".to_owned());
                StorageBackendType::Postgres { url }
            }
            _ => StorageBackendType::Memory,
        };

        let cors_origins = get("SOLSENTRY_CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty() && *o != "*")
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            bind_addr,
            storage_backend,
            db_max_connections: u32::try_from(parse_or("SOLSENTRY_DB_MAX_CONNECTIONS", 10))
                .unwrap_or(10)
                .max(1),
            log_level: get("SOLSENTRY_LOG_LEVEL").unwrap_or_else(|| "info".to_owned()),
            jwt_secret: get("SOLSENTRY_JWT_SECRET"),
            jwt_ttl_secs: parse_or("SOLSENTRY_JWT_TTL_SECS", 86_400).max(60),
            jwt_issuer: get("SOLSENTRY_JWT_ISSUER").unwrap_or_else(|| "solsentry".to_owned()),
            ai_api_key: get("SOLSENTRY_AI_API_KEY"),
            ai_base_url: get("SOLSENTRY_AI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_owned()),
            ai_model: get("SOLSENTRY_AI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_owned()),
            ai_timeout_secs: parse_or("SOLSENTRY_AI_TIMEOUT_SECS", 60).max(1),
            ai_max_concurrent: usize::try_from(parse_or("SOLSENTRY_AI_MAX_CONCURRENT", 4))
                .unwrap_or(4)
                .max(1),
            rate_limit_per_minute: u32::try_from(parse_or("SOLSENTRY_RATE_LIMIT_PER_MINUTE", 120))
                .unwrap_or(120),
            ai_rate_limit_per_hour: u32::try_from(parse_or("SOLSENTRY_AI_RATE_LIMIT_PER_HOUR", 30))
                .unwrap_or(30),
            max_source_bytes: usize::try_from(parse_or(
                "SOLSENTRY_MAX_SOURCE_BYTES",
                solsentry_core::scanner::DEFAULT_MAX_SOURCE_BYTES as u64,
            ))
            .unwrap_or(solsentry_core::scanner::DEFAULT_MAX_SOURCE_BYTES),
            cors_origins,
            audit_file_path: get("SOLSENTRY_AUDIT_FILE"),
            retention_interval_secs: parse_or("SOLSENTRY_RETENTION_INTERVAL_SECS", 3600).max(1),
            notification_retention_days: u32::try_from(parse_or(
                "SOLSENTRY_NOTIFICATION_RETENTION_DAYS",
                30,
            ))
            .unwrap_or(30),
            admin_email: get("SOLSENTRY_ADMIN_EMAIL"),
            admin_password: get("SOLSENTRY_ADMIN_PASSWORD"),
            admin_username: get("SOLSENTRY_ADMIN_USERNAME"),
        }
    }

    /// Request body cap: the largest source plus room for the JSON envelope.
    #[must_use]
    pub fn body_limit_bytes(&self) -> usize {
        self.max_source_bytes.saturating_add(64 * 1024)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> ServerConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        ServerConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(c.storage_backend, StorageBackendType::Memory);
        assert_eq!(c.jwt_ttl_secs, 86_400);
        assert_eq!(c.jwt_issuer, "solsentry");
        assert_eq!(c.ai_model, "gpt-4o-mini");
        assert_eq!(c.ai_base_url, "https://api.openai.com/v1");
        assert_eq!(c.ai_max_concurrent, 4);
        assert_eq!(c.rate_limit_per_minute, 120);
        assert_eq!(c.ai_rate_limit_per_hour, 30);
        assert_eq!(c.max_source_bytes, 204_800);
        assert!(c.cors_origins.is_empty());
        assert_eq!(c.retention_interval_secs, 3600);
        assert_eq!(c.notification_retention_days, 30);
        assert!(c.jwt_secret.is_none());
        assert!(c.ai_api_key.is_none());
    }

    #[test]
    fn port_binds_all_interfaces_but_bind_addr_wins() {
        assert_eq!(
            config(&[("PORT", "9000")]).bind_addr,
            "0.0.0.0:9000".parse().unwrap()
        );
        assert_eq!(
            config(&[("PORT", "9000"), ("SOLSENTRY_BIND_ADDR", "10.0.0.1:7000")]).bind_addr,
            "10.0.0.1:7000".parse().unwrap()
        );
    }

    #[test]
    fn postgres_backend_and_cors_list() {
        let c = config(&[
            ("SOLSENTRY_STORAGE", "Postgres"),
            ("DATABASE_URL", "postgres://u:p@db/solsentry"),
            ("SOLSENTRY_CORS_ORIGINS", "https://a.example, https://b.example,"),
        ]);
        assert_eq!(
            c.storage_backend,
            StorageBackendType::Postgres {
                url: "postgres://u:p@db/solsentry".to_owned()
            }
        );
        assert_eq!(c.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert!(config(&[("SOLSENTRY_CORS_ORIGINS", "*")]).cors_origins.is_empty());
    }

    #[test]
    fn garbage_numbers_fall_back_to_defaults() {
        let c = config(&[
            ("SOLSENTRY_JWT_TTL_SECS", "soon"),
            ("SOLSENTRY_AI_MAX_CONCURRENT", "0"),
            ("SOLSENTRY_MAX_SOURCE_BYTES", "-1"),
        ]);
        assert_eq!(c.jwt_ttl_secs, 86_400);
        assert_eq!(c.ai_max_concurrent, 1);
        assert_eq!(c.max_source_bytes, 204_800);
        assert_eq!(c.body_limit_bytes(), 204_800 + 65_536);
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = config(&[
            ("SOLSENTRY_JWT_SECRET", "jwt-hunter2"),
            ("SOLSENTRY_AI_API_KEY", "sk-hunter2"),
            ("SOLSENTRY_ADMIN_PASSWORD", "admin-hunter2"),
            ("SOLSENTRY_STORAGE", "postgres"),
            ("DATABASE_URL", "postgres://u:db-hunter2@db/x"),
        ]);
        let debug = format!("{c:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }
}
