//! Shared fixtures for the server integration tests: an in-memory app with
//! a scripted AI provider, and request helpers driven through `oneshot`.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use solsentry_core::ai::{AiProvider, AiReview, AiRewrite, ReviewRequest, RewriteRequest};
use solsentry_core::audit::{AuditManager, StoreAuditBackend};
use solsentry_core::audit_file::FileAuditBackend;
use solsentry_core::auth::TokenIssuer;
use solsentry_core::error::AiError;
use solsentry_core::pipeline::AnalysisPipeline;
use solsentry_core::scanner::{Finding, FindingSource, Severity};
use solsentry_server::app::build_router;
use solsentry_server::config::ServerConfig;
use solsentry_server::state::AppState;
use chrono::{DateTime, Utc};
use solsentry_storage::{
    Analysis, AnalysisOutcome, AnalysisStatus, AuditRecord, Contract, ContractSummary,
    ContractUpdate, MemoryStore, NewAnalysis, NewAuditRecord, NewContract, NewNotification,
    NewUser, Notification, Page, Role, StorageError, Store, User,
};

pub const BANK: &str = r#"// SPDX-License-Identifier: MIT
pragma solidity ^0.8.0;

contract Bank {
    mapping(address => uint256) public balances;
    address owner;

    function deposit() public payable {
        balances[msg.sender] += msg.value;
    }

    function withdraw() public {
        require(tx.origin == owner);
        uint256 amount = balances[msg.sender];
        (bool ok, ) = msg.sender.call{value: amount}("");
        require(ok);
        balances[msg.sender] = 0;
    }
}
"#;

pub const FIXED_BANK: &str = r#"// SPDX-License-Identifier: MIT
pragma solidity 0.8.20;

contract Bank {
    mapping(address => uint256) public balances;

    function deposit() external payable {
        balances[msg.sender] += msg.value;
    }
}
"#;

/// Scripted provider: fixed review and rewrite, or a timeout on every call.
pub struct StubAi {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl StubAi {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiProvider for StubAi {
    fn name(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub-1"
    }

    async fn review(&self, _request: &ReviewRequest) -> Result<AiReview, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AiError::Timeout);
        }
        Ok(AiReview {
            summary: "Withdrawals are reentrant and gated on tx.origin.".to_owned(),
            risk_score: Some(85),
            findings: vec![Finding {
                rule_id: "ai-missing-events".to_owned(),
                title: "Balance changes emit no events".to_owned(),
                severity: Severity::Low,
                line: Some(9),
                description: "Deposits and withdrawals are not observable off-chain.".to_owned(),
                recommendation: "Emit Deposit and Withdrawal events.".to_owned(),
                source: FindingSource::Ai,
            }],
            model: "stub-1".to_owned(),
        })
    }

    async fn rewrite(&self, _request: &RewriteRequest) -> Result<AiRewrite, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AiError::Timeout);
        }
        Ok(AiRewrite {
            source: FIXED_BANK.to_owned(),
            notes: "Removed tx.origin and the external call.".to_owned(),
            model: "stub-1".to_owned(),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
}

/// Config with limits high enough to stay out of the way.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        rate_limit_per_minute: 100_000,
        ai_rate_limit_per_hour: 100_000,
        ..ServerConfig::default()
    }
}

pub async fn test_app(ai: Option<Arc<dyn AiProvider>>) -> TestApp {
    test_app_with(test_config(), ai).await
}

pub async fn test_app_with(config: ServerConfig, ai: Option<Arc<dyn AiProvider>>) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn Store> = store.clone();
    let state = Arc::new(build_state(config, ai, dyn_store).await);

    TestApp {
        router: build_router(Arc::clone(&state)),
        state,
        store,
    }
}

/// App backed by a [`FlakyStore`] over a shared in-memory store.
pub async fn flaky_app(ai: Option<Arc<dyn AiProvider>>) -> (TestApp, Arc<FlakyStore>) {
    let memory = MemoryStore::new();
    let flaky = Arc::new(FlakyStore::new(memory.clone()));
    let dyn_store: Arc<dyn Store> = flaky.clone();
    let state = Arc::new(build_state(test_config(), ai, dyn_store).await);

    let app = TestApp {
        router: build_router(Arc::clone(&state)),
        state,
        store: Arc::new(memory),
    };
    (app, flaky)
}

/// Assemble state the way `main` does, over `store`.
pub async fn build_state(
    config: ServerConfig,
    ai: Option<Arc<dyn AiProvider>>,
    store: Arc<dyn Store>,
) -> AppState {
    let audit = Arc::new(AuditManager::new());
    audit
        .add_backend(Arc::new(StoreAuditBackend::new(Arc::clone(&store))))
        .await;
    if let Some(path) = &config.audit_file_path {
        audit.add_backend(Arc::new(FileAuditBackend::new(path))).await;
    }

    let pipeline = Arc::new(AnalysisPipeline::new(
        ai,
        config.ai_max_concurrent,
        config.max_source_bytes,
    ));
    let tokens = TokenIssuer::new(b"test-secret", config.jwt_issuer.clone(), config.jwt_ttl_secs);
    AppState::new(config, store, pipeline, tokens, audit)
}

// ── Failing store ────────────────────────────────────────────────────

/// Delegates to a [`MemoryStore`] but can be told to fail selected writes.
pub struct FlakyStore {
    inner: MemoryStore,
    fail_complete: AtomicBool,
    fail_purge: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_complete: AtomicBool::new(false),
            fail_purge: AtomicBool::new(false),
        }
    }

    /// Make `complete_analysis` return a backend error.
    pub fn fail_complete(&self, fail: bool) {
        self.fail_complete.store(fail, Ordering::SeqCst);
    }

    /// Make `purge_read_notifications` return a backend error.
    pub fn fail_purge(&self, fail: bool) {
        self.fail_purge.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StorageError> {
        self.inner.create_user(user).await
    }

    async fn get_user(&self, id: Uuid) -> Result<User, StorageError> {
        self.inner.get_user(id).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StorageError> {
        self.inner.get_user_by_email(email).await
    }

    async fn list_users(&self, page: Page) -> Result<Vec<User>, StorageError> {
        self.inner.list_users(page).await
    }

    async fn update_user_role(&self, id: Uuid, role: Role) -> Result<User, StorageError> {
        self.inner.update_user_role(id, role).await
    }

    async fn set_user_active(&self, id: Uuid, active: bool) -> Result<User, StorageError> {
        self.inner.set_user_active(id, active).await
    }

    async fn count_users(&self) -> Result<i64, StorageError> {
        self.inner.count_users().await
    }

    async fn create_contract(&self, contract: NewContract) -> Result<Contract, StorageError> {
        self.inner.create_contract(contract).await
    }

    async fn get_contract(&self, id: Uuid) -> Result<Contract, StorageError> {
        self.inner.get_contract(id).await
    }

    async fn list_contracts(
        &self,
        owner: Option<Uuid>,
        page: Page,
    ) -> Result<Vec<ContractSummary>, StorageError> {
        self.inner.list_contracts(owner, page).await
    }

    async fn update_contract(
        &self,
        id: Uuid,
        update: ContractUpdate,
    ) -> Result<Contract, StorageError> {
        self.inner.update_contract(id, update).await
    }

    async fn delete_contract(&self, id: Uuid) -> Result<(), StorageError> {
        self.inner.delete_contract(id).await
    }

    async fn count_contracts(&self) -> Result<i64, StorageError> {
        self.inner.count_contracts().await
    }

    async fn create_analysis(&self, analysis: NewAnalysis) -> Result<Analysis, StorageError> {
        self.inner.create_analysis(analysis).await
    }

    async fn mark_analysis_running(&self, id: Uuid) -> Result<(), StorageError> {
        self.inner.mark_analysis_running(id).await
    }

    async fn complete_analysis(
        &self,
        id: Uuid,
        outcome: AnalysisOutcome,
    ) -> Result<Analysis, StorageError> {
        if self.fail_complete.load(Ordering::SeqCst) {
            return Err(StorageError::Backend {
                reason: "connection reset".to_owned(),
            });
        }
        self.inner.complete_analysis(id, outcome).await
    }

    async fn fail_analysis(&self, id: Uuid, error: &str) -> Result<Analysis, StorageError> {
        self.inner.fail_analysis(id, error).await
    }

    async fn fail_interrupted_analyses(&self, error: &str) -> Result<Vec<Analysis>, StorageError> {
        self.inner.fail_interrupted_analyses(error).await
    }

    async fn get_analysis(&self, id: Uuid) -> Result<Analysis, StorageError> {
        self.inner.get_analysis(id).await
    }

    async fn list_analyses(&self, contract_id: Uuid) -> Result<Vec<Analysis>, StorageError> {
        self.inner.list_analyses(contract_id).await
    }

    async fn count_analyses_by_status(&self) -> Result<Vec<(AnalysisStatus, i64)>, StorageError> {
        self.inner.count_analyses_by_status().await
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StorageError> {
        self.inner.create_notification(notification).await
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        page: Page,
    ) -> Result<Vec<Notification>, StorageError> {
        self.inner.list_notifications(user_id, unread_only, page).await
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<i64, StorageError> {
        self.inner.count_unread(user_id).await
    }

    async fn mark_notification_read(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Notification, StorageError> {
        self.inner.mark_notification_read(user_id, id).await
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, StorageError> {
        self.inner.mark_all_read(user_id).await
    }

    async fn delete_notification(&self, user_id: Uuid, id: Uuid) -> Result<(), StorageError> {
        self.inner.delete_notification(user_id, id).await
    }

    async fn purge_read_notifications(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        if self.fail_purge.load(Ordering::SeqCst) {
            return Err(StorageError::Backend {
                reason: "connection reset".to_owned(),
            });
        }
        self.inner.purge_read_notifications(older_than).await
    }

    async fn write_audit(&self, record: NewAuditRecord) -> Result<(), StorageError> {
        self.inner.write_audit(record).await
    }

    async fn list_audit(
        &self,
        actor: Option<Uuid>,
        page: Page,
    ) -> Result<Vec<AuditRecord>, StorageError> {
        self.inner.list_audit(actor, page).await
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.inner.ping().await
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub text: String,
}

impl TestApp {
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        self.send_with_headers(method, uri, token, body, &[]).await
    }

    pub async fn send_with_headers(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        extra: &[(&str, &str)],
    ) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        for (name, value) in extra {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Reply {
            status,
            headers,
            body,
            text,
        }
    }

    /// Register an account and return `(token, user_id)`.
    pub async fn register(&self, email: &str, username: &str) -> (String, Uuid) {
        let reply = self
            .send(
                "POST",
                "/v1/auth/register",
                None,
                Some(json!({
                    "email": email,
                    "username": username,
                    "password": "correct-horse-1",
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "register failed: {}", reply.text);
        let token = reply.body["token"].as_str().unwrap().to_owned();
        let id = reply.body["user"]["id"].as_str().unwrap().parse().unwrap();
        (token, id)
    }

    /// Register an account and give it `role` directly in the store.
    pub async fn register_with_role(&self, email: &str, username: &str, role: Role) -> (String, Uuid) {
        let (token, id) = self.register(email, username).await;
        self.store.update_user_role(id, role).await.unwrap();
        (token, id)
    }

    /// Submit [`BANK`] and return the contract id.
    pub async fn submit_bank(&self, token: &str) -> Uuid {
        let reply = self
            .send(
                "POST",
                "/v1/contracts",
                Some(token),
                Some(json!({ "name": "Bank", "description": "demo", "source": BANK })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "submit failed: {}", reply.text);
        reply.body["id"].as_str().unwrap().parse().unwrap()
    }
}

/// Rule ids of a findings array.
pub fn rule_ids(findings: &Value) -> Vec<String> {
    findings
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(|f| f["rule_id"].as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}
