//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use chrono::{DateTime, Duration, Utc};
use file_token_gateway::config::Config;
use file_token_gateway::error::StoreError;
use file_token_gateway::models::token::TokenRecord;
use file_token_gateway::router;
use file_token_gateway::services::token_issuer::TokenIssuer;
use file_token_gateway::state::AppState;
use file_token_gateway::store::{MemoryTokenStore, TokenStore};
use tempfile::TempDir;
use tower::ServiceExt;

/// Smallest byte sequence recognised as a PNG image.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x02\0\0\0";

/// Router over an in-memory store and two temporary storage roots.
pub struct TestServer {
    pub router: Router,
    pub store: Arc<MemoryTokenStore>,
    pub config: Config,
    pub private_dir: TempDir,
    pub public_dir: TempDir,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let private_dir = tempfile::tempdir().expect("create private root");
        let public_dir = tempfile::tempdir().expect("create public root");

        let mut config = Config {
            private_files_root: private_dir.path().to_path_buf(),
            public_files_root: public_dir.path().to_path_buf(),
            base_url: "https://files.example.com".to_string(),
            ..Config::default()
        };
        adjust(&mut config);

        let store = Arc::new(MemoryTokenStore::new());
        let dyn_store: Arc<dyn TokenStore> = store.clone();
        let router = router(AppState::new(dyn_store, &config));

        Self {
            router,
            store,
            config,
            private_dir,
            public_dir,
        }
    }

    pub fn issuer(&self) -> TokenIssuer {
        let store: Arc<dyn TokenStore> = self.store.clone();
        TokenIssuer::new(store, &self.config).expect("valid issuer config")
    }

    pub fn write_private(&self, relative: &str, contents: &[u8]) {
        write_file(self.private_dir.path(), relative, contents);
    }

    pub fn write_public(&self, relative: &str, contents: &[u8]) {
        write_file(self.public_dir.path(), relative, contents);
    }

    /// Store a record directly, bypassing the issuer.
    pub async fn insert_token(
        &self,
        token: &str,
        file_reference: &str,
        owner_entity_id: i64,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) {
        self.store
            .insert(&TokenRecord {
                token: token.to_string(),
                owner_entity_id,
                file_reference: file_reference.to_string(),
                expires_at: created_at + ttl,
                created_at,
            })
            .await
            .expect("insert token");
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        get(&self.router, uri).await
    }
}

fn write_file(root: &Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(path, contents).expect("write fixture file");
}

/// Status, headers and fully collected body of a response.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub async fn get(router: &Router, uri: &str) -> TestResponse {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();

    TestResponse {
        status,
        headers,
        body,
    }
}

/// Store whose calls can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryTokenStore,
    pub fail_lookups: bool,
    pub fail_inserts: bool,
}

fn unavailable() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl TokenStore for FlakyStore {
    async fn find_by_pair(
        &self,
        file_reference: &str,
        owner_entity_id: i64,
        valid_at: Option<DateTime<Utc>>,
    ) -> Result<Option<TokenRecord>, StoreError> {
        if self.fail_lookups {
            return Err(unavailable());
        }
        self.inner
            .find_by_pair(file_reference, owner_entity_id, valid_at)
            .await
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
        if self.fail_lookups {
            return Err(unavailable());
        }
        self.inner.find_by_token(token).await
    }

    async fn insert(&self, record: &TokenRecord) -> Result<(), StoreError> {
        if self.fail_inserts {
            return Err(unavailable());
        }
        self.inner.insert(record).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.fail_lookups {
            return Err(unavailable());
        }
        Ok(())
    }
}
