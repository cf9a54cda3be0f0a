//! Token store abstraction.
//!
//! The issuer and the gateway never talk to each other; they share state only
//! through a [`TokenStore`]. Two backends exist:
//!
//! - [`PgTokenStore`]: PostgreSQL via sqlx, used whenever `DATABASE_URL` is set
//! - [`MemoryTokenStore`]: process-local map for development and tests

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::db;
use crate::error::StoreError;
use crate::models::token::TokenRecord;

pub mod memory;
pub mod postgres;

pub use memory::MemoryTokenStore;
pub use postgres::PgTokenStore;

/// Persistence operations needed by the issuer and the gateway.
///
/// Implementations must treat every argument as data (bound parameters),
/// never as query text.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Find a token issued for `(file_reference, owner_entity_id)`.
    ///
    /// With `valid_at = None` any record matches, expired or not. With
    /// `Some(now)` only records whose `expires_at` is after `now` match.
    /// When several records match, the most recently issued one wins.
    async fn find_by_pair(
        &self,
        file_reference: &str,
        owner_entity_id: i64,
        valid_at: Option<DateTime<Utc>>,
    ) -> Result<Option<TokenRecord>, StoreError>;

    /// Find the record for a token string.
    async fn find_by_token(&self, token: &str) -> Result<Option<TokenRecord>, StoreError>;

    /// Persist a freshly issued record.
    async fn insert(&self, record: &TokenRecord) -> Result<(), StoreError>;

    /// Cheap connectivity check used by the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Open the store selected by configuration.
///
/// With `DATABASE_URL` set, connects to PostgreSQL and applies migrations.
/// Otherwise falls back to an in-memory store whose tokens die with the process.
pub async fn connect(config: &Config) -> anyhow::Result<Arc<dyn TokenStore>> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, tokens are kept in memory");
        return Ok(Arc::new(MemoryTokenStore::new()));
    };

    let pool = db::create_pool(database_url, config.store_timeout()).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    Ok(Arc::new(PgTokenStore::new(pool)))
}

/// Run a store call under a deadline, mapping expiry to [`StoreError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_calls_time_out() {
        let limit = Duration::from_millis(10);
        let result: Result<(), StoreError> = with_timeout(limit, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout(d)) if d == limit));
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(result.ok(), Some(7));
    }
}
