//! PostgreSQL token store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::TokenStore;
use crate::db::DbPool;
use crate::error::StoreError;
use crate::models::token::TokenRecord;

/// [`TokenStore`] backed by the `filetoken_list` table.
#[derive(Debug, Clone)]
pub struct PgTokenStore {
    pool: DbPool,
}

impl PgTokenStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn find_by_pair(
        &self,
        file_reference: &str,
        owner_entity_id: i64,
        valid_at: Option<DateTime<Utc>>,
    ) -> Result<Option<TokenRecord>, StoreError> {
        // A NULL bound timestamp disables the expiry filter
        let record = sqlx::query_as::<_, TokenRecord>(
            r#"
            SELECT token, entity_id, image_url, exp_timestamp, request_timestamp
            FROM filetoken_list
            WHERE image_url = $1
              AND entity_id = $2
              AND ($3::timestamptz IS NULL OR exp_timestamp > $3)
            ORDER BY request_timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(file_reference)
        .bind(owner_entity_id)
        .bind(valid_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
        let record = sqlx::query_as::<_, TokenRecord>(
            r#"
            SELECT token, entity_id, image_url, exp_timestamp, request_timestamp
            FROM filetoken_list
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn insert(&self, record: &TokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO filetoken_list
                (token, entity_id, image_url, exp_timestamp, request_timestamp)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&record.token)
        .bind(record.owner_entity_id)
        .bind(&record.file_reference)
        .bind(record.expires_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Duplicate(record.token.clone())
            }
            other => StoreError::Database(other),
        })?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
