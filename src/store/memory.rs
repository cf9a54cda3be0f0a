//! In-process token store.
//!
//! Records live only as long as the process. Used when no database is
//! configured and as the store behind the test suites.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::TokenStore;
use crate::error::StoreError;
use crate::models::token::TokenRecord;

/// [`TokenStore`] keyed by token string.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<String, TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired ones included.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn find_by_pair(
        &self,
        file_reference: &str,
        owner_entity_id: i64,
        valid_at: Option<DateTime<Utc>>,
    ) -> Result<Option<TokenRecord>, StoreError> {
        let records = self.records.read().await;
        let found = records
            .values()
            .filter(|r| r.file_reference == file_reference && r.owner_entity_id == owner_entity_id)
            .filter(|r| valid_at.is_none_or(|now| r.expires_at > now))
            .max_by_key(|r| r.created_at)
            .cloned();
        Ok(found)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
        Ok(self.records.read().await.get(token).cloned())
    }

    async fn insert(&self, record: &TokenRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.token) {
            return Err(StoreError::Duplicate(record.token.clone()));
        }
        records.insert(record.token.clone(), record.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(token: &str, reference: &str, owner: i64, issued: DateTime<Utc>) -> TokenRecord {
        TokenRecord {
            token: token.to_string(),
            owner_entity_id: owner,
            file_reference: reference.to_string(),
            expires_at: issued + Duration::hours(1),
            created_at: issued,
        }
    }

    #[tokio::test]
    async fn pair_lookup_ignores_expiry_without_filter() {
        let store = MemoryTokenStore::new();
        let issued = Utc::now() - Duration::hours(3);
        store
            .insert(&record("old", "/system/files/a.png", 1, issued))
            .await
            .unwrap();

        let any = store.find_by_pair("/system/files/a.png", 1, None).await.unwrap();
        assert_eq!(any.map(|r| r.token), Some("old".to_string()));

        let valid = store
            .find_by_pair("/system/files/a.png", 1, Some(Utc::now()))
            .await
            .unwrap();
        assert!(valid.is_none());
    }

    #[tokio::test]
    async fn pair_lookup_prefers_newest_and_matches_owner() {
        let store = MemoryTokenStore::new();
        let now = Utc::now();
        store
            .insert(&record("first", "ref", 1, now - Duration::minutes(5)))
            .await
            .unwrap();
        store.insert(&record("second", "ref", 1, now)).await.unwrap();
        store.insert(&record("other", "ref", 2, now)).await.unwrap();

        let found = store.find_by_pair("ref", 1, None).await.unwrap().unwrap();
        assert_eq!(found.token, "second");
        assert!(store.find_by_pair("ref", 3, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_tokens_are_rejected() {
        let store = MemoryTokenStore::new();
        let r = record("dup", "ref", 1, Utc::now());
        store.insert(&r).await.unwrap();
        assert!(matches!(
            store.insert(&r).await,
            Err(StoreError::Duplicate(token)) if token == "dup"
        ));
        assert_eq!(store.len().await, 1);
    }
}
