//! File token model.
//!
//! A token grants time-limited access to one stored file. Tokens are created
//! by the issuer and only ever read by the file gateway.

use chrono::{DateTime, Utc};
use url::Url;

/// Represents a token record from the database.
///
/// # Database Table
///
/// Maps to the `filetoken_list` table with columns:
/// - `token`: Primary key, the opaque token string
/// - `entity_id`: Entity (e.g. content item) that owns the file reference
/// - `image_url`: File reference, private (`/system/files/...`) or public
/// - `exp_timestamp`: When the token stops being accepted
/// - `request_timestamp`: When the token was issued
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TokenRecord {
    pub token: String,

    #[sqlx(rename = "entity_id")]
    pub owner_entity_id: i64,

    #[sqlx(rename = "image_url")]
    pub file_reference: String,

    #[sqlx(rename = "exp_timestamp")]
    pub expires_at: DateTime<Utc>,

    #[sqlx(rename = "request_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Whether the token is no longer accepted at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Whether an issued token made it into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// The record is persisted and the token will resolve.
    Durable,

    /// Persisting failed; the token was returned anyway and will not resolve.
    Ephemeral,
}

/// Result of an issuance request.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,

    /// `https://<host>/getfilesrc/<token>`, ready to embed in markup.
    pub url: Url,

    pub durability: Durability,

    /// True when an existing record for the pair was returned.
    pub reused: bool,
}

impl IssuedToken {
    pub fn is_durable(&self) -> bool {
        self.durability == Durability::Durable
    }
}
