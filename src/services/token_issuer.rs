//! Token issuance.
//!
//! The upstream renderer asks for a token whenever it emits a file link. The
//! issuer hands back the token already stored for the (file reference, owner)
//! pair, or mints and persists a new one.
//!
//! # Concurrency
//!
//! Issuance is lookup-then-insert and not atomic. Two concurrent requests for
//! the same pair can both miss the lookup and insert two tokens; both resolve.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, distr::Alphanumeric};
use url::Url;

use crate::config::{Config, ConfigError};
use crate::models::token::{Durability, IssuedToken, TokenRecord};
use crate::store::{TokenStore, with_timeout};

/// Path segment the gateway route is mounted under.
pub const FILE_SRC_SEGMENT: &str = "getfilesrc";

/// Punctuation kept by [`sanitize_file_reference`] besides ASCII letters and digits.
const URL_SAFE_PUNCTUATION: &str = "$-_.+!*'(),{}|\\^~[]`<>#%\";/?:@&=";

/// Which existing records may be handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReusePolicy {
    /// Return any stored token for the pair, even an expired one.
    AnyExisting,

    /// Only return tokens that are still valid; mint a new one otherwise.
    UnexpiredOnly,
}

/// Issues or reuses tokens for file references.
pub struct TokenIssuer {
    store: Arc<dyn TokenStore>,
    file_src_base: Url,
    ttl: Duration,
    random_length: usize,
    reuse: ReusePolicy,
    store_timeout: StdDuration,
}

impl TokenIssuer {
    /// Build an issuer from configuration.
    ///
    /// # Errors
    ///
    /// Fails when the configuration does not validate, e.g. `BASE_URL` cannot
    /// carry a path or the token length is too short.
    pub fn new(store: Arc<dyn TokenStore>, config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut base = Url::parse(&config.base_url)?;
        // Links are always emitted as https
        if base.cannot_be_a_base()
            || (base.scheme() != "https" && base.set_scheme("https").is_err())
        {
            return Err(ConfigError::UnsupportedBaseUrl(config.base_url.clone()));
        }
        base.set_query(None);
        base.set_fragment(None);

        let reuse = if config.reissue_expired_tokens {
            ReusePolicy::UnexpiredOnly
        } else {
            ReusePolicy::AnyExisting
        };

        Ok(Self {
            store,
            file_src_base: base,
            ttl: config.token_ttl(),
            random_length: config.token_random_length,
            reuse,
            store_timeout: config.store_timeout(),
        })
    }

    pub fn reuse_policy(&self) -> ReusePolicy {
        self.reuse
    }

    /// Issue a token with the configured TTL.
    pub async fn issue(&self, file_reference: &str, owner_entity_id: i64) -> IssuedToken {
        self.issue_or_reuse(file_reference, owner_entity_id, self.ttl).await
    }

    /// Return the token stored for the pair, or create one valid for `ttl`.
    ///
    /// Never fails: store errors are logged and the caller still receives a
    /// token, marked [`Durability::Ephemeral`] when it could not be persisted.
    pub async fn issue_or_reuse(
        &self,
        file_reference: &str,
        owner_entity_id: i64,
        ttl: Duration,
    ) -> IssuedToken {
        let file_reference = sanitize_file_reference(file_reference);
        let now = Utc::now();

        let valid_at = match self.reuse {
            ReusePolicy::AnyExisting => None,
            ReusePolicy::UnexpiredOnly => Some(now),
        };

        let lookup = with_timeout(
            self.store_timeout,
            self.store.find_by_pair(&file_reference, owner_entity_id, valid_at),
        )
        .await;

        match lookup {
            Ok(Some(existing)) => {
                tracing::debug!(
                    file_reference = %file_reference,
                    owner_entity_id,
                    "Reusing existing token"
                );
                return IssuedToken {
                    url: self.file_src_url(&existing.token),
                    token: existing.token,
                    durability: Durability::Durable,
                    reused: true,
                };
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(
                    file_reference = %file_reference,
                    owner_entity_id,
                    error = %e,
                    "Token lookup failed, issuing a new token"
                );
            }
        }

        let token = generate_token(now, self.random_length);
        let record = TokenRecord {
            token: token.clone(),
            owner_entity_id,
            file_reference,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            created_at: now,
        };

        let durability = match with_timeout(self.store_timeout, self.store.insert(&record)).await
        {
            Ok(()) => {
                tracing::info!(
                    file_reference = %record.file_reference,
                    owner_entity_id,
                    expires_at = %record.expires_at,
                    "Issued new token"
                );
                Durability::Durable
            }
            Err(e) => {
                tracing::error!(
                    file_reference = %record.file_reference,
                    owner_entity_id,
                    error = %e,
                    "Error inserting token"
                );
                Durability::Ephemeral
            }
        };

        IssuedToken {
            url: self.file_src_url(&token),
            token,
            durability,
            reused: false,
        }
    }

    /// `https://<host>/getfilesrc/<token>`.
    pub fn file_src_url(&self, token: &str) -> Url {
        let mut url = self.file_src_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(FILE_SRC_SEGMENT).push(token);
        }
        url
    }
}

/// Build a token from the issue time and `random_length` random alphanumerics.
///
/// The timestamp prefix only reduces collisions; the suffix carries the
/// entropy and comes from the thread-local CSPRNG.
pub fn generate_token(now: DateTime<Utc>, random_length: usize) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(random_length)
        .map(char::from)
        .collect();
    format!("{}{}", now.timestamp(), suffix)
}

/// Drop every character that has no place in a URL.
pub fn sanitize_file_reference(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || URL_SAFE_PUNCTUATION.contains(*c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_timestamp_then_alphanumerics() {
        let now = Utc::now();
        let token = generate_token(now, 15);
        let prefix = now.timestamp().to_string();

        assert!(token.starts_with(&prefix));
        let suffix = &token[prefix.len()..];
        assert_eq!(suffix.len(), 15);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn tokens_do_not_repeat() {
        let now = Utc::now();
        let a = generate_token(now, 15);
        let b = generate_token(now, 15);
        assert_ne!(a, b);
    }

    #[test]
    fn sanitize_keeps_url_characters() {
        assert_eq!(
            sanitize_file_reference("/sites/default/files/a%20b.png?itok=x&y=1"),
            "/sites/default/files/a%20b.png?itok=x&y=1"
        );
    }

    #[test]
    fn sanitize_strips_whitespace_and_non_ascii() {
        assert_eq!(sanitize_file_reference("/system/files/a b\n.png"), "/system/files/ab.png");
        assert_eq!(sanitize_file_reference("café.png"), "caf.png");
    }
}
