//! Access/refresh token handling.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::storage::{self, LocalStore, StorageError, keys};

/// Seconds before the stated expiry at which a token is treated as expired.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// Tokens for the signed-in customer.
///
/// Implements `Debug` manually to redact token values.
#[derive(Clone)]
pub struct AuthTokens {
    /// Bearer token attached to authenticated requests.
    pub access_token: SecretString,
    /// Token used to obtain a new access token.
    pub refresh_token: Option<SecretString>,
    /// When the access token stops being accepted, if known.
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AuthTokens {
    /// Build tokens from a token endpoint response received now.
    #[must_use]
    pub fn from_response(response: TokenResponse) -> Self {
        Self::from_response_at(response, Utc::now())
    }

    fn from_response_at(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: SecretString::from(response.access_token),
            refresh_token: response.refresh_token.map(SecretString::from),
            expires_at: response
                .expires_in
                .map(|secs| now + Duration::seconds(secs)),
        }
    }

    /// Check if the access token is expired (with 60s buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires_at| now >= expires_at - Duration::seconds(EXPIRY_BUFFER_SECS))
    }

    /// Whether a refresh is possible.
    #[must_use]
    pub const fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Whether both values carry the same access token.
    #[must_use]
    pub fn same_access_token(&self, other: &Self) -> bool {
        self.access_token.expose_secret() == other.access_token.expose_secret()
    }

    /// Carry the previous refresh token over when the backend does not rotate it.
    #[must_use]
    pub fn or_keep_refresh_token(mut self, previous: &Self) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token.clone_from(&previous.refresh_token);
        }
        self
    }
}

/// Raw token payload from the auth endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// On-disk form of [`AuthTokens`].
#[derive(Serialize, Deserialize)]
struct PersistedTokens {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl From<&AuthTokens> for PersistedTokens {
    fn from(tokens: &AuthTokens) -> Self {
        Self {
            access_token: tokens.access_token.expose_secret().to_string(),
            refresh_token: tokens
                .refresh_token
                .as_ref()
                .map(|t| t.expose_secret().to_string()),
            expires_at: tokens.expires_at,
        }
    }
}

impl From<PersistedTokens> for AuthTokens {
    fn from(persisted: PersistedTokens) -> Self {
        Self {
            access_token: SecretString::from(persisted.access_token),
            refresh_token: persisted.refresh_token.map(SecretString::from),
            expires_at: persisted.expires_at,
        }
    }
}

/// Current tokens, mirrored to local storage.
pub struct TokenStore {
    store: Arc<dyn LocalStore>,
    current: RwLock<Option<AuthTokens>>,
}

impl TokenStore {
    /// Load any persisted tokens from `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be read.
    pub fn load(store: Arc<dyn LocalStore>) -> Result<Self, StorageError> {
        let persisted: Option<PersistedTokens> =
            storage::load_json(store.as_ref(), keys::AUTH_TOKENS)?;

        Ok(Self {
            store,
            current: RwLock::new(persisted.map(AuthTokens::from)),
        })
    }

    /// A copy of the current tokens.
    #[must_use]
    pub fn current(&self) -> Option<AuthTokens> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether tokens are present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Replace the current tokens and persist them.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be written, in which case
    /// the in-memory tokens are left unchanged.
    pub fn set(&self, tokens: AuthTokens) -> Result<(), StorageError> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        storage::save_json(self.store.as_ref(), keys::AUTH_TOKENS, &PersistedTokens::from(&tokens))?;
        *current = Some(tokens);
        Ok(())
    }

    /// Install `renewed` in place of `stale`.
    ///
    /// Nothing is stored if the tokens changed since `stale` was read. Returns
    /// the tokens now in effect: `renewed`, tokens from a newer sign in, or
    /// `None` if the customer signed out in the meantime.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be written.
    pub fn renew(&self, stale: &AuthTokens, renewed: AuthTokens) -> Result<Option<AuthTokens>, StorageError> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        match current.as_ref() {
            Some(tokens) if tokens.same_access_token(stale) => {
                storage::save_json(self.store.as_ref(), keys::AUTH_TOKENS, &PersistedTokens::from(&renewed))?;
                *current = Some(renewed.clone());
                Ok(Some(renewed))
            }
            other => Ok(other.cloned()),
        }
    }

    /// Forget the current tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be written.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = None;
        self.store.remove(keys::AUTH_TOKENS)
    }

    /// Forget the current tokens if they are still `ended`. A newer sign in
    /// is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be written.
    pub fn clear_if_current(&self, ended: &AuthTokens) -> Result<(), StorageError> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|tokens| tokens.same_access_token(ended)) {
            *current = None;
            self.store.remove(keys::AUTH_TOKENS)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn response(access: &str, refresh: Option<&str>, expires_in: Option<i64>) -> TokenResponse {
        TokenResponse {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in,
            token_type: Some("Bearer".to_string()),
        }
    }

    #[test]
    fn test_expiry_uses_buffer() {
        let now = Utc::now();
        let tokens = AuthTokens::from_response_at(response("a", None, Some(3600)), now);

        assert!(!tokens.is_expired_at(now));
        assert!(!tokens.is_expired_at(now + Duration::seconds(3539)));
        assert!(tokens.is_expired_at(now + Duration::seconds(3540)));
    }

    #[test]
    fn test_no_expiry_never_expires() {
        let tokens = AuthTokens::from_response(response("a", None, None));
        assert!(!tokens.is_expired());
    }

    #[test]
    fn test_keeps_previous_refresh_token() {
        let old = AuthTokens::from_response(response("old", Some("r1"), None));
        let new = AuthTokens::from_response(response("new", None, None)).or_keep_refresh_token(&old);
        assert_eq!(new.refresh_token.unwrap().expose_secret(), "r1");

        let rotated =
            AuthTokens::from_response(response("new", Some("r2"), None)).or_keep_refresh_token(&old);
        assert_eq!(rotated.refresh_token.unwrap().expose_secret(), "r2");
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let tokens = AuthTokens::from_response(response("access-secret", Some("refresh-secret"), None));
        let debug_output = format!("{tokens:?}");
        assert!(!debug_output.contains("access-secret"));
        assert!(!debug_output.contains("refresh-secret"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_token_store_persists() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        let tokens = TokenStore::load(Arc::clone(&store)).unwrap();
        assert!(!tokens.is_authenticated());

        tokens
            .set(AuthTokens::from_response(response("a1", Some("r1"), Some(60))))
            .unwrap();

        let reloaded = TokenStore::load(Arc::clone(&store)).unwrap();
        let current = reloaded.current().unwrap();
        assert_eq!(current.access_token.expose_secret(), "a1");
        assert_eq!(current.refresh_token.unwrap().expose_secret(), "r1");

        reloaded.clear().unwrap();
        assert!(TokenStore::load(store).unwrap().current().is_none());
    }

    #[test]
    fn test_renew_replaces_only_stale_tokens() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        let tokens = TokenStore::load(Arc::clone(&store)).unwrap();
        let stale = AuthTokens::from_response(response("a1", Some("r1"), None));
        tokens.set(stale.clone()).unwrap();

        let renewed = AuthTokens::from_response(response("a2", None, None));
        let current = tokens.renew(&stale, renewed).unwrap().unwrap();
        assert_eq!(current.access_token.expose_secret(), "a2");

        // A second renewal of the same stale token keeps the first result.
        let late = AuthTokens::from_response(response("a3", None, None));
        let current = tokens.renew(&stale, late).unwrap().unwrap();
        assert_eq!(current.access_token.expose_secret(), "a2");
    }

    #[test]
    fn test_renew_after_sign_out_stores_nothing() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        let tokens = TokenStore::load(Arc::clone(&store)).unwrap();
        let stale = AuthTokens::from_response(response("a1", Some("r1"), None));
        tokens.set(stale.clone()).unwrap();
        tokens.clear().unwrap();

        let renewed = AuthTokens::from_response(response("a2", None, None));
        assert!(tokens.renew(&stale, renewed).unwrap().is_none());
        assert!(!tokens.is_authenticated());
        assert!(store.get(keys::AUTH_TOKENS).unwrap().is_none());
    }

    #[test]
    fn test_clear_if_current_spares_newer_session() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        let tokens = TokenStore::load(store).unwrap();
        let old = AuthTokens::from_response(response("old", None, None));
        tokens
            .set(AuthTokens::from_response(response("new", None, None)))
            .unwrap();

        tokens.clear_if_current(&old).unwrap();
        assert!(tokens.is_authenticated());
    }
}
