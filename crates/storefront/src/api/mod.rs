//! REST client for the commerce API.
//!
//! # Architecture
//!
//! - One [`ApiClient`] is shared by every service module
//! - The backend is the source of truth - no local pricing or stock logic
//! - Authenticated requests carry `Authorization: Bearer <access token>`
//!
//! # Token refresh
//!
//! When an authenticated request comes back `401`, the client exchanges the
//! refresh token at `POST auth/refresh` and replays the request once. Refreshes
//! are single-flight: concurrent requests that hit `401` with the same stale
//! token wait for one refresh and reuse its result. If the refresh itself is
//! rejected the tokens are dropped and the call fails with
//! [`ApiError::SessionExpired`].
//!
//! # Example
//!
//! ```rust,ignore
//! use marigold_storefront::api::{ApiClient, ApiRequest};
//!
//! let client = ApiClient::new(&config, store)?;
//! let cart: Cart = client.get("cart").await?;
//! let cart: Cart = client
//!     .send(ApiRequest::post("cart/items").json(&AddItem { sku_id, quantity })?)
//!     .await?;
//! ```

mod error;
mod tokens;

pub use error::ApiError;
pub use tokens::{AuthTokens, TokenResponse, TokenStore};

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::StorefrontConfig;
use crate::storage::LocalStore;

/// Maximum characters of a response body included in logs and messages.
const BODY_LOG_LIMIT: usize = 500;

// =============================================================================
// ApiRequest
// =============================================================================

/// A replayable description of one API call.
///
/// The body is serialized up front so the request can be sent again after a
/// token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    segments: Vec<String>,
    query: Vec<(String, String)>,
    body: Option<Value>,
    authenticated: bool,
    refreshable: bool,
    idempotency_key: Option<String>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            segments: Vec::new(),
            query: Vec::new(),
            body: None,
            authenticated: true,
            refreshable: true,
            idempotency_key: None,
        }
    }

    /// `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST` request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// `PUT` request.
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// `PATCH` request.
    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// `DELETE` request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append one path segment taken from user input.
    ///
    /// The value is percent-encoded, so `/`, `?` and `#` stay inside the
    /// segment instead of changing the path or starting a query.
    #[must_use]
    pub fn segment(mut self, value: impl Into<String>) -> Self {
        self.segments.push(value.into());
        self
    }

    /// Attach query parameters. `None` fields are omitted.
    ///
    /// # Errors
    ///
    /// Returns an error if `query` does not serialize to a flat JSON object.
    pub fn query<Q: Serialize + ?Sized>(mut self, query: &Q) -> Result<Self, ApiError> {
        self.query = encode_query(serde_json::to_value(query)?);
        Ok(self)
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` fails to serialize.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Never attach credentials (login, registration, catalog).
    #[must_use]
    pub const fn public(mut self) -> Self {
        self.authenticated = false;
        self
    }

    /// Send the current access token as-is; a `401` is returned instead of
    /// triggering a refresh.
    #[must_use]
    pub const fn without_refresh(mut self) -> Self {
        self.refreshable = false;
        self
    }

    /// Send an `Idempotency-Key` header. Replays after a refresh reuse the key.
    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the API base URL.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Flatten a JSON object into query pairs, skipping nulls.
fn encode_query(value: Value) -> Vec<(String, String)> {
    let Value::Object(map) = value else {
        return Vec::new();
    };

    map.into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect()
}

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the commerce REST API.
///
/// Cheap to clone; all clones share the HTTP connection pool, the token store
/// and the refresh lock.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<SecretString>,
    tokens: TokenStore,
    refresh_lock: Mutex<()>,
}

/// Error body shape used by the backend.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    errors: BTreeMap<String, FieldMessages>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FieldMessages {
    One(String),
    Many(Vec<String>),
}

impl From<FieldMessages> for Vec<String> {
    fn from(messages: FieldMessages) -> Self {
        match messages {
            FieldMessages::One(message) => vec![message],
            FieldMessages::Many(messages) => messages,
        }
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// Tokens persisted in `store` by a previous session are picked up.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or local storage
    /// cannot be read.
    pub fn new(config: &StorefrontConfig, store: Arc<dyn LocalStore>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("marigold-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url: config.api_url.clone(),
                api_key: config.api_key.clone(),
                tokens: TokenStore::load(store)?,
                refresh_lock: Mutex::new(()),
            }),
        })
    }

    /// Token store shared by every clone of this client.
    #[must_use]
    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    /// Whether the customer is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.tokens.is_authenticated()
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// `GET` a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is not `T`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await
    }

    /// `GET` a resource with query parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is not `T`.
    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.send(ApiRequest::get(path).query(query)?).await
    }

    /// `POST` a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is not `T`.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::post(path).json(body)?).await
    }

    /// `PUT` a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is not `T`.
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::put(path).json(body)?).await
    }

    /// `PATCH` a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is not `T`.
    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::patch(path).json(body)?).await
    }

    /// `DELETE` a resource and decode the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is not `T`.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::delete(path)).await
    }

    /// `DELETE` a resource, ignoring any response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete_empty(&self, path: &str) -> Result<(), ApiError> {
        self.send_empty(ApiRequest::delete(path)).await
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Send a request and decode the JSON response.
    ///
    /// Responses may be bare or wrapped as `{"data": ...}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is not a success, or
    /// the body does not decode as `T`.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let response = self.dispatch(&request).await?;
        let text = response.text().await?;
        decode_body(&text)
    }

    /// Send a request whose response body is irrelevant.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is not a success.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn send_empty(&self, request: ApiRequest) -> Result<(), ApiError> {
        self.dispatch(&request).await.map(drop)
    }

    /// Send with credentials, refreshing and replaying once on `401`.
    async fn dispatch(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        if !request.authenticated {
            let response = self.send_once(request, None).await?;
            return check_status(response).await;
        }

        if !request.refreshable {
            let tokens = self.inner.tokens.current();
            let response = self.send_once(request, tokens.as_ref()).await?;
            return check_status(response).await;
        }

        let tokens = self.usable_tokens().await?;
        let response = self.send_once(request, tokens.as_ref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        let Some(stale) = tokens else {
            return Err(ApiError::Unauthorized);
        };

        debug!("Access token rejected, attempting refresh");
        let renewed = self.refresh_after_rejection(&stale).await?;

        let retry = self.send_once(request, Some(&renewed)).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            warn!("Refreshed access token rejected, ending session");
            self.inner.tokens.clear_if_current(&renewed)?;
            return Err(ApiError::SessionExpired);
        }

        check_status(retry).await
    }

    /// Current tokens, refreshed first when they are known to be expired.
    async fn usable_tokens(&self) -> Result<Option<AuthTokens>, ApiError> {
        match self.inner.tokens.current() {
            Some(tokens) if tokens.is_expired() && tokens.can_refresh() => {
                debug!("Access token expired, refreshing before request");
                self.refresh_after_rejection(&tokens).await.map(Some)
            }
            other => Ok(other),
        }
    }

    /// Single-flight refresh of `stale`.
    async fn refresh_after_rejection(&self, stale: &AuthTokens) -> Result<AuthTokens, ApiError> {
        let _guard = self.inner.refresh_lock.lock().await;

        // Another request may have refreshed (or ended the session) while we waited.
        match self.inner.tokens.current() {
            None => return Err(ApiError::SessionExpired),
            Some(current) if !current.same_access_token(stale) => return Ok(current),
            Some(_) => {}
        }

        let Some(refresh_token) = stale.refresh_token.as_ref() else {
            self.inner.tokens.clear_if_current(stale)?;
            return Err(ApiError::Unauthorized);
        };

        let request = ApiRequest::post("auth/refresh")
            .public()
            .json(&RefreshRequest {
                refresh_token: refresh_token.expose_secret(),
            })?;

        let outcome = async {
            let response = self.send_once(&request, None).await?;
            let response = check_status(response).await?;
            let text = response.text().await?;
            decode_body::<TokenResponse>(&text)
        }
        .await;

        match outcome {
            Ok(response) => {
                let renewed = AuthTokens::from_response(response).or_keep_refresh_token(stale);
                // The session may have ended (or been replaced) while the
                // refresh was in flight; only install over the stale tokens.
                match self.inner.tokens.renew(stale, renewed)? {
                    Some(current) => {
                        debug!("Access token refreshed");
                        Ok(current)
                    }
                    None => {
                        debug!("Signed out during refresh, discarding new token");
                        Err(ApiError::SessionExpired)
                    }
                }
            }
            Err(e) if e.is_credential_rejection() => {
                warn!(error = %e, "Refresh token rejected, ending session");
                self.inner.tokens.clear_if_current(stale)?;
                Err(ApiError::SessionExpired)
            }
            Err(e) => Err(e),
        }
    }

    /// Build and send one HTTP request.
    async fn send_once(
        &self,
        request: &ApiRequest,
        tokens: Option<&AuthTokens>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut url = self
            .inner
            .base_url
            .join(request.path.trim_start_matches('/'))?;
        if !request.segments.is_empty() {
            url.path_segments_mut()
                .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
                .pop_if_empty()
                .extend(&request.segments);
        }

        let mut builder = self
            .inner
            .client
            .request(request.method.clone(), url)
            .header("Accept", "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(api_key) = &self.inner.api_key {
            builder = builder.header("X-Api-Key", api_key.expose_secret());
        }
        if let Some(key) = &request.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }
        if let Some(tokens) = tokens {
            builder = builder.bearer_auth(tokens.access_token.expose_secret());
        }

        Ok(builder.send().await?)
    }
}

/// Map a non-success response to an [`ApiError`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    // Check for rate limiting
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(1);
        return Err(ApiError::RateLimited(retry_after));
    }

    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body
        .message
        .or(body.error)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                truncate(&text, 200)
            }
        });

    Err(match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ApiError::Validation {
            message,
            fields: body
                .errors
                .into_iter()
                .map(|(field, messages)| (field, messages.into()))
                .collect(),
        },
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        StatusCode::FORBIDDEN => ApiError::Forbidden(message),
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        StatusCode::CONFLICT => ApiError::Conflict(message),
        _ => {
            tracing::error!(
                status = %status,
                body = %truncate(&text, BODY_LOG_LIMIT),
                "API returned non-success status"
            );
            ApiError::Server {
                status: status.as_u16(),
                message,
            }
        }
    })
}

/// Decode a success body, unwrapping a `{"data": ...}` envelope if present.
fn decode_body<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    let value: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %truncate(text, BODY_LOG_LIMIT),
                "Failed to parse API response"
            );
            e
        })?
    };

    let payload = match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };

    serde_json::from_value(payload).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %truncate(text, BODY_LOG_LIMIT),
            "API response did not match expected shape"
        );
        ApiError::Parse(e)
    })
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Item {
        id: i64,
        name: String,
    }

    #[derive(Serialize)]
    struct Filters {
        page: u32,
        search: Option<String>,
        in_stock: bool,
    }

    #[test]
    fn test_decode_bare_body() {
        let item: Item = decode_body(r#"{"id":1,"name":"tee"}"#).unwrap();
        assert_eq!(
            item,
            Item {
                id: 1,
                name: "tee".to_string()
            }
        );
    }

    #[test]
    fn test_decode_enveloped_body() {
        let item: Item = decode_body(r#"{"data":{"id":2,"name":"cap"},"meta":{}}"#).unwrap();
        assert_eq!(item.id, 2);
    }

    #[test]
    fn test_decode_empty_body_as_unit() {
        decode_body::<()>("").unwrap();
    }

    #[test]
    fn test_decode_mismatch_is_parse_error() {
        let result = decode_body::<Item>(r#"{"id":"x"}"#);
        assert!(matches!(result, Err(ApiError::Parse(_))));
    }

    #[test]
    fn test_query_skips_none() {
        let request = ApiRequest::get("products")
            .query(&Filters {
                page: 2,
                search: None,
                in_stock: true,
            })
            .unwrap();

        let mut pairs = request.query;
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("in_stock".to_string(), "true".to_string()),
                ("page".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_request_defaults_to_authenticated() {
        let request = ApiRequest::post("cart/items");
        assert!(request.authenticated);
        assert!(!request.public().authenticated);
    }

    #[test]
    fn test_segments_are_kept_apart_from_path() {
        let request = ApiRequest::get("products").segment("a/b?c");
        assert_eq!(request.path(), "products");
        assert_eq!(request.segments, vec!["a/b?c".to_string()]);
        assert!(request.refreshable);
        assert!(!request.without_refresh().refreshable);
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("héllo", 2), "hé");
    }
}
