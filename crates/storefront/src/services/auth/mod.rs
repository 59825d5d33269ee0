//! Authentication service.
//!
//! Sign in, registration and account management. Tokens returned by the
//! backend go straight into the shared [`TokenStore`](crate::api::TokenStore);
//! the customer profile is cached in local storage so it can be shown without
//! a round trip.

use std::sync::Arc;

use marigold_core::Email;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::api::{ApiClient, ApiRequest, AuthTokens, TokenResponse};
use crate::error::{AppError, Result};
use crate::models::{ProfileUpdate, RegisterInput, User};
use crate::storage::{self, LocalStore, keys};

use super::require_auth;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Body returned by `auth/login` and `auth/register`.
#[derive(Debug, Deserialize)]
struct AuthResponse {
    user: User,
    #[serde(flatten)]
    tokens: TokenResponse,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct LogoutRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

#[derive(Serialize)]
struct ChangePasswordRequest<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

#[derive(Serialize)]
struct ForgotPasswordRequest<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct ResetPasswordRequest<'a> {
    token: &'a str,
    password: &'a str,
}

/// Authentication service.
#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
    store: Arc<dyn LocalStore>,
}

impl AuthService {
    /// Create a new authentication service.
    #[must_use]
    pub fn new(api: ApiClient, store: Arc<dyn LocalStore>) -> Self {
        Self { api, store }
    }

    /// Whether the customer is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.api.is_authenticated()
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Email` if the email is malformed, or an API error if
    /// the backend rejects the credentials.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let email = Email::parse(email)?;
        if password.is_empty() {
            return Err(AppError::InvalidInput("Password is required".to_string()));
        }

        let request = ApiRequest::post("auth/login").public().json(&LoginRequest {
            email: email.as_str(),
            password,
        })?;
        let response: AuthResponse = self.api.send(request).await?;

        self.start_session(response)
    }

    /// Create an account and sign in.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Email` or `AppError::InvalidInput` if the input fails
    /// client-side checks, or an API error (e.g. `Conflict` for an existing
    /// account).
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterInput) -> Result<User> {
        let email = Email::parse(&input.email)?;
        validate_password(&input.password)?;

        let input = RegisterInput {
            email: email.into_inner(),
            ..input
        };
        let request = ApiRequest::post("auth/register").public().json(&input)?;
        let response: AuthResponse = self.api.send(request).await?;

        self.start_session(response)
    }

    fn start_session(&self, response: AuthResponse) -> Result<User> {
        self.api
            .tokens()
            .set(AuthTokens::from_response(response.tokens))?;
        storage::save_json(self.store.as_ref(), keys::PROFILE, &response.user)?;
        info!(user_id = %response.user.id, "Signed in");
        Ok(response.user)
    }

    /// Sign out.
    ///
    /// The server call is best effort; local tokens and the cached profile
    /// are always removed.
    ///
    /// # Errors
    ///
    /// Returns an error only if local storage cannot be updated.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        if let Some(tokens) = self.api.tokens().current() {
            let refresh_token = tokens.refresh_token.as_ref().map(|t| t.expose_secret());
            let outcome = async {
                let request = ApiRequest::post("auth/logout")
                    .json(&LogoutRequest { refresh_token })?
                    .without_refresh();
                self.api.send_empty(request).await
            }
            .await;
            if let Err(e) = outcome {
                warn!(error = %e, "Server logout failed, clearing local session anyway");
            }
        }

        self.api.tokens().clear()?;
        self.store.remove(keys::PROFILE)?;
        info!("Signed out");
        Ok(())
    }

    /// Profile cached at the last sign in or profile fetch.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be read.
    pub fn cached_user(&self) -> Result<Option<User>> {
        if !self.is_authenticated() {
            return Ok(None);
        }
        Ok(storage::load_json(self.store.as_ref(), keys::PROFILE)?)
    }

    /// Fetch the signed-in customer's profile.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self))]
    pub async fn current_user(&self) -> Result<User> {
        require_auth(&self.api)?;
        let user: User = self.api.get("auth/me").await?;
        if self.is_authenticated() {
            storage::save_json(self.store.as_ref(), keys::PROFILE, &user)?;
        }
        Ok(user)
    }

    /// Update profile fields.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if nothing would change,
    /// `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        require_auth(&self.api)?;
        if update.is_empty() {
            return Err(AppError::InvalidInput("Nothing to update".to_string()));
        }

        let user: User = self.api.put("auth/me", update).await?;
        storage::save_json(self.store.as_ref(), keys::PROFILE, &user)?;
        Ok(user)
    }

    /// Change the password of the signed-in customer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if the new password is too weak,
    /// `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip_all)]
    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<()> {
        require_auth(&self.api)?;
        validate_password(new_password)?;
        if current_password == new_password {
            return Err(AppError::InvalidInput(
                "New password must differ from the current one".to_string(),
            ));
        }

        let request = ApiRequest::post("auth/change-password").json(&ChangePasswordRequest {
            current_password,
            new_password,
        })?;
        self.api.send_empty(request).await?;
        Ok(())
    }

    /// Request a password reset email.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Email` if the email is malformed, or an API error.
    #[instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        let email = Email::parse(email)?;
        let request = ApiRequest::post("auth/forgot-password")
            .public()
            .json(&ForgotPasswordRequest {
                email: email.as_str(),
            })?;
        self.api.send_empty(request).await?;
        Ok(())
    }

    /// Set a new password using the token from a reset email.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if the token is blank or the password is
    /// too weak, or an API error.
    #[instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::InvalidInput("Reset token is required".to_string()));
        }
        validate_password(new_password)?;

        let request = ApiRequest::post("auth/reset-password")
            .public()
            .json(&ResetPasswordRequest {
                token,
                password: new_password,
            })?;
        self.api.send_empty(request).await?;
        Ok(())
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::InvalidInput(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_password() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("exactly8").is_ok());
        assert!(validate_password("a much longer password").is_ok());
    }

    #[test]
    fn test_auth_response_flattens_tokens() {
        let json = r#"{
            "user": {"id": 3, "email": "ada@example.com"},
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "expires_in": 900
        }"#;
        let response: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.user.email, "ada@example.com");
        assert_eq!(response.tokens.access_token, "at-1");
        assert_eq!(response.tokens.expires_in, Some(900));
    }
}
