//! Unified error handling with Sentry integration.
//!
//! Every storefront operation returns [`Result<T>`]. Server-side failures are
//! reported to Sentry through [`AppError::capture`]; what the customer sees
//! comes from [`AppError::user_message`], which never exposes internals.

use marigold_core::{EmailError, MoneyError, QuantityError};
use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::storage::StorageError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Commerce API call failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Local storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Email address rejected client-side.
    #[error("Invalid email: {0}")]
    Email(#[from] EmailError),

    /// Quantity outside the allowed range.
    #[error("Invalid quantity: {0}")]
    Quantity(#[from] QuantityError),

    /// Guest cart arithmetic failed.
    #[error("Price error: {0}")]
    Money(#[from] MoneyError),

    /// The operation needs a signed-in customer.
    #[error("Authentication required")]
    AuthRequired,

    /// Checkout attempted with nothing in the cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// Input rejected client-side before any request was made.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Whether the failure was caused by the backend, the network or the
    /// local machine rather than by the customer.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        match self {
            Self::Api(err) => err.is_server_side() || matches!(err, ApiError::Url(_) | ApiError::Storage(_)),
            Self::Storage(_) | Self::Config(_) | Self::Money(_) => true,
            _ => false,
        }
    }

    /// Whether the customer has to sign in (again) to continue.
    #[must_use]
    pub const fn needs_sign_in(&self) -> bool {
        match self {
            Self::AuthRequired => true,
            Self::Api(err) => err.ends_session(),
            _ => false,
        }
    }

    /// Report internal failures to Sentry and the log. Customer mistakes are
    /// not reported.
    pub fn capture(&self) {
        if self.is_internal() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Storefront error"
            );
        }
    }

    /// Message safe to show to the customer.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(err) => api_user_message(err),
            Self::Storage(_) => "Could not save your data on this device".to_string(),
            Self::Config(err) => format!("The storefront is not configured correctly: {err}"),
            Self::Email(_) => "Invalid email address".to_string(),
            Self::Quantity(err) => match err {
                QuantityError::Zero => "Quantity must be at least 1".to_string(),
                QuantityError::TooLarge { max, .. } => {
                    format!("You can order at most {max} of an item")
                }
            },
            Self::Money(_) => "Could not calculate the cart total".to_string(),
            Self::AuthRequired => "Please sign in to continue".to_string(),
            Self::EmptyCart => "Your cart is empty".to_string(),
            Self::InvalidInput(message) => message.clone(),
            Self::NotFound(what) => format!("Not found: {what}"),
        }
    }
}

fn api_user_message(err: &ApiError) -> String {
    match err {
        ApiError::Unauthorized => "Invalid credentials".to_string(),
        ApiError::SessionExpired => "Your session has expired, please sign in again".to_string(),
        ApiError::Forbidden(_) => "You do not have access to this".to_string(),
        ApiError::NotFound(_) => "Not found".to_string(),
        ApiError::Validation { message, fields } => {
            if fields.is_empty() {
                return message.clone();
            }
            let details: Vec<String> = fields
                .iter()
                .map(|(field, messages)| format!("{field}: {}", messages.join(", ")))
                .collect();
            format!("{message} ({})", details.join("; "))
        }
        ApiError::Conflict(message) => message.clone(),
        ApiError::RateLimited(seconds) => {
            format!("Too many requests, please try again in {seconds} seconds")
        }
        ApiError::Http(_) | ApiError::Url(_) => "Could not reach the store, please try again".to_string(),
        ApiError::Parse(_) | ApiError::Server { .. } => "External service error".to_string(),
        ApiError::Storage(_) => "Could not save your data on this device".to_string(),
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for customer actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("sku_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("order 42".to_string());
        assert_eq!(err.to_string(), "Not found: order 42");

        let err = AppError::InvalidInput("coupon code is empty".to_string());
        assert_eq!(err.to_string(), "Invalid input: coupon code is empty");
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = AppError::Api(ApiError::Server {
            status: 500,
            message: "db pool exhausted at node-3".to_string(),
        });
        assert_eq!(err.user_message(), "External service error");
        assert!(err.is_internal());
    }

    #[test]
    fn test_user_message_includes_field_errors() {
        let mut fields = BTreeMap::new();
        fields.insert("code".to_string(), vec!["has expired".to_string()]);
        let err = AppError::Api(ApiError::Validation {
            message: "Coupon rejected".to_string(),
            fields,
        });
        assert_eq!(err.user_message(), "Coupon rejected (code: has expired)");
        assert!(!err.is_internal());
    }

    #[test]
    fn test_needs_sign_in() {
        assert!(AppError::AuthRequired.needs_sign_in());
        assert!(AppError::Api(ApiError::SessionExpired).needs_sign_in());
        assert!(!AppError::EmptyCart.needs_sign_in());
    }

    #[test]
    fn test_quantity_message() {
        let err = AppError::Quantity(QuantityError::TooLarge { max: 99, got: 120 });
        assert_eq!(err.user_message(), "You can order at most 99 of an item");
    }
}
