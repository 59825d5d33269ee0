//! Local persistent storage.
//!
//! A small string key/value store that survives restarts, playing the part
//! browser local storage plays for a web storefront. The guest cart and the
//! auth tokens live here.
//!
//! Values are JSON documents; use [`load_json`] and [`save_json`] rather than
//! the raw string API.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Well-known storage keys.
pub mod keys {
    /// The guest (unauthenticated) cart.
    pub const GUEST_CART: &str = "marigold.guest_cart";

    /// Access and refresh tokens for the signed-in customer.
    pub const AUTH_TOKENS: &str = "marigold.auth_tokens";

    /// Cached profile of the signed-in customer.
    pub const PROFILE: &str = "marigold.profile";
}

/// Errors that can occur while reading or writing local storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be serialized.
    #[error("storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A lock was poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    Poisoned,
}

/// String key/value storage that persists across sessions.
pub trait LocalStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Load and deserialize a JSON value.
///
/// A value that no longer deserializes (schema change, hand edits) is
/// discarded and reported as absent.
///
/// # Errors
///
/// Returns an error only if the store itself fails.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn LocalStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!(key, error = %e, "Discarding unreadable local storage value");
            store.remove(key)?;
            Ok(None)
        }
    }
}

/// Serialize and store a JSON value.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn save_json<T: Serialize>(
    store: &dyn LocalStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}
