//! Saved shipping addresses.

use marigold_core::AddressId;
use tracing::instrument;

use crate::api::{ApiClient, ApiRequest};
use crate::error::{AppError, Result};
use crate::models::{Address, AddressInput};

use super::require_auth;

/// Address book service.
#[derive(Clone)]
pub struct AddressService {
    api: ApiClient,
}

impl AddressService {
    /// Create a new address service.
    #[must_use]
    pub const fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// All saved addresses.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Address>> {
        require_auth(&self.api)?;
        Ok(self.api.get("addresses").await?)
    }

    /// The default address, falling back to the first saved one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error.
    pub async fn default_address(&self) -> Result<Option<Address>> {
        let addresses = self.list().await?;
        let default = addresses.iter().position(|a| a.is_default).unwrap_or(0);
        Ok(addresses.into_iter().nth(default))
    }

    /// Save a new address.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if required fields are blank,
    /// `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self, input))]
    pub async fn create(&self, input: &AddressInput) -> Result<Address> {
        input.validate().map_err(AppError::InvalidInput)?;
        require_auth(&self.api)?;
        Ok(self.api.post("addresses", input).await?)
    }

    /// Replace an address.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if required fields are blank,
    /// `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self, input), fields(address_id = %address_id))]
    pub async fn update(&self, address_id: AddressId, input: &AddressInput) -> Result<Address> {
        input.validate().map_err(AppError::InvalidInput)?;
        require_auth(&self.api)?;
        Ok(self
            .api
            .put(&format!("addresses/{address_id}"), input)
            .await?)
    }

    /// Delete an address.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self), fields(address_id = %address_id))]
    pub async fn delete(&self, address_id: AddressId) -> Result<()> {
        require_auth(&self.api)?;
        self.api
            .delete_empty(&format!("addresses/{address_id}"))
            .await?;
        Ok(())
    }

    /// Make an address the default.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthRequired` when signed out, or an API error.
    #[instrument(skip(self), fields(address_id = %address_id))]
    pub async fn set_default(&self, address_id: AddressId) -> Result<Address> {
        require_auth(&self.api)?;
        Ok(self
            .api
            .send(ApiRequest::post(format!("addresses/{address_id}/default")))
            .await?)
    }
}
