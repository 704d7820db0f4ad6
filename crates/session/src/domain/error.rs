use app_core::storage::StorageError;
use thiserror::Error;

use crate::outbound::document::{StoreError, StoreErrorKind};
use crate::outbound::identity::ProviderError;

pub const STORE_NOT_INITIALIZED_MSG: &str = "Document store is not initialized";
pub const BLOBS_NOT_INITIALIZED_MSG: &str = "Blob storage is not initialized";
pub const PROVIDER_NOT_CONFIGURED_MSG: &str = "Firebase is not configured. Please check your environment variables.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// A backing service was never constructed; needs operator action.
    #[error("{0}")]
    ConfigurationMissing(String),

    #[error("User not authenticated")]
    NotAuthenticated,

    /// Transient; readers degrade to identity-only data.
    #[error("Profile store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("{0}")]
    StoreOperationFailed(String),

    #[error("{0}")]
    ValidationFailed(String),
}

impl ProfileError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProfileError::StoreUnavailable(_))
    }
}

impl From<StoreError> for ProfileError {
    fn from(err: StoreError) -> Self {
        match err.kind {
            StoreErrorKind::Unavailable => ProfileError::StoreUnavailable(err.message),
            _ => ProfileError::StoreOperationFailed(err.to_string()),
        }
    }
}

impl From<StorageError> for ProfileError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::Request(e) if e.is_connect() || e.is_timeout() => ProfileError::StoreUnavailable(err.to_string()),
            _ => ProfileError::StoreOperationFailed(err.to_string()),
        }
    }
}

/// Failures of the sign-in and account operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0}")]
    ConfigurationMissing(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The stored profile could not be removed during account deletion.
    #[error(transparent)]
    Profile(#[from] ProfileError),
}
