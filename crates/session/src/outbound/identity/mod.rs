//! The client side of the identity provider: sign-in flows and a stream of
//! identity changes.

use app_core::config::Config;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::entity::identity::{Identity, IdentityUpdate};

pub mod firebase;

pub use firebase::FirebaseAuthClient;

/// One identity-change notification: the new identity (`None` when signed
/// out) or a failure of the underlying stream.
pub type IdentityEvent = Result<Option<Identity>, ProviderError>;

pub type IdentityEvents = mpsc::UnboundedReceiver<IdentityEvent>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Missing Firebase configuration: {}", .0.join(", "))]
    Configuration(Vec<String>),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already exists")]
    EmailExists,

    #[error("Password should be at least 6 characters")]
    WeakPassword,

    #[error("Too many attempts. Please try again later")]
    TooManyRequests,

    #[error("This account has been disabled")]
    UserDisabled,

    #[error("No user is signed in")]
    NotSignedIn,

    #[error("Please sign in again to continue")]
    RequiresRecentLogin,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Identity provider rejected the request: {0}")]
    Rejected(String),
}

impl ProviderError {
    pub(crate) fn from_code(message: &str) -> Self {
        let code = message.split([' ', ':']).next().unwrap_or_default();
        match code {
            "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL" => {
                ProviderError::InvalidCredentials
            },
            "EMAIL_EXISTS" => ProviderError::EmailExists,
            "WEAK_PASSWORD" => ProviderError::WeakPassword,
            "TOO_MANY_ATTEMPTS_TRY_LATER" => ProviderError::TooManyRequests,
            "USER_DISABLED" => ProviderError::UserDisabled,
            "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" | "TOKEN_EXPIRED" | "INVALID_ID_TOKEN" | "USER_NOT_FOUND" => {
                ProviderError::RequiresRecentLogin
            },
            _ => ProviderError::Rejected(message.to_string()),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Network(err.to_string())
    }
}

/// A credential obtained from a federated provider's own sign-in flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCredential {
    /// For example `google.com`.
    pub provider_id: String,
    pub id_token: Option<String>,
    pub access_token: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Opens a new notification stream. The current identity is delivered
    /// first, then every later change in order.
    fn subscribe(&self) -> IdentityEvents;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Identity, ProviderError>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, ProviderError>;
    async fn sign_in_with_oauth(&self, credential: OAuthCredential) -> Result<Identity, ProviderError>;
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Emails a password-reset link. Needs no signed-in user.
    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError>;

    // The operations below act on the signed-in user and fail with
    // `NotSignedIn` without one.
    async fn send_email_verification(&self) -> Result<(), ProviderError>;
    async fn update_password(&self, new_password: &str) -> Result<(), ProviderError>;

    /// Applies `update` to the account and notifies subscribers of the result.
    async fn update_profile(&self, update: IdentityUpdate) -> Result<Identity, ProviderError>;

    /// Deletes the account and signs out.
    async fn delete_account(&self) -> Result<(), ProviderError>;

    /// A fresh ID token for the signed-in user, if any.
    async fn id_token(&self) -> Option<String>;
}

/// Public web-app settings of the Firebase project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirebaseOptions {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
}

impl FirebaseOptions {
    pub fn from_config(config: &Config) -> Self {
        let value = |key: &str| config.get_or::<String>(&format!("firebase.{key}"), String::new());
        Self {
            api_key: value("api_key"),
            auth_domain: value("auth_domain"),
            project_id: value("project_id"),
            storage_bucket: value("storage_bucket"),
            messaging_sender_id: value("messaging_sender_id"),
            app_id: value("app_id"),
        }
    }

    /// Fails with the names of every missing or placeholder setting.
    pub fn validate(&self) -> Result<(), ProviderError> {
        let fields = [
            ("api_key", &self.api_key),
            ("auth_domain", &self.auth_domain),
            ("project_id", &self.project_id),
            ("storage_bucket", &self.storage_bucket),
            ("messaging_sender_id", &self.messaging_sender_id),
            ("app_id", &self.app_id),
        ];

        let missing: Vec<String> = fields
            .iter()
            .filter(|(_, value)| value.trim().is_empty() || value.contains("your_"))
            .map(|(name, _)| format!("firebase.{name}"))
            .collect();

        if missing.is_empty() { Ok(()) } else { Err(ProviderError::Configuration(missing)) }
    }
}
