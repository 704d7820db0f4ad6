//! Admin access to the identity provider's account store.
//!
//! [`FirebaseAdmin`] talks to the Identity Toolkit REST API with an OAuth
//! access token minted from a service-account key: an RS256-signed assertion
//! is exchanged at the key's token URI and the resulting token is reused
//! until shortly before it expires.

use std::path::Path;
use std::time::Duration;

use app_core::time::from_millis;
use app_core::token::{RevocationSource, TokenError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::entity::user::{NewUser, UserChanges, UserMetadata, UserPage, UserRecord};

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const SCOPES: &str = "https://www.googleapis.com/auth/identitytoolkit https://www.googleapis.com/auth/cloud-platform";
const ASSERTION_TTL_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("The email address is already in use by another account")]
    EmailExists,

    #[error("There is no user record corresponding to the provided identifier")]
    UserNotFound,

    #[error("Invalid service account: {0}")]
    Credentials(String),

    #[error("Identity provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Identity provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected identity provider response: {0}")]
    Response(String),
}

impl AdminError {
    fn from_provider(status: u16, message: &str) -> Self {
        // Messages look like `EMAIL_EXISTS` or `USER_NOT_FOUND : details`.
        let code = message.split([' ', ':']).next().unwrap_or_default();
        match code {
            "EMAIL_EXISTS" | "DUPLICATE_EMAIL" => AdminError::EmailExists,
            "USER_NOT_FOUND" => AdminError::UserNotFound,
            _ => AdminError::Rejected { status, message: message.to_string() },
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityAdmin: Send + Sync {
    async fn get_user(&self, uid: &str) -> Result<UserRecord, AdminError>;
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, AdminError>;
    async fn update_user(&self, uid: &str, changes: UserChanges) -> Result<UserRecord, AdminError>;
    async fn delete_user(&self, uid: &str) -> Result<(), AdminError>;
    async fn list_users(&self, page_token: Option<String>, max_results: u32) -> Result<UserPage, AdminError>;
}

/// The fields of a service-account key file this adapter needs.
#[derive(Deserialize, Clone)]
pub struct ServiceAccount {
    pub project_id: String,
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccount {
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, AdminError> {
        let raw = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| AdminError::Credentials(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, AdminError> {
        let account: Self = serde_json::from_str(raw).map_err(|e| AdminError::Credentials(e.to_string()))?;
        if account.project_id.is_empty() || account.client_email.is_empty() || account.private_key.is_empty() {
            return Err(AdminError::Credentials("project_id, client_email and private_key are required".to_string()));
        }
        Ok(account)
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    expires_in: u64,
}

struct AccessToken {
    value: String,
    expires_at: tokio::time::Instant,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    local_id: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    display_name: Option<String>,
    photo_url: Option<String>,
    #[serde(default)]
    disabled: bool,
    created_at: Option<String>,
    last_login_at: Option<String>,
    custom_attributes: Option<String>,
    valid_since: Option<String>,
}

impl From<AccountInfo> for UserRecord {
    fn from(info: AccountInfo) -> Self {
        let millis = |raw: Option<String>| raw.and_then(|v| v.parse::<i64>().ok()).and_then(from_millis);

        Self {
            uid: info.local_id,
            email: info.email,
            email_verified: info.email_verified,
            display_name: info.display_name,
            photo_url: info.photo_url,
            disabled: info.disabled,
            metadata: UserMetadata { creation_time: millis(info.created_at), last_sign_in_time: millis(info.last_login_at) },
            custom_claims: info
                .custom_attributes
                .and_then(|raw| serde_json::from_str::<Map<String, Value>>(&raw).ok()),
            tokens_valid_after: info
                .valid_since
                .and_then(|v| v.parse::<i64>().ok())
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        }
    }
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    local_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

pub struct FirebaseAdmin {
    account: ServiceAccount,
    key: EncodingKey,
    project_id: String,
    client: reqwest::Client,
    token: Mutex<Option<AccessToken>>,
}

impl FirebaseAdmin {
    /// `project_id` overrides the project named in the key file. Blank and
    /// `your_` placeholder values are ignored.
    pub fn new(account: ServiceAccount, project_id: Option<String>) -> Result<Self, AdminError> {
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| AdminError::Credentials(format!("private key: {e}")))?;

        let project_id = project_id
            .filter(|p| !p.trim().is_empty() && !p.contains("your_"))
            .unwrap_or_else(|| account.project_id.clone());
        Ok(Self { account, key, project_id, client: reqwest::Client::new(), token: Mutex::new(None) })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn assertion(&self) -> Result<String, AdminError> {
        let iat = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.account.client_email,
            scope: SCOPES,
            aud: &self.account.token_uri,
            iat,
            exp: iat + ASSERTION_TTL_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.account.private_key_id.clone();

        encode(&header, &claims, &self.key).map_err(|e| AdminError::Credentials(e.to_string()))
    }

    async fn access_token(&self) -> Result<String, AdminError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref().filter(|t| t.expires_at > tokio::time::Instant::now()) {
            return Ok(token.value.clone());
        }

        let assertion = self.assertion()?;
        let response = self
            .client
            .post(&self.account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AdminError::Credentials(format!("token exchange failed ({status}): {message}")));
        }

        let body: AccessTokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *guard = Some(AccessToken { value: body.access_token.clone(), expires_at: tokio::time::Instant::now() + lifetime });

        tracing::debug!(expires_in = body.expires_in, "Refreshed identity provider access token");
        Ok(body.access_token)
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{IDENTITY_TOOLKIT_URL}/projects/{}/{method}", self.project_id)
    }

    async fn read<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, AdminError> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| AdminError::Response(e.to_string()));
        }

        let raw = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ProviderErrorBody>(&raw)
            .map(|body| body.error.message)
            .unwrap_or(raw);
        Err(AdminError::from_provider(status.as_u16(), &message))
    }

    async fn post<T: for<'de> Deserialize<'de>>(&self, method: &str, body: Value) -> Result<T, AdminError> {
        let token = self.access_token().await?;
        let response = self.client.post(self.endpoint(method)).bearer_auth(token).json(&body).send().await?;
        Self::read(response).await
    }
}

#[async_trait]
impl IdentityAdmin for FirebaseAdmin {
    async fn get_user(&self, uid: &str) -> Result<UserRecord, AdminError> {
        let response: LookupResponse = self.post("accounts:lookup", json!({ "localId": [uid] })).await?;
        response.users.into_iter().next().map(UserRecord::from).ok_or(AdminError::UserNotFound)
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, AdminError> {
        let mut body = json!({
            "email": user.email,
            "password": user.password,
            "emailVerified": user.email_verified,
        });
        if let Some(display_name) = user.display_name {
            body["displayName"] = Value::String(display_name);
        }
        if let Some(photo_url) = user.photo_url {
            body["photoUrl"] = Value::String(photo_url);
        }

        let created: SignUpResponse = self.post("accounts", body).await?;
        self.get_user(&created.local_id).await
    }

    async fn update_user(&self, uid: &str, changes: UserChanges) -> Result<UserRecord, AdminError> {
        let mut body = json!({ "localId": uid });
        if let Some(display_name) = changes.display_name {
            body["displayName"] = Value::String(display_name);
        }
        if let Some(photo_url) = changes.photo_url {
            body["photoUrl"] = Value::String(photo_url);
        }
        if let Some(email) = changes.email {
            body["email"] = Value::String(email);
        }

        let _: Value = self.post("accounts:update", body).await?;
        self.get_user(uid).await
    }

    async fn delete_user(&self, uid: &str) -> Result<(), AdminError> {
        let _: Value = self.post("accounts:delete", json!({ "localId": uid })).await?;
        Ok(())
    }

    async fn list_users(&self, page_token: Option<String>, max_results: u32) -> Result<UserPage, AdminError> {
        let token = self.access_token().await?;
        let mut query = vec![("maxResults", max_results.to_string())];
        if let Some(page_token) = page_token {
            query.push(("nextPageToken", page_token));
        }

        let response = self
            .client
            .get(self.endpoint("accounts:batchGet"))
            .bearer_auth(token)
            .query(&query)
            .send()
            .await?;
        let page: BatchGetResponse = Self::read(response).await?;

        Ok(UserPage {
            users: page.users.into_iter().map(UserRecord::from).collect(),
            next_page_token: page.next_page_token.filter(|t| !t.is_empty()),
        })
    }
}

#[async_trait]
impl RevocationSource for FirebaseAdmin {
    async fn tokens_valid_after(&self, uid: &str) -> Result<Option<i64>, TokenError> {
        match self.get_user(uid).await {
            Ok(user) if user.disabled => Err(TokenError::Invalid("user account is disabled".to_string())),
            Ok(user) => Ok(user.tokens_valid_after.map(|t| t.timestamp())),
            Err(AdminError::UserNotFound) => Err(TokenError::Invalid("user no longer exists".to_string())),
            Err(err) => Err(TokenError::KeysUnavailable(err.to_string())),
        }
    }
}
