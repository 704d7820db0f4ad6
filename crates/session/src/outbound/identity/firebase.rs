//! Firebase Authentication through the public Identity Toolkit REST API.
//!
//! Signing in stores the returned token pair; [`IdentityProvider::id_token`]
//! refreshes it through the Secure Token endpoint shortly before expiry.
//! Every sign-in, sign-out and account change is pushed to all live
//! subscribers.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{FirebaseOptions, IdentityEvent, IdentityEvents, IdentityProvider, OAuthCredential, ProviderError};
use crate::domain::entity::identity::{Identity, IdentityUpdate};

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

struct SignedIn {
    identity: Identity,
    id_token: String,
    refresh_token: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    local_id: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    display_name: Option<String>,
    photo_url: Option<String>,
}

impl From<AccountInfo> for Identity {
    fn from(info: AccountInfo) -> Self {
        Self {
            uid: info.local_id,
            email: info.email,
            display_name: info.display_name.filter(|v| !v.is_empty()),
            photo_url: info.photo_url.filter(|v| !v.is_empty()),
            email_verified: info.email_verified,
        }
    }
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct FirebaseAuthClient {
    options: FirebaseOptions,
    client: reqwest::Client,
    session: Mutex<Option<SignedIn>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<IdentityEvent>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn expiry(expires_in: &str) -> Instant {
    let secs = expires_in.parse::<u64>().unwrap_or_default();
    Instant::now() + Duration::from_secs(secs).saturating_sub(TOKEN_REFRESH_MARGIN)
}

impl FirebaseAuthClient {
    pub fn new(options: FirebaseOptions) -> Result<Self, ProviderError> {
        options.validate()?;
        Ok(Self {
            options,
            client: reqwest::Client::new(),
            session: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    fn current(&self) -> Option<Identity> {
        lock(&self.session).as_ref().map(|s| s.identity.clone())
    }

    fn publish(&self, identity: Option<Identity>) {
        lock(&self.subscribers).retain(|tx| tx.send(Ok(identity.clone())).is_ok());
    }

    async fn read<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| ProviderError::Rejected(e.to_string()));
        }

        let raw = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&raw).map(|b| b.error.message).unwrap_or(raw);
        Err(ProviderError::from_code(&message))
    }

    async fn call<T: for<'de> Deserialize<'de>>(&self, method: &str, body: Value) -> Result<T, ProviderError> {
        let response = self
            .client
            .post(format!("{IDENTITY_TOOLKIT_URL}/{method}"))
            .query(&[("key", self.options.api_key.as_str())])
            .json(&body)
            .send()
            .await?;
        Self::read(response).await
    }

    /// Resolves the full account for a fresh token pair and makes it current.
    async fn establish(&self, tokens: TokenResponse) -> Result<Identity, ProviderError> {
        let lookup: LookupResponse = self.call("accounts:lookup", json!({ "idToken": tokens.id_token })).await?;
        let identity = lookup
            .users
            .into_iter()
            .next()
            .map(Identity::from)
            .ok_or_else(|| ProviderError::Rejected("USER_NOT_FOUND".to_string()))?;

        self.install(SignedIn {
            identity: identity.clone(),
            id_token: tokens.id_token,
            refresh_token: tokens.refresh_token,
            expires_at: expiry(&tokens.expires_in),
        });
        Ok(identity)
    }

    fn install(&self, signed_in: SignedIn) {
        let identity = signed_in.identity.clone();
        *lock(&self.session) = Some(signed_in);
        tracing::info!(uid = %identity.uid, "Signed in");
        self.publish(Some(identity));
    }

    async fn refresh(&self, refresh_token: String) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(SECURE_TOKEN_URL)
            .query(&[("key", self.options.api_key.as_str())])
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token.as_str())])
            .send()
            .await?;
        let body: RefreshResponse = Self::read(response).await?;
        self.store_refreshed(&refresh_token, body)
    }

    /// Keeps refreshed tokens only if the session that asked for them is
    /// still current. Otherwise answers with the current session's token.
    fn store_refreshed(&self, sent: &str, body: RefreshResponse) -> Result<String, ProviderError> {
        let mut session = lock(&self.session);
        match session.as_mut() {
            Some(current) if current.refresh_token == sent => {
                current.id_token = body.id_token.clone();
                current.refresh_token = body.refresh_token;
                current.expires_at = expiry(&body.expires_in);
                Ok(body.id_token)
            },
            Some(current) => {
                tracing::debug!(uid = %current.identity.uid, "Discarded tokens refreshed for a replaced session");
                Ok(current.id_token.clone())
            },
            None => Err(ProviderError::NotSignedIn),
        }
    }

    /// The signed-in user's id and a fresh ID token.
    async fn signed_in(&self) -> Result<(String, String), ProviderError> {
        let id_token = self.id_token().await.ok_or(ProviderError::NotSignedIn)?;
        let uid = self.current().map(|identity| identity.uid).ok_or(ProviderError::NotSignedIn)?;
        Ok((uid, id_token))
    }

    fn store_tokens(&self, uid: &str, tokens: TokenResponse) {
        if let Some(current) = lock(&self.session).as_mut().filter(|s| s.identity.uid == uid) {
            current.id_token = tokens.id_token;
            current.refresh_token = tokens.refresh_token;
            current.expires_at = expiry(&tokens.expires_in);
        }
    }

    /// Replaces the cached identity of `uid` and tells subscribers.
    fn apply_identity(&self, identity: &Identity) {
        let updated = match lock(&self.session).as_mut().filter(|s| s.identity.uid == identity.uid) {
            Some(current) => {
                current.identity = identity.clone();
                true
            },
            None => false,
        };
        if updated {
            self.publish(Some(identity.clone()));
        }
    }

    /// Drops the session of `uid` if it is still current.
    fn remove_session(&self, uid: &str) -> bool {
        let removed = {
            let mut session = lock(&self.session);
            if session.as_ref().is_some_and(|s| s.identity.uid == uid) { session.take() } else { None }
        };
        if removed.is_some() {
            self.publish(None);
        }
        removed.is_some()
    }
}

fn profile_update_body(id_token: String, update: IdentityUpdate) -> Value {
    let mut body = json!({ "idToken": id_token, "returnSecureToken": false });
    let mut removed = Vec::new();

    for (value, field, attribute) in [
        (update.display_name, "displayName", "DISPLAY_NAME"),
        (update.photo_url, "photoUrl", "PHOTO_URL"),
    ] {
        match value {
            Some(value) if value.is_empty() => removed.push(attribute),
            Some(value) => body[field] = Value::String(value),
            None => {},
        }
    }

    if !removed.is_empty() {
        body["deleteAttribute"] = json!(removed);
    }
    body
}

#[async_trait]
impl IdentityProvider for FirebaseAuthClient {
    fn subscribe(&self) -> IdentityEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        // Held across the initial send so no change slips in between.
        let mut subscribers = lock(&self.subscribers);
        if tx.send(Ok(self.current())).is_ok() {
            subscribers.push(tx);
        }
        rx
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Identity, ProviderError> {
        let body = json!({ "email": email, "password": password, "returnSecureToken": true });
        let tokens: TokenResponse = self.call("accounts:signInWithPassword", body).await?;
        self.establish(tokens).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, ProviderError> {
        let body = json!({ "email": email, "password": password, "returnSecureToken": true });
        let tokens: TokenResponse = self.call("accounts:signUp", body).await?;
        self.establish(tokens).await
    }

    async fn sign_in_with_oauth(&self, credential: OAuthCredential) -> Result<Identity, ProviderError> {
        let mut post_body = vec![("providerId", credential.provider_id.clone())];
        if let Some(id_token) = credential.id_token {
            post_body.push(("id_token", id_token));
        }
        if let Some(access_token) = credential.access_token {
            post_body.push(("access_token", access_token));
        }
        let post_body = post_body
            .into_iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(&v)))
            .collect::<Vec<_>>()
            .join("&");

        let body = json!({
            "postBody": post_body,
            "requestUri": format!("https://{}", self.options.auth_domain),
            "returnSecureToken": true,
            "returnIdpCredential": true,
        });
        let tokens: TokenResponse = self.call("accounts:signInWithIdp", body).await?;
        self.establish(tokens).await
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let previous = lock(&self.session).take();
        if let Some(previous) = previous {
            tracing::info!(uid = %previous.identity.uid, "Signed out");
            self.publish(None);
        }
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        let body = json!({ "requestType": "PASSWORD_RESET", "email": email });
        let _: Value = self.call("accounts:sendOobCode", body).await?;
        tracing::info!("Password reset email requested");
        Ok(())
    }

    async fn send_email_verification(&self) -> Result<(), ProviderError> {
        let (uid, id_token) = self.signed_in().await?;
        let _: Value = self.call("accounts:sendOobCode", json!({ "requestType": "VERIFY_EMAIL", "idToken": id_token })).await?;
        tracing::info!(uid = %uid, "Verification email requested");
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> Result<(), ProviderError> {
        let (uid, id_token) = self.signed_in().await?;
        let body = json!({ "idToken": id_token, "password": new_password, "returnSecureToken": true });
        let tokens: TokenResponse = self.call("accounts:update", body).await?;

        // The old refresh token stops working once the password changes.
        self.store_tokens(&uid, tokens);
        tracing::info!(uid = %uid, "Password updated");
        Ok(())
    }

    async fn update_profile(&self, update: IdentityUpdate) -> Result<Identity, ProviderError> {
        let (uid, id_token) = self.signed_in().await?;
        let info: AccountInfo = self.call("accounts:update", profile_update_body(id_token, update)).await?;

        let returned = Identity::from(info);
        let identity = match self.current().filter(|current| current.uid == uid) {
            Some(current) => Identity { display_name: returned.display_name, photo_url: returned.photo_url, ..current },
            None => returned,
        };
        self.apply_identity(&identity);
        tracing::info!(uid = %uid, "Account profile updated");
        Ok(identity)
    }

    async fn delete_account(&self) -> Result<(), ProviderError> {
        let (uid, id_token) = self.signed_in().await?;
        let _: Value = self.call("accounts:delete", json!({ "idToken": id_token })).await?;

        self.remove_session(&uid);
        tracing::info!(uid = %uid, "Account deleted");
        Ok(())
    }

    async fn id_token(&self) -> Option<String> {
        let refresh_token = {
            let session = lock(&self.session);
            let session = session.as_ref()?;
            if session.expires_at > Instant::now() {
                return Some(session.id_token.clone());
            }
            session.refresh_token.clone()
        };

        match self.refresh(refresh_token).await {
            Ok(token) => Some(token),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to refresh ID token");
                None
            },
        }
    }
}
