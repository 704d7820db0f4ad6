//! Keeps the session state in step with the identity provider.
//!
//! [`SessionSynchronizer`] owns the only writer of the session state. It
//! subscribes to identity changes exactly once and applies them in order from
//! a single listener task; each sign-in also fires off profile provisioning,
//! whose outcome never feeds back into the session state.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::store::ProfileStore;
use crate::domain::entity::identity::{Identity, IdentityUpdate};
use crate::domain::entity::profile::UserProfileUpdate;
use crate::domain::entity::session::{SessionHandle, SessionState};
use crate::domain::error::{AuthError, PROVIDER_NOT_CONFIGURED_MSG};
use crate::outbound::identity::{IdentityEvents, IdentityProvider, OAuthCredential, ProviderError};

pub struct SessionSynchronizer {
    provider: Option<Arc<dyn IdentityProvider>>,
    store: ProfileStore,
    state: Arc<watch::Sender<SessionState>>,
    listener: Option<JoinHandle<()>>,
}

impl SessionSynchronizer {
    /// Must be called inside a Tokio runtime. A provider that failed to
    /// construct leaves the session in a terminal configuration error.
    pub fn start(provider: Result<Arc<dyn IdentityProvider>, ProviderError>, store: ProfileStore) -> Self {
        let state = Arc::new(watch::Sender::new(SessionState::initial()));

        match provider {
            Ok(provider) => {
                let events = provider.subscribe();
                let listener = tokio::spawn(listen(events, state.clone(), store.clone()));
                Self { provider: Some(provider), store, state, listener: Some(listener) }
            },
            Err(err) => {
                tracing::error!(error = %err, "Identity provider is not configured");
                state.send_replace(SessionState::configuration_error(format!("{PROVIDER_NOT_CONFIGURED_MSG} ({err})")));
                Self { provider: None, store, state, listener: None }
            },
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.state.subscribe())
    }

    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Stops processing notifications. Provisioning already dispatched keeps
    /// running to completion.
    pub async fn shutdown(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            let _ = listener.await;
            tracing::debug!("Session synchronizer stopped");
        }
    }

    fn provider(&self) -> Result<&Arc<dyn IdentityProvider>, AuthError> {
        self.provider.as_ref().ok_or_else(|| AuthError::ConfigurationMissing(PROVIDER_NOT_CONFIGURED_MSG.to_string()))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        Ok(self.provider()?.sign_in_with_password(email, password).await?)
    }

    /// Creates the account and asks the provider to send a verification
    /// email. A failed send is logged; the account stays signed in.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let provider = self.provider()?;
        let identity = provider.sign_up(email, password).await?;

        if let Err(err) = provider.send_email_verification().await {
            tracing::warn!(uid = %identity.uid, error = %err, "Failed to send verification email");
        }
        Ok(identity)
    }

    pub async fn sign_in_with_oauth(&self, credential: OAuthCredential) -> Result<Identity, AuthError> {
        Ok(self.provider()?.sign_in_with_oauth(credential).await?)
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(self.provider()?.sign_out().await?)
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        Ok(self.provider()?.send_password_reset(email).await?)
    }

    pub async fn send_email_verification(&self) -> Result<(), AuthError> {
        Ok(self.provider()?.send_email_verification().await?)
    }

    pub async fn update_password(&self, new_password: &str) -> Result<(), AuthError> {
        Ok(self.provider()?.update_password(new_password).await?)
    }

    /// Changes the provider-side display name or avatar. The new identity
    /// reaches the session state through the subscription.
    pub async fn update_identity(&self, update: IdentityUpdate) -> Result<Identity, AuthError> {
        Ok(self.provider()?.update_profile(update).await?)
    }

    /// Deletes the stored profile, then the account. A failed profile delete
    /// leaves the account in place.
    pub async fn delete_account(&self) -> Result<(), AuthError> {
        let provider = self.provider()?;
        let identity = self.state.borrow().identity.clone().ok_or(ProviderError::NotSignedIn)?;

        self.store.delete_profile(&identity.uid).await?;
        provider.delete_account().await?;
        Ok(())
    }
}

impl Drop for SessionSynchronizer {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

async fn listen(mut events: IdentityEvents, state: Arc<watch::Sender<SessionState>>, store: ProfileStore) {
    while let Some(event) = events.recv().await {
        let identity = match event {
            Ok(identity) => identity,
            Err(err) => {
                tracing::error!(error = %err, "Identity stream failed, treating session as signed out");
                None
            },
        };

        if let Some(identity) = &identity {
            tracing::info!(uid = %identity.uid, "Session authenticated");
            provision(store.clone(), identity);
        }

        state.send_modify(|state| {
            state.identity = identity;
            state.loading = false;
        });
    }

    tracing::debug!("Identity stream closed");
}

fn provision(store: ProfileStore, identity: &Identity) {
    let uid = identity.uid.clone();
    let email = identity.email.clone().unwrap_or_default();
    let defaults = UserProfileUpdate {
        display_name: identity.display_name.clone(),
        photo_url: identity.photo_url.clone(),
        ..Default::default()
    };

    tokio::spawn(async move {
        store.provision(&uid, &email, defaults).await;
    });
}
