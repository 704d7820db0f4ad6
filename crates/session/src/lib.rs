//! Client-side session layer: who is signed in, and their stored profile.

pub mod domain;
pub mod outbound;
pub mod usecase;

use std::sync::Arc;
use std::time::Duration;

use app_core::config::Config;
use app_core::storage::StorageService;

use crate::outbound::blob::FirebaseStorage;
use crate::outbound::document::{DocumentStore, FirestoreStore, Query};
use crate::outbound::identity::{FirebaseAuthClient, FirebaseOptions, IdentityProvider, ProviderError};
use crate::usecase::collection::CollectionView;
use crate::usecase::store::{DEFAULT_STORE_TIMEOUT, ProfileStore};
use crate::usecase::sync::SessionSynchronizer;
use crate::usecase::view::ProfileView;

pub struct Session {
    pub synchronizer: SessionSynchronizer,
    pub store: ProfileStore,
    pub view: Arc<ProfileView>,
    documents: Option<Arc<dyn DocumentStore>>,
}

impl Session {
    /// A view over `collection` filtered by `query`. Call `load` to run it.
    pub fn collection(&self, collection: &str, query: Query) -> CollectionView {
        CollectionView::new(self.documents.clone(), collection, query)
    }
}

/// Wires the Firebase-backed session from `firebase.*` settings. Must be
/// called inside a Tokio runtime. Incomplete settings yield a session stuck
/// in a configuration error and a store whose writes fail.
pub fn new(config: &Config) -> Session {
    let options = FirebaseOptions::from_config(config);
    let provider = FirebaseAuthClient::new(options.clone()).map(|client| Arc::new(client) as Arc<dyn IdentityProvider>);

    let timeout = config
        .get_opt::<u64>("session.store_timeout_secs")
        .ok()
        .flatten()
        .map_or(DEFAULT_STORE_TIMEOUT, Duration::from_secs);

    with_provider(provider, &options, timeout)
}

fn with_provider(
    provider: Result<Arc<dyn IdentityProvider>, ProviderError>,
    options: &FirebaseOptions,
    timeout: Duration,
) -> Session {
    let (documents, blobs) = match &provider {
        Ok(identity) => {
            let documents: Arc<dyn DocumentStore> = Arc::new(FirestoreStore::new(options, identity.clone()));
            let blobs: Arc<dyn StorageService> = Arc::new(FirebaseStorage::new(options, identity.clone()));
            (Some(documents), Some(blobs))
        },
        Err(_) => (None, None),
    };

    let store = ProfileStore::new(documents.clone(), blobs).with_timeout(timeout);
    let synchronizer = SessionSynchronizer::start(provider, store.clone());
    let view = Arc::new(ProfileView::new(synchronizer.handle(), store.clone()));

    Session { synchronizer, store, view, documents }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::profile::UserProfileUpdate;
    use crate::domain::error::{AuthError, ProfileError, STORE_NOT_INITIALIZED_MSG};
    use crate::outbound::identity::MockIdentityProvider;

    #[tokio::test]
    async fn test_incomplete_settings_give_configuration_error() {
        let config = Config::builder_test().with("firebase.api_key", "your_api_key").build();

        let session = new(&config);

        let state = session.synchronizer.current();
        assert!(!state.loading);
        assert!(state.config_error.is_some());
        assert!(matches!(
            session.store.update("u1", &UserProfileUpdate::default()).await,
            Err(ProfileError::ConfigurationMissing(_))
        ));
        assert!(matches!(session.synchronizer.sign_out().await, Err(AuthError::ConfigurationMissing(_))));
        assert_eq!(session.store.timeout(), DEFAULT_STORE_TIMEOUT);

        let posts = session.collection("posts", Query::new());
        posts.load().await;
        assert_eq!(posts.current().error.as_deref(), Some(STORE_NOT_INITIALIZED_MSG));
    }

    #[tokio::test]
    async fn test_configured_provider_is_subscribed_once() {
        let (_tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let mut provider = MockIdentityProvider::new();
        provider.expect_subscribe().times(1).return_once(move || rx);

        let session = with_provider(Ok(Arc::new(provider)), &FirebaseOptions::default(), Duration::from_secs(2));

        assert!(session.synchronizer.current().loading);
        assert_eq!(session.store.timeout(), Duration::from_secs(2));
        assert_eq!(session.view.merged(), None);
    }
}
