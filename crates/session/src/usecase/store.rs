//! Reads and writes of the user-profile document and its avatar.
//!
//! Reads and provisioning are bounded in time and degrade quietly: a slow or
//! unreachable store reads as "no profile", and provisioning failures are
//! only logged. Explicit edits and deletes surface every failure.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use app_core::storage::StorageService;
use app_core::time::{Bounded, bounded};

use crate::domain::entity::profile::{FIELD_DISPLAY_NAME, FIELD_UPDATED_AT, USERS_COLLECTION, UserProfile, UserProfileUpdate};
use crate::domain::error::{BLOBS_NOT_INITIALIZED_MSG, ProfileError, STORE_NOT_INITIALIZED_MSG};
use crate::outbound::document::{DocumentStore, FieldValue, Query, StoreError};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ProfileStore {
    documents: Option<Arc<dyn DocumentStore>>,
    blobs: Option<Arc<dyn StorageService>>,
    timeout: Duration,
}

impl ProfileStore {
    /// Either backend may be absent when it could not be configured.
    pub fn new(documents: Option<Arc<dyn DocumentStore>>, blobs: Option<Arc<dyn StorageService>>) -> Self {
        Self { documents, blobs, timeout: DEFAULT_STORE_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn documents(&self) -> Result<&Arc<dyn DocumentStore>, ProfileError> {
        self.documents.as_ref().ok_or_else(|| ProfileError::ConfigurationMissing(STORE_NOT_INITIALIZED_MSG.to_string()))
    }

    fn blobs(&self) -> Result<&Arc<dyn StorageService>, ProfileError> {
        self.blobs.as_ref().ok_or_else(|| ProfileError::ConfigurationMissing(BLOBS_NOT_INITIALIZED_MSG.to_string()))
    }

    async fn within<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, ProfileError> {
        match bounded(self.timeout, fut).await {
            Bounded::Completed(result) => result.map_err(ProfileError::from),
            Bounded::TimedOut => Err(ProfileError::StoreUnavailable(format!(
                "{operation} timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    /// The stored profile, with the failure kept. Timeouts and a missing
    /// store count as unavailable.
    pub async fn fetch(&self, uid: &str) -> Result<Option<UserProfile>, ProfileError> {
        let documents = self
            .documents
            .as_ref()
            .ok_or_else(|| ProfileError::StoreUnavailable(STORE_NOT_INITIALIZED_MSG.to_string()))?;

        let fields = self.within("profile read", documents.get_document(USERS_COLLECTION, uid)).await?;
        Ok(fields.map(|fields| UserProfile::from_fields(uid, &fields)))
    }

    /// The stored profile, or `None` on any failure.
    pub async fn get(&self, uid: &str) -> Option<UserProfile> {
        match self.fetch(uid).await {
            Ok(profile) => profile,
            Err(err) if err.is_transient() => {
                tracing::warn!(uid, error = %err, "Profile store unavailable, continuing without profile");
                None
            },
            Err(err) => {
                tracing::error!(uid, error = %err, "Failed to read user profile");
                None
            },
        }
    }

    /// Creates the profile on first sign-in, or merges the supplied non-empty
    /// fields into an existing one. Never fails; problems are logged.
    pub async fn provision(&self, uid: &str, email: &str, defaults: UserProfileUpdate) {
        match self.try_provision(uid, email, defaults).await {
            Ok(created) => tracing::debug!(uid, created, "User profile provisioned"),
            Err(err) if err.is_transient() => {
                tracing::warn!(uid, error = %err, "Skipped profile provisioning, store unavailable");
            },
            Err(err) => tracing::error!(uid, error = %err, "Failed to provision user profile"),
        }
    }

    async fn try_provision(&self, uid: &str, email: &str, defaults: UserProfileUpdate) -> Result<bool, ProfileError> {
        let documents = self.documents()?;

        let existing = self.within("profile existence check", documents.get_document(USERS_COLLECTION, uid)).await?;
        if existing.is_none() {
            let seed = UserProfile::seed_fields(uid, email, &defaults);
            self.within("profile create", documents.set_document(USERS_COLLECTION, uid, seed)).await?;
            return Ok(true);
        }

        let mut fields = defaults.without_blanks().to_fields();
        fields.insert(FIELD_UPDATED_AT.to_string(), FieldValue::ServerTimestamp);
        self.within("profile merge", documents.update_document(USERS_COLLECTION, uid, fields)).await?;
        Ok(false)
    }

    /// Writes the supplied fields and refreshes `updatedAt`.
    pub async fn update(&self, uid: &str, updates: &UserProfileUpdate) -> Result<(), ProfileError> {
        let documents = self.documents()?;

        let mut fields = updates.to_fields();
        fields.insert(FIELD_UPDATED_AT.to_string(), FieldValue::ServerTimestamp);

        documents.update_document(USERS_COLLECTION, uid, fields).await.map_err(|err| {
            tracing::error!(uid, error = %err, "Failed to update user profile");
            ProfileError::from(err)
        })
    }

    pub async fn delete_profile(&self, uid: &str) -> Result<(), ProfileError> {
        self.documents()?.delete_document(USERS_COLLECTION, uid).await?;
        tracing::info!(uid, "User profile deleted");
        Ok(())
    }

    /// Stores an avatar under `users/{uid}/profile/` and returns its URL.
    pub async fn upload_avatar(
        &self,
        uid: &str,
        bytes: Vec<u8>,
        file_name: &str,
        content_type: &str,
    ) -> Result<String, ProfileError> {
        let blobs = self.blobs()?;
        let path = avatar_path(uid, file_name)?;

        blobs.upload_file(&path, bytes, content_type).await.map_err(|err| {
            tracing::error!(uid, path = %path, error = %err, "Failed to upload avatar");
            ProfileError::from(err)
        })
    }

    pub async fn delete_avatar(&self, path: &str) -> Result<(), ProfileError> {
        self.blobs()?.delete_file(path).await?;
        Ok(())
    }

    /// Profiles whose display name starts with `prefix`.
    pub async fn search(&self, prefix: &str) -> Result<Vec<UserProfile>, ProfileError> {
        let query = Query::prefix(FIELD_DISPLAY_NAME, prefix);
        let found = self.documents()?.query(USERS_COLLECTION, &query).await?;
        Ok(found.iter().map(|(id, fields)| UserProfile::from_fields(id, fields)).collect())
    }
}

fn avatar_path(uid: &str, file_name: &str) -> Result<String, ProfileError> {
    let name = file_name.rsplit(['/', '\\']).next().unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." {
        return Err(ProfileError::ValidationFailed(format!("Invalid file name: {file_name}")));
    }
    Ok(format!("users/{uid}/profile/{name}"))
}

#[cfg(test)]
pub(crate) mod tests {
    use app_core::storage::{MockStorageService, StorageError};
    use async_trait::async_trait;

    use super::*;
    use crate::domain::entity::profile::{FIELD_BIO, FIELD_CREATED_AT, FIELD_PHOTO_URL};
    use crate::outbound::document::{Fields, MemoryStore, MockDocumentStore, StoreErrorKind};

    /// Delays every call before delegating to an in-memory store.
    pub(crate) struct SlowStore {
        pub(crate) delay: Duration,
        pub(crate) inner: MemoryStore,
    }

    #[async_trait]
    impl DocumentStore for SlowStore {
        async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Fields>, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.get_document(collection, id).await
        }

        async fn set_document(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.set_document(collection, id, fields).await
        }

        async fn update_document(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.update_document(collection, id, fields).await
        }

        async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
            self.inner.delete_document(collection, id).await
        }

        async fn query(&self, collection: &str, query: &Query) -> Result<Vec<(String, Fields)>, StoreError> {
            self.inner.query(collection, query).await
        }
    }

    fn memory() -> (Arc<MemoryStore>, ProfileStore) {
        let documents = Arc::new(MemoryStore::new());
        let store = ProfileStore::new(Some(documents.clone()), None);
        (documents, store)
    }

    fn named(name: &str) -> UserProfileUpdate {
        UserProfileUpdate { display_name: Some(name.to_string()), ..Default::default() }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_read_behaves_like_absent() {
        let inner = MemoryStore::new();
        inner.set_document(USERS_COLLECTION, "u1", Fields::new()).await.unwrap();
        let slow = SlowStore { delay: Duration::from_secs(30), inner };
        let store = ProfileStore::new(Some(Arc::new(slow)), None);

        assert_eq!(store.get("u1").await, None);
        assert!(matches!(store.fetch("u1").await, Err(ProfileError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_get_swallows_failures() {
        let mut documents = MockDocumentStore::new();
        documents
            .expect_get_document()
            .returning(|_, _| Err(StoreError::new(StoreErrorKind::PermissionDenied, "rules")));
        let store = ProfileStore::new(Some(Arc::new(documents)), None);

        assert_eq!(store.get("u1").await, None);
        assert!(matches!(store.fetch("u1").await, Err(ProfileError::StoreOperationFailed(_))));
    }

    #[tokio::test]
    async fn test_unconfigured_store_reads_as_unavailable() {
        let store = ProfileStore::new(None, None);

        assert_eq!(store.get("u1").await, None);
        assert!(matches!(store.fetch("u1").await, Err(ProfileError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_provision_creates_seeded_profile() {
        let (_, store) = memory();

        store.provision("u1", "ada@example.com", named("Ada")).await;

        let profile = store.get("u1").await.unwrap();
        assert_eq!(profile.email.as_deref(), Some("ada@example.com"));
        assert_eq!(profile.display_name.as_deref(), Some("Ada"));
        assert!(profile.created_at.is_some());
        assert!(profile.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_provision_merges_without_blanking() {
        let (documents, store) = memory();
        store.provision("u1", "ada@example.com", named("Ada")).await;
        let update = UserProfileUpdate { bio: Some("math".to_string()), ..Default::default() };
        store.update("u1", &update).await.unwrap();

        let defaults = UserProfileUpdate {
            display_name: Some(String::new()),
            photo_url: Some("https://cdn.example.com/ada.png".to_string()),
            ..Default::default()
        };
        store.provision("u1", "ada@example.com", defaults).await;

        let stored = documents.get_document(USERS_COLLECTION, "u1").await.unwrap().unwrap();
        assert_eq!(stored[FIELD_DISPLAY_NAME], FieldValue::String("Ada".to_string()));
        assert_eq!(stored[FIELD_BIO], FieldValue::String("math".to_string()));
        assert_eq!(stored[FIELD_PHOTO_URL], FieldValue::String("https://cdn.example.com/ada.png".to_string()));
    }

    #[tokio::test]
    async fn test_provision_never_fails() {
        let mut documents = MockDocumentStore::new();
        documents.expect_get_document().returning(|_, _| Ok(None));
        documents
            .expect_set_document()
            .times(1)
            .returning(|_, _, _| Err(StoreError::new(StoreErrorKind::PermissionDenied, "rules")));
        let store = ProfileStore::new(Some(Arc::new(documents)), None);

        store.provision("u1", "ada@example.com", UserProfileUpdate::default()).await;

        ProfileStore::new(None, None).provision("u1", "ada@example.com", UserProfileUpdate::default()).await;
    }

    #[tokio::test]
    async fn test_provision_survives_every_store_failure() {
        for kind in [StoreErrorKind::Unavailable, StoreErrorKind::Other, StoreErrorKind::NotFound] {
            let mut failing_read = MockDocumentStore::new();
            failing_read
                .expect_get_document()
                .times(1)
                .returning(move |_, _| Err(StoreError::new(kind, "read failed")));
            failing_read.expect_set_document().never();
            ProfileStore::new(Some(Arc::new(failing_read)), None)
                .provision("u1", "ada@example.com", named("Ada"))
                .await;

            let mut failing_merge = MockDocumentStore::new();
            failing_merge.expect_get_document().returning(|_, _| Ok(Some(Fields::new())));
            failing_merge
                .expect_update_document()
                .times(1)
                .returning(move |_, _, _| Err(StoreError::new(kind, "merge failed")));
            ProfileStore::new(Some(Arc::new(failing_merge)), None)
                .provision("u1", "ada@example.com", named("Ada"))
                .await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_provision_gives_up_on_slow_store() {
        let slow = Arc::new(SlowStore { delay: Duration::from_secs(30), inner: MemoryStore::new() });
        let store = ProfileStore::new(Some(slow.clone()), None).with_timeout(Duration::from_secs(2));
        let start = tokio::time::Instant::now();

        store.provision("u1", "ada@example.com", UserProfileUpdate::default()).await;

        assert!(start.elapsed() < Duration::from_secs(30));
        assert_eq!(slow.inner.get_document(USERS_COLLECTION, "u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_requires_configured_store() {
        let store = ProfileStore::new(None, None);

        let err = store.update("u1", &named("Ada")).await.unwrap_err();

        assert!(matches!(err, ProfileError::ConfigurationMissing(_)));
    }

    #[tokio::test]
    async fn test_update_writes_only_supplied_fields() {
        let (documents, store) = memory();
        store.provision("u1", "ada@example.com", UserProfileUpdate::default()).await;
        let before = documents.get_document(USERS_COLLECTION, "u1").await.unwrap().unwrap();

        store.update("u1", &named("Ada")).await.unwrap();
        let once = documents.get_document(USERS_COLLECTION, "u1").await.unwrap().unwrap();
        store.update("u1", &named("Ada")).await.unwrap();
        let twice = documents.get_document(USERS_COLLECTION, "u1").await.unwrap().unwrap();

        let changed: Vec<_> = once.keys().filter(|k| once.get(*k) != before.get(*k)).cloned().collect();
        assert!(changed.iter().all(|k| k == FIELD_DISPLAY_NAME || k == FIELD_UPDATED_AT));
        assert!(changed.contains(&FIELD_DISPLAY_NAME.to_string()));
        assert_eq!(once[FIELD_CREATED_AT], before[FIELD_CREATED_AT]);

        let mut once_rest = once.clone();
        let mut twice_rest = twice.clone();
        once_rest.remove(FIELD_UPDATED_AT);
        twice_rest.remove(FIELD_UPDATED_AT);
        assert_eq!(once_rest, twice_rest);
    }

    #[tokio::test]
    async fn test_update_of_missing_profile_is_surfaced() {
        let (_, store) = memory();

        let err = store.update("ghost", &named("Ada")).await.unwrap_err();

        assert!(matches!(err, ProfileError::StoreOperationFailed(_)));
    }

    #[tokio::test]
    async fn test_upload_avatar_path() {
        let mut blobs = MockStorageService::new();
        blobs
            .expect_upload_file()
            .withf(|path, data, content_type| {
                path == "users/u1/profile/me.png" && data.len() == 3 && content_type == "image/png"
            })
            .times(1)
            .returning(|path, _, _| Ok(format!("https://cdn.example.com/{path}")));
        let store = ProfileStore::new(None, Some(Arc::new(blobs)));

        let url = store.upload_avatar("u1", vec![1, 2, 3], "../../me.png", "image/png").await.unwrap();

        assert_eq!(url, "https://cdn.example.com/users/u1/profile/me.png");
    }

    #[tokio::test]
    async fn test_avatar_failures_are_surfaced() {
        let mut blobs = MockStorageService::new();
        blobs.expect_delete_file().returning(|path| Err(StorageError::NotFound(path.to_string())));
        let store = ProfileStore::new(None, Some(Arc::new(blobs)));

        assert!(store.delete_avatar("users/u1/profile/me.png").await.is_err());
        assert!(matches!(
            ProfileStore::new(None, None).upload_avatar("u1", vec![], "me.png", "image/png").await,
            Err(ProfileError::ConfigurationMissing(_))
        ));
        assert!(matches!(avatar_path("u1", "dir/"), Err(ProfileError::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn test_delete_profile_failures_are_surfaced() {
        let mut documents = MockDocumentStore::new();
        documents
            .expect_delete_document()
            .withf(|collection, uid| collection == USERS_COLLECTION && uid == "u1")
            .times(2)
            .returning({
                let mut calls = 0;
                move |_, _| {
                    calls += 1;
                    let kind = if calls == 1 { StoreErrorKind::PermissionDenied } else { StoreErrorKind::Unavailable };
                    Err(StoreError::new(kind, "delete failed"))
                }
            });
        let store = ProfileStore::new(Some(Arc::new(documents)), None);

        assert!(matches!(store.delete_profile("u1").await, Err(ProfileError::StoreOperationFailed(_))));
        assert!(matches!(store.delete_profile("u1").await, Err(ProfileError::StoreUnavailable(_))));
        assert!(matches!(
            ProfileStore::new(None, None).delete_profile("u1").await,
            Err(ProfileError::ConfigurationMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_search_and_delete() {
        let (_, store) = memory();
        store.provision("u1", "ada@example.com", named("Ada")).await;
        store.provision("u2", "grace@example.com", named("Grace")).await;

        let found = store.search("Gr").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uid, "u2");

        store.delete_profile("u2").await.unwrap();
        assert!(store.search("Gr").await.unwrap().is_empty());
    }
}
