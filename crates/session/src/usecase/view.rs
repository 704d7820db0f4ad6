//! The profile as a screen shows it: stored fields layered over identity.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::store::ProfileStore;
use crate::domain::entity::identity::Identity;
use crate::domain::entity::profile::{Preferences, UserProfile, UserProfileUpdate};
use crate::domain::entity::session::SessionHandle;
use crate::domain::error::ProfileError;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const NOT_AN_IMAGE_MSG: &str = "Please select an image file";
const IMAGE_TOO_LARGE_MSG: &str = "Image size must be less than 5MB";
const NOT_SET: &str = "Not set";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub profile: Option<UserProfile>,
    pub loading: bool,
    pub error: Option<String>,
}

/// A merged field. `NotSet` when neither source has a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewField {
    Value(String),
    NotSet,
}

impl ViewField {
    fn pick(stored: Option<&String>, identity: Option<&String>) -> Self {
        stored.or(identity).map_or(ViewField::NotSet, |value| ViewField::Value(value.clone()))
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            ViewField::Value(value) => Some(value),
            ViewField::NotSet => None,
        }
    }
}

impl fmt::Display for ViewField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value().unwrap_or(NOT_SET))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedProfile {
    pub uid: String,
    pub email: ViewField,
    pub email_verified: bool,
    pub display_name: ViewField,
    pub photo_url: ViewField,
    pub bio: ViewField,
    pub phone_number: ViewField,
    pub preferences: Option<Preferences>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MergedProfile {
    /// Stored values win over identity values.
    pub fn merge(identity: &Identity, stored: Option<&UserProfile>) -> Self {
        Self {
            uid: identity.uid.clone(),
            email: ViewField::pick(stored.and_then(|p| p.email.as_ref()), identity.email.as_ref()),
            email_verified: identity.email_verified,
            display_name: ViewField::pick(stored.and_then(|p| p.display_name.as_ref()), identity.display_name.as_ref()),
            photo_url: ViewField::pick(stored.and_then(|p| p.photo_url.as_ref()), identity.photo_url.as_ref()),
            bio: ViewField::pick(stored.and_then(|p| p.bio.as_ref()), None),
            phone_number: ViewField::pick(stored.and_then(|p| p.phone_number.as_ref()), None),
            preferences: stored.and_then(|p| p.preferences.clone()),
            created_at: stored.and_then(|p| p.created_at),
            updated_at: stored.and_then(|p| p.updated_at),
        }
    }
}

/// An image picked for upload.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    /// Guesses the content type from the file extension.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = mime_guess::from_path(&file_name).first_or_octet_stream().essence_str().to_string();
        Self { file_name, content_type, bytes }
    }

    fn validate(&self) -> Result<(), ProfileError> {
        if !self.content_type.starts_with("image/") {
            return Err(ProfileError::ValidationFailed(NOT_AN_IMAGE_MSG.to_string()));
        }
        if self.bytes.len() > MAX_IMAGE_BYTES {
            return Err(ProfileError::ValidationFailed(IMAGE_TOO_LARGE_MSG.to_string()));
        }
        Ok(())
    }
}

pub struct ProfileView {
    session: SessionHandle,
    store: ProfileStore,
    state: watch::Sender<ViewState>,
    seq: AtomicU64,
}

impl ProfileView {
    pub fn new(session: SessionHandle, store: ProfileStore) -> Self {
        let initial = ViewState { profile: None, loading: true, error: None };
        Self { session, store, state: watch::Sender::new(initial), seq: AtomicU64::new(0) }
    }

    pub fn current(&self) -> ViewState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.state.subscribe()
    }

    /// `None` while loading or when nobody is signed in.
    pub fn merged(&self) -> Option<MergedProfile> {
        let state = self.state.borrow();
        if state.loading {
            return None;
        }
        let identity = self.session.identity()?;
        Some(MergedProfile::merge(&identity, state.profile.as_ref()))
    }

    /// Re-reads the stored profile. Only the most recent call's result is kept.
    pub async fn load(&self) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(identity) = self.session.identity() else {
            self.apply(seq, ViewState::default());
            return;
        };

        self.state.send_modify(|state| state.loading = true);

        let next = match self.store.fetch(&identity.uid).await {
            Ok(profile) => ViewState { profile, loading: false, error: None },
            Err(err) if err.is_transient() => {
                tracing::warn!(uid = %identity.uid, error = %err, "Showing identity data only, profile store unavailable");
                ViewState::default()
            },
            Err(err) => {
                tracing::error!(uid = %identity.uid, error = %err, "Failed to load user profile");
                ViewState { profile: None, loading: false, error: Some(err.to_string()) }
            },
        };

        if !self.apply(seq, next) {
            tracing::debug!(seq, "Discarded stale profile load");
        }
    }

    fn apply(&self, seq: u64, next: ViewState) -> bool {
        self.state.send_if_modified(|state| {
            if self.seq.load(Ordering::SeqCst) != seq {
                return false;
            }
            *state = next;
            true
        })
    }

    fn set_error(&self, error: Option<String>) {
        self.state.send_if_modified(|state| {
            if state.error == error {
                return false;
            }
            state.error = error;
            true
        });
    }

    /// Writes the edit, then reloads. The view never shows unconfirmed values.
    pub async fn update(&self, updates: UserProfileUpdate) -> Result<(), ProfileError> {
        let identity = self.session.identity().ok_or(ProfileError::NotAuthenticated)?;
        self.set_error(None);

        if let Err(err) = self.store.update(&identity.uid, &updates).await {
            self.set_error(Some(err.to_string()));
            return Err(err);
        }

        self.load().await;
        Ok(())
    }

    /// Uploads a new avatar and points `photoURL` at it. Rejected files and
    /// failed uploads are shown as the view's error.
    pub async fn upload_image(&self, file: ImageFile) -> Result<String, ProfileError> {
        if let Err(err) = file.validate() {
            self.set_error(Some(err.to_string()));
            return Err(err);
        }
        let identity = self.session.identity().ok_or(ProfileError::NotAuthenticated)?;
        self.set_error(None);

        let uploaded = self.store.upload_avatar(&identity.uid, file.bytes, &file.file_name, &file.content_type).await;
        let url = match uploaded {
            Ok(url) => url,
            Err(err) => {
                self.set_error(Some(err.to_string()));
                return Err(err);
            },
        };
        self.update(UserProfileUpdate { photo_url: Some(url.clone()), ..Default::default() }).await?;

        Ok(url)
    }

    /// Loads once, then reloads whenever the signed-in identity changes.
    /// Returns when the session state is gone.
    pub async fn run(self: Arc<Self>) {
        let mut session = self.session.clone();
        let mut last = session.identity();
        self.load().await;

        while session.changed().await {
            let current = session.current();
            if current.loading || current.identity == last {
                continue;
            }
            last = current.identity;
            self.load().await;
        }
    }
}
