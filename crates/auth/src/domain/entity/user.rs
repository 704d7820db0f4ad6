use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserMetadata {
    pub creation_time: Option<DateTime<Utc>>,
    pub last_sign_in_time: Option<DateTime<Utc>>,
}

/// An account as held by the identity provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserRecord {
    pub uid: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub disabled: bool,
    pub metadata: UserMetadata,
    pub custom_claims: Option<Map<String, Value>>,
    /// Tokens issued before this instant count as revoked.
    pub tokens_valid_after: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn new(uid: impl Into<String>, email: Option<String>) -> Self {
        Self { uid: uid.into(), email, ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub email_verified: bool,
}

/// Partial account update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserChanges {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub email: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.photo_url.is_none() && self.email.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPage {
    pub users: Vec<UserRecord>,
    pub next_page_token: Option<String>,
}
