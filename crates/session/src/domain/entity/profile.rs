//! The application-owned user record and its document encoding.
//!
//! Profiles live in the `users` collection keyed by uid. Field names are the
//! camelCase ones the web front ends write, so documents stay readable by
//! both. Empty strings are stored for unset seed values and read back as
//! absent.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::outbound::document::{FieldValue, Fields};

pub const USERS_COLLECTION: &str = "users";

pub const FIELD_UID: &str = "uid";
pub const FIELD_EMAIL: &str = "email";
pub const FIELD_DISPLAY_NAME: &str = "displayName";
pub const FIELD_PHOTO_URL: &str = "photoURL";
pub const FIELD_BIO: &str = "bio";
pub const FIELD_PHONE_NUMBER: &str = "phoneNumber";
pub const FIELD_PREFERENCES: &str = "preferences";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_UPDATED_AT: &str = "updatedAt";

const PREF_THEME: &str = "theme";
const PREF_LANGUAGE: &str = "language";
const PREF_NOTIFICATIONS: &str = "notifications";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
    Auto,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::Auto => "auto",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "auto" => Ok(Theme::Auto),
            other => Err(format!("unknown theme: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    pub theme: Option<Theme>,
    pub language: Option<String>,
    pub notifications: Option<bool>,
}

impl Preferences {
    fn from_fields(fields: &Fields) -> Self {
        Self {
            theme: text(fields, PREF_THEME).and_then(|t| t.parse().ok()),
            language: text(fields, PREF_LANGUAGE),
            notifications: match fields.get(PREF_NOTIFICATIONS) {
                Some(FieldValue::Bool(flag)) => Some(*flag),
                _ => None,
            },
        }
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        if let Some(theme) = self.theme {
            fields.insert(PREF_THEME.to_string(), FieldValue::String(theme.to_string()));
        }
        if let Some(language) = &self.language {
            fields.insert(PREF_LANGUAGE.to_string(), FieldValue::String(language.clone()));
        }
        if let Some(notifications) = self.notifications {
            fields.insert(PREF_NOTIFICATIONS.to_string(), FieldValue::Bool(notifications));
        }
        fields
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserProfile {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub bio: Option<String>,
    pub phone_number: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub preferences: Option<Preferences>,
}

impl UserProfile {
    /// Decodes a stored document. `uid` is the document key, used when the
    /// document lacks its own `uid` field.
    pub fn from_fields(uid: &str, fields: &Fields) -> Self {
        Self {
            uid: text(fields, FIELD_UID).unwrap_or_else(|| uid.to_string()),
            email: text(fields, FIELD_EMAIL),
            display_name: text(fields, FIELD_DISPLAY_NAME),
            photo_url: text(fields, FIELD_PHOTO_URL),
            bio: text(fields, FIELD_BIO),
            phone_number: text(fields, FIELD_PHONE_NUMBER),
            created_at: timestamp(fields, FIELD_CREATED_AT),
            updated_at: timestamp(fields, FIELD_UPDATED_AT),
            preferences: match fields.get(FIELD_PREFERENCES) {
                Some(FieldValue::Map(prefs)) => Some(Preferences::from_fields(prefs)),
                _ => None,
            },
        }
    }

    /// The document written when a profile is first provisioned. Both
    /// timestamps are assigned by the store.
    pub fn seed_fields(uid: &str, email: &str, defaults: &UserProfileUpdate) -> Fields {
        let string = |value: &Option<String>| FieldValue::String(value.clone().unwrap_or_default());

        Fields::from([
            (FIELD_UID.to_string(), FieldValue::String(uid.to_string())),
            (FIELD_EMAIL.to_string(), FieldValue::String(email.to_string())),
            (FIELD_DISPLAY_NAME.to_string(), string(&defaults.display_name)),
            (FIELD_PHOTO_URL.to_string(), string(&defaults.photo_url)),
            (FIELD_BIO.to_string(), string(&defaults.bio)),
            (FIELD_PHONE_NUMBER.to_string(), string(&defaults.phone_number)),
            (
                FIELD_PREFERENCES.to_string(),
                FieldValue::Map(defaults.preferences.as_ref().map(Preferences::to_fields).unwrap_or_default()),
            ),
            (FIELD_CREATED_AT.to_string(), FieldValue::ServerTimestamp),
            (FIELD_UPDATED_AT.to_string(), FieldValue::ServerTimestamp),
        ])
    }
}

/// A partial profile edit. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub phone_number: Option<String>,
    pub photo_url: Option<String>,
    pub preferences: Option<Preferences>,
}

impl UserProfileUpdate {
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        let strings = [
            (FIELD_DISPLAY_NAME, &self.display_name),
            (FIELD_BIO, &self.bio),
            (FIELD_PHONE_NUMBER, &self.phone_number),
            (FIELD_PHOTO_URL, &self.photo_url),
        ];
        for (name, value) in strings {
            if let Some(value) = value {
                fields.insert(name.to_string(), FieldValue::String(value.clone()));
            }
        }
        if let Some(preferences) = &self.preferences {
            fields.insert(FIELD_PREFERENCES.to_string(), FieldValue::Map(preferences.to_fields()));
        }
        fields
    }

    /// Drops empty strings, so a merge never overwrites stored values with blanks.
    pub fn without_blanks(mut self) -> Self {
        for value in [&mut self.display_name, &mut self.bio, &mut self.phone_number, &mut self.photo_url] {
            if value.as_deref().is_some_and(str::is_empty) {
                *value = None;
            }
        }
        self
    }
}

fn text(fields: &Fields, name: &str) -> Option<String> {
    match fields.get(name) {
        Some(FieldValue::String(value)) if !value.is_empty() => Some(value.clone()),
        _ => None,
    }
}

fn timestamp(fields: &Fields, name: &str) -> Option<DateTime<Utc>> {
    match fields.get(name) {
        Some(FieldValue::Timestamp(value)) => Some(*value),
        _ => None,
    }
}
