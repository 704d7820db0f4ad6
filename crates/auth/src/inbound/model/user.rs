use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::entity::user::{UserMetadata, UserRecord};
use crate::domain::inout::user::DEFAULT_MAX_RESULTS;

/// HTTP-date, the format the web clients already parse.
fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[derive(Serialize)]
pub struct UserEnvelope<T> {
    pub user: T,
}

// ╔════════════════════════════╗
// ║        User Record         ║
// ╚════════════════════════════╝

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sign_in_time: Option<String>,
}

impl From<UserMetadata> for MetadataResponse {
    fn from(metadata: UserMetadata) -> Self {
        Self {
            creation_time: metadata.creation_time.map(http_date),
            last_sign_in_time: metadata.last_sign_in_time.map(http_date),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub disabled: bool,
    pub metadata: MetadataResponse,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            uid: user.uid,
            email: user.email,
            email_verified: user.email_verified,
            display_name: user.display_name,
            photo_url: user.photo_url,
            disabled: user.disabled,
            metadata: user.metadata.into(),
        }
    }
}

// ╔════════════════════════════╗
// ║        Get Profile         ║
// ╚════════════════════════════╝

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_claims: Option<Map<String, Value>>,
}

impl From<UserRecord> for ProfileResponse {
    fn from(mut user: UserRecord) -> Self {
        let custom_claims = user.custom_claims.take();
        Self { user: user.into(), custom_claims }
    }
}

// ╔════════════════════════════╗
// ║      Update Profile        ║
// ╚════════════════════════════╝

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    pub email: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedUserResponse {
    pub uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl From<UserRecord> for UpdatedUserResponse {
    fn from(user: UserRecord) -> Self {
        Self { uid: user.uid, email: user.email, display_name: user.display_name, photo_url: user.photo_url }
    }
}

// ╔════════════════════════════╗
// ║        List Users          ║
// ╚════════════════════════════╝

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersRequest {
    pub page_token: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersResponse {
    pub users: Vec<UserResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    pub total_users: usize,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_user_response_shape() {
        let mut user = UserRecord::new("u1", Some("ada@example.com".to_string()));
        user.photo_url = Some("https://cdn.example.com/a.png".to_string());
        user.metadata.creation_time = DateTime::from_timestamp(1_700_000_000, 0);

        let value = serde_json::to_value(UserResponse::from(user)).unwrap();

        assert_eq!(
            value,
            json!({
                "uid": "u1",
                "email": "ada@example.com",
                "emailVerified": false,
                "photoURL": "https://cdn.example.com/a.png",
                "disabled": false,
                "metadata": { "creationTime": "Tue, 14 Nov 2023 22:13:20 GMT" }
            })
        );
    }

    #[test]
    fn test_profile_response_includes_claims() {
        let mut user = UserRecord::new("u1", None);
        user.custom_claims = json!({ "admin": true }).as_object().cloned();

        let value = serde_json::to_value(ProfileResponse::from(user)).unwrap();

        assert_eq!(value["uid"], "u1");
        assert_eq!(value["customClaims"]["admin"], true);
    }
}
