use serde::{Deserialize, Serialize};

use crate::domain::entity::user::UserRecord;

// ╔════════════════════════════╗
// ║       Create User          ║
// ╚════════════════════════════╝

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedUserResponse {
    pub uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl From<UserRecord> for CreatedUserResponse {
    fn from(user: UserRecord) -> Self {
        Self { uid: user.uid, email: user.email, display_name: user.display_name }
    }
}
