/// The signed-in principal as reported by the identity provider. Read-only
/// on this side; changes only arrive through provider notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub email_verified: bool,
}

/// Changes to the provider-side account. `None` leaves a field as it is; an
/// empty string removes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityUpdate {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>, email: Option<String>) -> Self {
        Self { uid: uid.into(), email, ..Default::default() }
    }
}
