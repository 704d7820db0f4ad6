use std::sync::Arc;

use app_core::storage::{StorageError, StorageService};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;

use crate::outbound::identity::{FirebaseOptions, IdentityProvider};

const STORAGE_URL: &str = "https://firebasestorage.googleapis.com/v0/b";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    name: String,
    download_tokens: Option<String>,
}

/// Cloud Storage for Firebase, authorised as the signed-in user.
pub struct FirebaseStorage {
    bucket: String,
    identity: Arc<dyn IdentityProvider>,
    client: reqwest::Client,
}

impl FirebaseStorage {
    pub fn new(options: &FirebaseOptions, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { bucket: options.storage_bucket.clone(), identity, client: reqwest::Client::new() }
    }

    fn object_url(&self, path: &str) -> String {
        format!("{STORAGE_URL}/{}/o/{}", self.bucket, urlencoding::encode(path))
    }

    fn download_url(&self, path: &str, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("{}?alt=media&token={token}", self.object_url(path)),
            None => format!("{}?alt=media", self.object_url(path)),
        }
    }

    async fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.identity.id_token().await {
            Some(token) => request.header(AUTHORIZATION, format!("Firebase {token}")),
            None => request,
        }
    }

    async fn rejected(response: reqwest::Response) -> StorageError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        StorageError::Rejected { status, message }
    }
}

#[async_trait]
impl StorageService for FirebaseStorage {
    async fn upload_file(&self, path: &str, data: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        let request = self
            .client
            .post(format!("{STORAGE_URL}/{}/o", self.bucket))
            .query(&[("name", path)])
            .header(CONTENT_TYPE, content_type)
            .body(data);
        let response = self.authorize(request).await.send().await?;
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let metadata: ObjectMetadata = response.json().await?;
        // The object may carry several download tokens; any of them works.
        let token = metadata.download_tokens.as_deref().and_then(|t| t.split(',').next());

        tracing::debug!(object = %metadata.name, "Uploaded object");
        Ok(self.download_url(&metadata.name, token))
    }

    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        let request = self.client.delete(self.object_url(path));
        let response = self.authorize(request).await.send().await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(path.to_string())),
            _ => Err(Self::rejected(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::identity::MockIdentityProvider;

    #[test]
    fn test_download_url_encodes_path() {
        let options = FirebaseOptions { storage_bucket: "demo.appspot.com".to_string(), ..Default::default() };
        let storage = FirebaseStorage::new(&options, Arc::new(MockIdentityProvider::new()));

        let url = storage.download_url("users/u1/profile/me.png", Some("tok"));

        assert_eq!(
            url,
            "https://firebasestorage.googleapis.com/v0/b/demo.appspot.com/o/users%2Fu1%2Fprofile%2Fme.png?alt=media&token=tok"
        );
    }
}
