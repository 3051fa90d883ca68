use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode};
use ring::digest;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage API error: {status} - {message}")]
    Api { status: StatusCode, message: String },

    #[error("Malformed storage response: {0}")]
    MalformedResponse(String),
}

/// Locator pair returned by the provider. The service only ever stores
/// these, never the underlying bytes.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub url: String,
    pub public_id: String,
}

/// External file-storage collaborator.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        folder: &str,
    ) -> Result<StoredFile, StorageError>;

    async fn delete(&self, public_id: &str) -> Result<(), StorageError>;
}

/// Cloudinary-compatible implementation using the signed upload API.
pub struct CloudinaryStore {
    client: Client,
    base_url: String,
    cloud_name: String,
    api_key: String,
    api_secret: Secret<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

impl CloudinaryStore {
    pub fn new(
        base_url: impl Into<String>,
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: Secret<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret,
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/v1_1/{}/image/{}",
            self.base_url.trim_end_matches('/'),
            self.cloud_name,
            action
        )
    }

    /// SHA-1 request signature over the alphabetically ordered parameters,
    /// as the provider's signed-upload contract requires.
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted = params.to_vec();
        sorted.sort_by_key(|&(name, _)| name);

        let to_sign: String = sorted
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&");

        let signed = digest::digest(
            &digest::SHA1_FOR_LEGACY_USE_ONLY,
            format!("{}{}", to_sign, self.api_secret.expose_secret()).as_bytes(),
        );
        hex::encode(signed.as_ref())
    }

    async fn error_for(response: reqwest::Response) -> StorageError {
        let status = response.status();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        StorageError::Api { status, message }
    }
}

#[async_trait]
impl FileStore for CloudinaryStore {
    #[tracing::instrument(skip(self, bytes), fields(filename = %filename, folder = %folder))]
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        folder: &str,
    ) -> Result<StoredFile, StorageError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&[("folder", folder), ("timestamp", &timestamp)]);

        let form = multipart::Form::new()
            .part(
                "file",
                multipart::Part::bytes(bytes).file_name(filename.to_string()),
            )
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", folder.to_string())
            .text("signature", signature);

        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| StorageError::MalformedResponse(e.to_string()))?;

        // The provider hands back an absolute URL; anything else is garbage.
        Url::parse(&uploaded.secure_url)
            .map_err(|e| StorageError::MalformedResponse(format!("bad secure_url: {e}")))?;

        tracing::debug!(public_id = %uploaded.public_id, "File uploaded");

        Ok(StoredFile {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, public_id: &str) -> Result<(), StorageError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", &timestamp)]);

        let form = multipart::Form::new()
            .text("public_id", public_id.to_string())
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature);

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let destroyed: DestroyResponse = response
            .json()
            .await
            .map_err(|e| StorageError::MalformedResponse(e.to_string()))?;

        // "not found" counts as deleted: compensating cleanups may run twice.
        match destroyed.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(StorageError::Api {
                status: StatusCode::OK,
                message: format!("destroy returned {other:?}"),
            }),
        }
    }
}
