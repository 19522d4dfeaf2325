//! Image hosts.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};

use lostfound_core::{defaults, Error, Result};

use crate::upload::ImageUpload;

/// Default Cloudinary API endpoint.
pub const CLOUDINARY_API_URL: &str = "https://api.cloudinary.com";

/// Timeout for a single upload.
const UPLOAD_TIMEOUT_SECS: u64 = 60;

/// An image stored by a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// Public HTTPS URL of the image.
    pub url: String,
    /// Host-side identifier.
    pub public_id: String,
}

/// Third-party storage for uploaded images.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, image: ImageUpload) -> Result<StoredImage>;
}

// =============================================================================
// CLOUDINARY
// =============================================================================

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub base_url: String,
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

impl CloudinaryConfig {
    pub fn new(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: CLOUDINARY_API_URL.to_string(),
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            folder: defaults::IMAGE_FOLDER.to_string(),
        }
    }

    /// Read `CLOUD_NAME`, `CLOUD_API_KEY`, `CLOUD_API_SECRET` and optionally
    /// `CLOUDINARY_FOLDER`. Returns None if any credential is missing.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let mut config = Self::new(
            var("CLOUD_NAME")?,
            var("CLOUD_API_KEY")?,
            var("CLOUD_API_SECRET")?,
        );
        if let Some(folder) = var("CLOUDINARY_FOLDER") {
            config.folder = folder;
        }
        Some(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Sign upload parameters: SHA-1 hex of `k=v` pairs sorted by key and joined
/// with `&`, followed by the API secret.
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Signed uploads to Cloudinary's REST API.
pub struct CloudinaryHost {
    config: CloudinaryConfig,
    client: reqwest::Client,
}

impl CloudinaryHost {
    pub fn new(config: CloudinaryConfig) -> Self {
        info!(
            subsystem = "media",
            component = "cloudinary",
            cloud = %config.cloud_name,
            folder = %config.folder,
            "Image host configured"
        );
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Create from environment variables.
    /// Returns None if Cloudinary credentials are not set.
    pub fn from_env() -> Option<Self> {
        CloudinaryConfig::from_env().map(Self::new)
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/v1_1/{}/image/upload",
            self.config.base_url.trim_end_matches('/'),
            self.config.cloud_name
        )
    }
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    async fn upload(&self, image: ImageUpload) -> Result<StoredImage> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let allowed_formats = defaults::ALLOWED_IMAGE_FORMATS.join(",");
        let params = vec![
            ("allowed_formats", allowed_formats),
            ("folder", self.config.folder.clone()),
            ("timestamp", timestamp),
        ];
        let signature = sign_params(&params, &self.config.api_secret);

        let size = image.bytes.len();
        let part = reqwest::multipart::Part::bytes(image.bytes)
            .file_name(image.filename.clone())
            .mime_str(&image.content_type)?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature);
        for (key, value) in params {
            form = form.text(key, value);
        }

        let response = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| Error::Storage(format!("Upload request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            warn!(
                subsystem = "media",
                component = "cloudinary",
                status = status.as_u16(),
                error = %message,
                "Image upload rejected"
            );
            return Err(Error::Storage(format!(
                "Image host returned {}: {}",
                status, message
            )));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| Error::Storage(format!("Failed to parse upload response: {}", e)))?;

        debug!(
            subsystem = "media",
            component = "cloudinary",
            public_id = %uploaded.public_id,
            bytes = size,
            "Image uploaded"
        );
        Ok(StoredImage {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
        })
    }
}

// =============================================================================
// DISABLED
// =============================================================================

/// Rejects every upload. Used when no image host is configured.
#[derive(Debug, Default, Clone)]
pub struct DisabledImageHost;

#[async_trait]
impl ImageHost for DisabledImageHost {
    async fn upload(&self, _image: ImageUpload) -> Result<StoredImage> {
        Err(Error::Config("Image uploads are not configured".to_string()))
    }
}
