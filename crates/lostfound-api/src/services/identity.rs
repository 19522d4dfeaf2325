//! Identity provider used to vouch for end users signed in on the client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use lostfound_core::{Error, Result};

/// Default Identity Toolkit endpoint.
pub const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com";

const LOOKUP_TIMEOUT_SECS: u64 = 10;

/// A user as reported by the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentityUser {
    pub email: Option<String>,
    pub uid: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve an ID token issued to a client into the user it belongs to.
    async fn verify(&self, id_token: &str) -> Result<IdentityUser>;
}

// =============================================================================
// FIREBASE
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Verifies ID tokens through the Identity Toolkit `accounts:lookup` call.
pub struct FirebaseIdentity {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl FirebaseIdentity {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: IDENTITY_TOOLKIT_URL.to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn lookup_url(&self) -> String {
        format!(
            "{}/v1/accounts:lookup?key={}",
            self.base_url.trim_end_matches('/'),
            self.api_key
        )
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    async fn verify(&self, id_token: &str) -> Result<IdentityUser> {
        let response = self
            .client
            .post(self.lookup_url())
            .json(&serde_json::json!({ "idToken": id_token }))
            .timeout(Duration::from_secs(LOOKUP_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| Error::Identity(format!("Lookup request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            debug!(
                subsystem = "identity",
                component = "firebase",
                status = status.as_u16(),
                error = %message,
                "Token lookup rejected"
            );
            return Err(Error::Identity(message));
        }

        let lookup: LookupResponse = response
            .json()
            .await
            .map_err(|e| Error::Identity(format!("Failed to parse lookup response: {}", e)))?;

        let user = lookup
            .users
            .into_iter()
            .next()
            .ok_or_else(|| Error::Identity("Token does not belong to any user".to_string()))?;

        Ok(IdentityUser {
            email: user.email,
            uid: user.local_id,
            name: user.display_name,
            picture: user.photo_url,
        })
    }
}

// =============================================================================
// DISABLED
// =============================================================================

/// Rejects every token. Used when no identity provider is configured.
#[derive(Debug, Default, Clone)]
pub struct DisabledIdentity;

#[async_trait]
impl IdentityProvider for DisabledIdentity {
    async fn verify(&self, _id_token: &str) -> Result<IdentityUser> {
        Err(Error::Config("Identity provider is not configured".to_string()))
    }
}

/// Pick the provider for the configured web API key.
pub fn identity_from_key(api_key: Option<&str>) -> std::sync::Arc<dyn IdentityProvider> {
    match api_key {
        Some(key) => {
            info!(subsystem = "identity", component = "firebase", "Identity provider configured");
            std::sync::Arc::new(FirebaseIdentity::new(key))
        }
        None => {
            warn!(
                subsystem = "identity",
                "FIREBASE_API_KEY not set, identity-protected routes will reject every token"
            );
            std::sync::Arc::new(DisabledIdentity)
        }
    }
}
