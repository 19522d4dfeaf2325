//! Admin credentials and bearer-token extractors.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use rand::RngCore;
use tracing::{debug, warn};

use lostfound_core::{Error, Principal, Result, Session, SessionRole};

use crate::error::ApiError;
use crate::services::identity::IdentityUser;
use crate::AppState;

// =============================================================================
// ADMIN CREDENTIALS
// =============================================================================

/// The configured admin account. Only the argon2 hash of the password is
/// kept in memory.
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    username: String,
    password_hash: String,
}

impl AdminCredentials {
    pub fn new(username: impl Into<String>, password: &str) -> Result<Self> {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt)
            .map_err(|e| Error::Config(format!("Failed to encode salt: {}", e)))?;
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::Config(format!("Failed to hash admin password: {}", e)))?
            .to_string();

        Ok(Self {
            username: username.into(),
            password_hash,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        if username != self.username {
            return false;
        }
        let Ok(parsed) = PasswordHash::new(&self.password_hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

// =============================================================================
// EXTRACTORS
// =============================================================================

/// Token following `Bearer ` in the Authorization header.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Requires a live admin session.
#[derive(Debug, Clone)]
pub struct RequireAdmin {
    pub session: Session,
    /// The presented token, kept so logout can revoke it.
    pub token: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("Missing or invalid token".to_string()))?
            .to_string();

        let session = state
            .stores
            .sessions
            .validate(&token)
            .await?
            .ok_or_else(|| {
                ApiError::Unauthorized("Session expired or invalid token".to_string())
            })?;

        if session.role != SessionRole::Admin {
            warn!(
                subsystem = "api",
                component = "auth",
                role = session.role.as_str(),
                "Non-admin session on admin route"
            );
            return Err(ApiError::Forbidden("Forbidden".to_string()));
        }

        Ok(RequireAdmin { session, token })
    }
}

/// Whoever is calling, if they presented a valid session. Never rejects.
#[derive(Debug, Clone)]
pub struct MaybeUser {
    pub principal: Principal,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let principal = match bearer_token(parts) {
            Some(token) => match state.stores.sessions.validate(token).await {
                Ok(Some(session)) => Principal::from_session(&session),
                Ok(None) => Principal::Anonymous,
                Err(e) => {
                    warn!(subsystem = "api", component = "auth", error = %e, "Session lookup failed");
                    Principal::Anonymous
                }
            },
            None => Principal::Anonymous,
        };
        Ok(MaybeUser { principal })
    }
}

/// A user vouched for by the identity provider.
#[derive(Debug, Clone)]
pub struct VerifiedUser(pub IdentityUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for VerifiedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(' ').nth(1))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Forbidden("Token missing".to_string()))?;

        match state.identity.verify(token).await {
            Ok(user) => Ok(VerifiedUser(user)),
            Err(e) => {
                debug!(subsystem = "identity", error = %e, "Identity token rejected");
                Err(ApiError::Unauthorized("Invalid or expired token".to_string()))
            }
        }
    }
}
