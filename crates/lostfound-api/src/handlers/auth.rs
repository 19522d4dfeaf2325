//! End-user authentication: email one-time codes, identity-provider checks
//! and profile pictures.

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info, warn};

use lostfound_core::{is_plausible_email, non_blank, normalize_email, OtpCheck, SessionRole};
use lostfound_db::{generate_otp_code, hash_secret};
use lostfound_media::validate_image;
use lostfound_notify::templates;

use crate::auth::VerifiedUser;
use crate::{ApiError, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct SendOtpRequest {
    pub email: Option<String>,
}

/// Email a fresh six-digit login code, replacing any outstanding one.
pub async fn send_otp(
    State(state): State<AppState>,
    body: Result<Json<SendOtpRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = body?;
    let email = non_blank(req.email)
        .filter(|e| is_plausible_email(e))
        .map(|e| normalize_email(&e))
        .ok_or_else(|| ApiError::BadRequest("Invalid email".to_string()))?;

    let code = generate_otp_code();
    let ttl = state.config.otp_ttl();
    state
        .stores
        .otps
        .replace(&email, &hash_secret(&code), Utc::now() + ttl)
        .await?;

    let message = templates::otp_code(&email, &code, ttl.num_minutes());
    if let Err(e) = state.mailer.send(&message).await {
        error!(
            subsystem = "api",
            component = "auth",
            recipient = %email,
            error = %e,
            "OTP delivery failed"
        );
        return Err(ApiError::Internal("Failed to send OTP".to_string()));
    }

    info!(subsystem = "api", component = "auth", recipient = %email, "OTP sent");
    Ok(Json(serde_json::json!({ "message": "OTP sent" })))
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: Option<String>,
    pub otp: Option<String>,
}

/// Trade a valid login code for a user session token.
pub async fn verify_otp(
    State(state): State<AppState>,
    body: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = body?;
    let rejected = || ApiError::BadRequest("Invalid or expired OTP".to_string());

    let email = non_blank(req.email)
        .map(|e| normalize_email(&e))
        .ok_or_else(rejected)?;
    let code = non_blank(req.otp).ok_or_else(rejected)?;

    let check = state
        .stores
        .otps
        .verify(&email, &hash_secret(&code), Utc::now())
        .await?;
    if check != OtpCheck::Valid {
        warn!(
            subsystem = "api",
            component = "auth",
            recipient = %email,
            outcome = ?check,
            "OTP rejected"
        );
        return Err(rejected());
    }

    state.stores.otps.clear(&email).await?;
    let (token, session) = state
        .stores
        .sessions
        .create(SessionRole::User, &email, state.config.session_ttl())
        .await?;

    info!(
        subsystem = "api",
        component = "auth",
        session_id = %session.id,
        "User session issued"
    );
    Ok(Json(serde_json::json!({ "token": token })))
}

/// Echo the user the identity provider vouches for.
pub async fn submit_report(VerifiedUser(user): VerifiedUser) -> Json<serde_json::Value> {
    info!(subsystem = "api", component = "auth", uid = %user.uid, "Identity-verified submission");
    Json(serde_json::json!({
        "message": "Report submitted successfully",
        "user": user,
    }))
}

/// Store a profile picture on the image host and return its URL.
pub async fn upload_profile(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut multipart = multipart?;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("profile") {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?.to_vec();
        if bytes.is_empty() {
            break;
        }

        let upload = validate_image(filename.as_deref(), bytes)?;
        let stored = state.images.upload(upload).await?;
        info!(subsystem = "api", component = "media", public_id = %stored.public_id, "Profile picture uploaded");
        return Ok(Json(serde_json::json!({ "url": stored.url })));
    }

    Err(ApiError::BadRequest("No file uploaded".to_string()))
}
