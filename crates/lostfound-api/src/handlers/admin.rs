//! Admin handlers: login, moderation and item management.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use lostfound_core::{
    defaults, is_plausible_email, non_blank, Item, ModerationStatus, ModerationUpdate,
    ResolvedBy, SessionRole,
};
use lostfound_notify::templates;

use crate::auth::RequireAdmin;
use crate::handlers::send_in_background;
use crate::{ApiError, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Exchange the admin username and password for a session token.
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = body?;
    let username = req.username.unwrap_or_default();
    let password = req.password.unwrap_or_default();

    if !state.admin.verify(&username, &password) {
        warn!(subsystem = "api", component = "auth", "Admin login failed");
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    let (token, session) = state
        .stores
        .sessions
        .create(SessionRole::Admin, state.admin.username(), state.config.session_ttl())
        .await?;

    info!(
        subsystem = "api",
        component = "auth",
        session_id = %session.id,
        expires_at = %session.expires_at,
        "Admin logged in"
    );
    Ok(Json(serde_json::json!({ "token": token })))
}

pub async fn logout(
    State(state): State<AppState>,
    admin: RequireAdmin,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.stores.sessions.revoke(&admin.token).await?;
    info!(subsystem = "api", component = "auth", session_id = %admin.session.id, "Admin logged out");
    Ok(Json(serde_json::json!({ "message": "Logged out" })))
}

/// Every item regardless of status, newest first.
pub async fn list_all_items(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<Json<Vec<Item>>, ApiError> {
    Ok(Json(state.stores.items.list_all().await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerateRequest {
    pub status: Option<String>,
    pub moderator_name: Option<String>,
}

/// Set an item's moderation status.
///
/// An item that becomes approved here triggers match notification in the
/// background. Re-approving an approved item does not.
pub async fn moderate_item(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ModerateRequest>, JsonRejection>,
) -> Result<Json<Item>, ApiError> {
    let Path(id) = path?;
    let Json(req) = body?;

    let status: ModerationStatus = non_blank(req.status)
        .ok_or_else(|| ApiError::BadRequest("Status is required".to_string()))?
        .parse()?;
    let update = ModerationUpdate {
        status,
        moderated_by: non_blank(req.moderator_name)
            .unwrap_or_else(|| defaults::MODERATOR_NAME.to_string()),
        moderated_at: Utc::now(),
    };

    let (item, previous) = state
        .stores
        .items
        .moderate(id, update)
        .await?
        .ok_or_else(ApiError::item_not_found)?;

    info!(
        subsystem = "api",
        op = "moderate_item",
        item_id = %item.id,
        from = %previous,
        to = %item.status,
        "Item moderated"
    );

    if item.status == ModerationStatus::Approved && previous != ModerationStatus::Approved {
        state.notifier.spawn(item.clone());
    }

    Ok(Json(item))
}

pub async fn resolve_item(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Item>, ApiError> {
    let Path(id) = path?;
    let item = state
        .stores
        .items
        .resolve(id, ResolvedBy::Admin)
        .await?
        .ok_or_else(ApiError::item_not_found)?;

    info!(subsystem = "api", op = "resolve_item", item_id = %item.id, "Item resolved by admin");
    Ok(Json(item))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityFlagRequest {
    #[serde(default)]
    pub found_by_security: bool,
    pub security_note: Option<String>,
}

/// Record that campus security holds an item. The submitter is told the
/// first time the flag is raised.
pub async fn set_found_by_security(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<SecurityFlagRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Path(id) = path?;
    let Json(req) = body?;

    let (item, was_found) = state
        .stores
        .items
        .set_security_flag(id, req.found_by_security, req.security_note.unwrap_or_default())
        .await?
        .ok_or_else(ApiError::item_not_found)?;

    info!(
        subsystem = "api",
        op = "set_found_by_security",
        item_id = %item.id,
        found_by_security = item.found_by_security,
        "Security flag updated"
    );

    if item.found_by_security && !was_found && is_plausible_email(&item.user_email) {
        send_in_background(state.mailer.clone(), templates::found_by_security(&item));
    }

    Ok(Json(serde_json::json!({
        "message": "Item updated",
        "item": item,
    })))
}

pub async fn delete_item(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Path(id) = path?;
    if !state.stores.items.delete(id).await? {
        return Err(ApiError::item_not_found());
    }

    info!(subsystem = "api", op = "delete_item", item_id = %id, "Item deleted");
    Ok(Json(serde_json::json!({ "message": "Item deleted successfully" })))
}
