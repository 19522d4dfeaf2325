//! Public item handlers: submission, listing, owner resolve and claims.

use axum::extract::rejection::{
    JsonRejection, PathRejection, QueryRejection,
};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use lostfound_core::{
    is_plausible_email, non_blank, normalize_email, Item, ItemFilter, ItemSubmission, ItemType,
    NewClaim, ResolvedBy,
};
use lostfound_media::{check_image_count, validate_image};
use lostfound_notify::templates;

use crate::auth::MaybeUser;
use crate::handlers::send_in_background;
use crate::{ApiError, AppState};

/// An image part received before validation.
struct RawImage {
    filename: Option<String>,
    bytes: Vec<u8>,
}

/// Accept a lost or found report with up to five images.
///
/// The item is stored pending review. The submitter gets a receipt by email
/// once the response is on its way.
pub async fn submit_item(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let mut multipart = multipart?;
    let mut submission = ItemSubmission::default();
    let mut raw_images: Vec<RawImage> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "images" {
            let filename = field.file_name().map(str::to_string);
            let bytes = field.bytes().await?.to_vec();
            // An empty file input still sends a part.
            if bytes.is_empty() {
                continue;
            }
            raw_images.push(RawImage { filename, bytes });
            check_image_count(raw_images.len())?;
            continue;
        }

        let value = Some(field.text().await?);
        match name.as_str() {
            "title" => submission.title = value,
            "description" => submission.description = value,
            "category" => submission.category = value,
            "type" => submission.item_type = value,
            "location" => submission.location = value,
            "date" => submission.date = value,
            "contactInfo" => submission.contact_info = value,
            "contact" => submission.contact = value,
            "studentId" => submission.student_id = value,
            "submittedBy" => submission.submitted_by = value,
            "userEmail" => submission.user_email = value,
            "phone" => submission.phone = value,
            other => debug!(subsystem = "api", field = other, "Ignoring unknown form field"),
        }
    }

    // Validate the form before anything is uploaded.
    let now = Utc::now();
    let new_item = submission.validate(Vec::new(), now)?;

    let mut uploads = Vec::with_capacity(raw_images.len());
    for raw in raw_images {
        uploads.push(validate_image(raw.filename.as_deref(), raw.bytes)?);
    }

    let mut image_urls = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let stored = state.images.upload(upload).await?;
        image_urls.push(stored.url);
    }

    let item = state
        .stores
        .items
        .insert(lostfound_core::NewItem {
            images: image_urls,
            ..new_item
        })
        .await?;

    info!(
        subsystem = "api",
        op = "submit_item",
        item_id = %item.id,
        item_type = %item.item_type,
        images = item.images.len(),
        "Item submitted"
    );

    send_in_background(state.mailer.clone(), templates::submission_received(&item));
    if state.config.match_on_submit {
        state.notifier.spawn(item.clone());
    }

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "Item submitted successfully",
            "item": item,
        })),
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItemsQuery {
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub user_email: Option<String>,
}

impl ListItemsQuery {
    /// Blank parameters count as absent.
    pub fn into_filter(self) -> Result<ItemFilter, ApiError> {
        let item_type = non_blank(self.item_type)
            .map(|t| t.parse::<ItemType>())
            .transpose()?;
        Ok(ItemFilter {
            item_type,
            location: non_blank(self.location),
            category: non_blank(self.category),
            search: non_blank(self.search),
            user_email: non_blank(self.user_email),
        })
    }
}

/// Approved items, newest first. An owner search also shows that owner's
/// unapproved items.
pub async fn list_items(
    State(state): State<AppState>,
    query: Result<Query<ListItemsQuery>, QueryRejection>,
) -> Result<Json<Vec<Item>>, ApiError> {
    let Query(query) = query?;
    let filter = query.into_filter()?;
    let items = state.stores.items.list(filter).await?;
    debug!(subsystem = "api", op = "list_items", result_count = items.len(), "Items listed");
    Ok(Json(items))
}

pub async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.stores.items.categories().await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveRequest {
    pub email: Option<String>,
}

/// Let the submitter close their own report.
///
/// The owner is identified by a user session when one is presented,
/// otherwise by the `email` in the body.
pub async fn resolve_own_item(
    State(state): State<AppState>,
    MaybeUser { principal }: MaybeUser,
    path: Result<Path<Uuid>, PathRejection>,
    body: Option<Json<ResolveRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Path(id) = path?;
    let claimed_email = principal
        .user_email()
        .map(str::to_string)
        .or_else(|| body.and_then(|Json(b)| non_blank(b.email)));

    let item = state
        .stores
        .items
        .fetch(id)
        .await?
        .ok_or_else(ApiError::item_not_found)?;

    let is_owner = claimed_email
        .map(|email| normalize_email(&email) == normalize_email(&item.user_email))
        .unwrap_or(false);
    if !is_owner {
        return Err(ApiError::Forbidden(
            "Unauthorized to resolve this item".to_string(),
        ));
    }

    let item = state
        .stores
        .items
        .resolve(id, ResolvedBy::User)
        .await?
        .ok_or_else(ApiError::item_not_found)?;

    info!(subsystem = "api", op = "resolve_own_item", item_id = %item.id, "Item resolved by owner");
    Ok(Json(serde_json::json!({
        "message": "Item marked as resolved",
        "item": item,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub roll_no: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// File a claim against an item. The claimant gets a confirmation email.
pub async fn claim_item(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ClaimRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Path(id) = path?;
    let Json(req) = body?;

    let name = non_blank(req.name);
    let email = non_blank(req.email).filter(|e| is_plausible_email(e));
    let (Some(name), Some(email)) = (name, email) else {
        return Err(ApiError::BadRequest(
            "Name and a valid email are required".to_string(),
        ));
    };

    let item = state
        .stores
        .items
        .add_claim(
            id,
            NewClaim {
                roll_no: non_blank(req.roll_no),
                name: name.clone(),
                email: email.clone(),
            },
        )
        .await?
        .ok_or_else(ApiError::item_not_found)?;

    info!(
        subsystem = "api",
        op = "claim_item",
        item_id = %item.id,
        claims = item.claims.len(),
        "Claim recorded"
    );
    send_in_background(
        state.mailer.clone(),
        templates::claim_received(&name, &email, &item),
    );

    Ok(Json(serde_json::json!({ "message": "Claim submitted successfully" })))
}
