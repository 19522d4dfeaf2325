//! Core data models for the lost & found service.
//!
//! These types are shared across all crates and are serialized to clients in
//! camelCase, matching the public API.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};

// =============================================================================
// ENUMS
// =============================================================================

/// Whether a report describes something lost or something found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Lost,
    Found,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Lost => "lost",
            ItemType::Found => "found",
        }
    }

    /// The kind a match candidate must have: lost items match found ones and
    /// vice versa.
    pub fn opposite(&self) -> ItemType {
        match self {
            ItemType::Lost => ItemType::Found,
            ItemType::Found => ItemType::Lost,
        }
    }
}

impl FromStr for ItemType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lost" => Ok(ItemType::Lost),
            "found" => Ok(ItemType::Found),
            _ => Err(Error::InvalidInput("Invalid item type".to_string())),
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moderation state of a report. Only approved items are publicly listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "pending",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ModerationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ModerationStatus::Pending),
            "approved" => Ok(ModerationStatus::Approved),
            "rejected" => Ok(ModerationStatus::Rejected),
            _ => Err(Error::InvalidInput(format!("Invalid status: {}", s))),
        }
    }
}

impl fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who closed a report. Serialized as the admin panel displays it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedBy {
    #[serde(rename = "Admin")]
    Admin,
    #[serde(rename = "user")]
    User,
}

impl ResolvedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolvedBy::Admin => "Admin",
            ResolvedBy::User => "user",
        }
    }
}

impl FromStr for ResolvedBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Admin" => Ok(ResolvedBy::Admin),
            "user" => Ok(ResolvedBy::User),
            _ => Err(Error::InvalidInput(format!("Invalid resolver: {}", s))),
        }
    }
}

// =============================================================================
// ITEM TYPES
// =============================================================================

/// A claim filed against an item by someone who believes it is theirs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll_no: Option<String>,
    pub name: String,
    pub email: String,
    pub claimed_at: DateTime<Utc>,
}

/// A lost or found report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(rename = "_id", alias = "id")]
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub location: String,
    pub date: DateTime<Utc>,
    pub contact_info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school_id: Option<String>,
    pub image_url: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub status: ModerationStatus,
    pub found_by_security: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_note: Option<String>,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderated_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderated_at: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub resolved_by: Option<ResolvedBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub user_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub claims: Vec<Claim>,
}

/// Validated payload for inserting an item. All defaults are already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub title: String,
    pub description: String,
    pub category: String,
    pub item_type: ItemType,
    pub location: String,
    pub date: DateTime<Utc>,
    pub contact_info: String,
    pub school_id: Option<String>,
    pub images: Vec<String>,
    pub submitted_by: String,
    pub user_email: String,
    pub phone: Option<String>,
}

impl NewItem {
    /// Materialize the stored item. New items always start pending and
    /// unresolved.
    pub fn into_item(self, id: Uuid, submitted_at: DateTime<Utc>) -> Item {
        let image_url = self.images.first().cloned().unwrap_or_default();
        Item {
            id,
            title: self.title,
            description: self.description,
            category: self.category,
            item_type: self.item_type,
            location: self.location,
            date: self.date,
            contact_info: self.contact_info,
            school_id: self.school_id,
            image_url,
            images: self.images,
            status: ModerationStatus::Pending,
            found_by_security: false,
            security_note: None,
            submitted_by: self.submitted_by,
            submitted_at,
            moderated_by: None,
            moderated_at: None,
            resolved: false,
            resolved_by: None,
            resolved_at: None,
            user_email: self.user_email,
            phone: self.phone,
            claims: Vec::new(),
        }
    }
}

/// Raw fields of a submission as received from a client form.
///
/// `contact` is the legacy name of `contact_info` and is still honored.
#[derive(Debug, Clone, Default)]
pub struct ItemSubmission {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub item_type: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
    pub contact_info: Option<String>,
    pub contact: Option<String>,
    pub student_id: Option<String>,
    pub submitted_by: Option<String>,
    pub user_email: Option<String>,
    pub phone: Option<String>,
}

impl ItemSubmission {
    /// Check required fields and apply defaults.
    ///
    /// Blank strings count as missing. The date falls back to `now`, the
    /// contact info to the legacy `contact` field and then to the submitter's
    /// email.
    pub fn validate(self, images: Vec<String>, now: DateTime<Utc>) -> Result<NewItem> {
        let title = non_blank(self.title);
        let description = non_blank(self.description);
        let location = non_blank(self.location);
        let item_type = non_blank(self.item_type);
        let submitted_by = non_blank(self.submitted_by);
        let user_email = non_blank(self.user_email);

        let (
            Some(title),
            Some(description),
            Some(location),
            Some(item_type),
            Some(submitted_by),
            Some(user_email),
        ) = (
            title,
            description,
            location,
            item_type,
            submitted_by,
            user_email,
        )
        else {
            return Err(Error::InvalidInput("Missing required fields".to_string()));
        };

        let item_type: ItemType = item_type.parse()?;
        let date = match non_blank(self.date) {
            Some(raw) => parse_flexible_date(&raw)?,
            None => now,
        };
        let contact_info = non_blank(self.contact_info)
            .or_else(|| non_blank(self.contact))
            .unwrap_or_else(|| user_email.clone());

        Ok(NewItem {
            title,
            description,
            category: non_blank(self.category).unwrap_or_else(|| defaults::CATEGORY.to_string()),
            item_type,
            location,
            date,
            contact_info,
            school_id: non_blank(self.student_id),
            images,
            submitted_by,
            user_email,
            phone: non_blank(self.phone),
        })
    }
}

/// Fields written when an admin moderates an item.
#[derive(Debug, Clone)]
pub struct ModerationUpdate {
    pub status: ModerationStatus,
    pub moderated_by: String,
    pub moderated_at: DateTime<Utc>,
}

/// A claim about to be appended to an item.
#[derive(Debug, Clone)]
pub struct NewClaim {
    pub roll_no: Option<String>,
    pub name: String,
    pub email: String,
}

// =============================================================================
// AUTH TYPES
// =============================================================================

/// Role carried by a session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    Admin,
    User,
}

impl SessionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionRole::Admin => "admin",
            SessionRole::User => "user",
        }
    }
}

impl FromStr for SessionRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(SessionRole::Admin),
            "user" => Ok(SessionRole::User),
            _ => Err(Error::InvalidInput(format!("Invalid session role: {}", s))),
        }
    }
}

/// A live bearer session. The token itself is never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub role: SessionRole,
    /// Admin username or user email.
    pub subject: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of checking a submitted one-time code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpCheck {
    Valid,
    /// Code mismatch; the attempt was counted.
    Invalid,
    Expired,
    /// No code was issued for this email.
    Missing,
    /// Too many failed attempts; the code was discarded.
    Exhausted,
}

impl OtpCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, OtpCheck::Valid)
    }
}

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Admin { username: String },
    User { email: String },
    Anonymous,
}

impl Principal {
    pub fn from_session(session: &Session) -> Self {
        match session.role {
            SessionRole::Admin => Principal::Admin {
                username: session.subject.clone(),
            },
            SessionRole::User => Principal::User {
                email: session.subject.clone(),
            },
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Admin { .. })
    }

    /// Email of an authenticated end user, if any.
    pub fn user_email(&self) -> Option<&str> {
        match self {
            Principal::User { email } => Some(email),
            _ => None,
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Trim a value and drop it if nothing remains.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Parse the date formats browsers send: RFC 3339, `datetime-local`
/// (`2025-03-01T14:30`) or a bare `date` (`2025-03-01`, midnight UTC).
pub fn parse_flexible_date(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(Error::InvalidInput(format!("Invalid date: {}", raw)))
}
