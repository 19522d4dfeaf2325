//! Rules deciding which reports plausibly describe the same object.
//!
//! A candidate qualifies when it is of the opposite kind, approved, still
//! open, and one title contains the other (case-insensitively). Titles are
//! never interpreted as patterns.

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::models::{Item, ItemType, ModerationStatus};

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("email pattern is valid"));

/// Shape-check an email address (`something@something.something`).
pub fn is_plausible_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email.trim())
}

/// Canonical form of an email used as a lookup key: trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Case-insensitive literal containment.
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// True when either trimmed title contains the other, ignoring case.
/// Blank titles never overlap anything.
pub fn titles_overlap(a: &str, b: &str) -> bool {
    let a = a.trim();
    let b = b.trim();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    contains_ci(a, b) || contains_ci(b, a)
}

/// Lookup for the counterparts of one trigger item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchQuery {
    pub target_type: ItemType,
    pub title: String,
    pub exclude_id: Option<Uuid>,
}

impl MatchQuery {
    /// Build the query for items that could answer `trigger`.
    pub fn for_trigger(trigger: &Item) -> Self {
        Self {
            target_type: trigger.item_type.opposite(),
            title: trigger.title.trim().to_string(),
            exclude_id: Some(trigger.id),
        }
    }

    /// In-process evaluation of the query. The PostgreSQL repository encodes
    /// the same predicate in SQL.
    pub fn admits(&self, candidate: &Item) -> bool {
        candidate.item_type == self.target_type
            && candidate.status == ModerationStatus::Approved
            && !candidate.resolved
            && self.exclude_id != Some(candidate.id)
            && titles_overlap(&candidate.title, &self.title)
    }
}
