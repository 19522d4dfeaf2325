//! Core traits for the lost & found abstractions.
//!
//! Handlers depend on these traits rather than on a concrete store, so the
//! PostgreSQL and in-memory backends are interchangeable.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::matching::{contains_ci, MatchQuery};
use crate::models::*;

// =============================================================================
// ITEM REPOSITORY
// =============================================================================

/// Public listing filter.
///
/// Without an owner search, only approved items are listed and every
/// supplied field narrows the result. When both `search` and `user_email`
/// are given the filter switches to the owner view: that owner's items of any
/// status whose text matches `search`, with the other fields ignored.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub item_type: Option<ItemType>,
    /// Case-insensitive substring of the location.
    pub location: Option<String>,
    /// Exact category.
    pub category: Option<String>,
    /// Case-insensitive substring of title, description, location, email or
    /// submitter name.
    pub search: Option<String>,
    pub user_email: Option<String>,
}

impl ItemFilter {
    /// True when the owner view applies.
    pub fn is_owner_search(&self) -> bool {
        self.search.is_some() && self.user_email.is_some()
    }

    /// In-process evaluation of the filter. The PostgreSQL repository encodes
    /// the same predicate in SQL.
    pub fn admits(&self, item: &Item) -> bool {
        if let (Some(search), Some(email)) = (&self.search, &self.user_email) {
            return item.user_email == *email && Self::search_matches(item, search);
        }

        if item.status != ModerationStatus::Approved {
            return false;
        }
        if let Some(kind) = self.item_type {
            if item.item_type != kind {
                return false;
            }
        }
        if let Some(location) = &self.location {
            if !contains_ci(&item.location, location) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if item.category != *category {
                return false;
            }
        }
        if let Some(search) = &self.search {
            if !Self::search_matches(item, search) {
                return false;
            }
        }
        if let Some(email) = &self.user_email {
            if item.user_email != *email {
                return false;
            }
        }
        true
    }

    fn search_matches(item: &Item, needle: &str) -> bool {
        [
            &item.title,
            &item.description,
            &item.location,
            &item.user_email,
            &item.submitted_by,
        ]
        .iter()
        .any(|field| contains_ci(field, needle))
    }
}

/// Repository for item reports.
///
/// Mutating methods return `None` when the item does not exist.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Insert a new pending item.
    async fn insert(&self, item: NewItem) -> Result<Item>;

    /// Fetch an item with its claims.
    async fn fetch(&self, id: Uuid) -> Result<Option<Item>>;

    /// Public listing, newest submission first.
    async fn list(&self, filter: ItemFilter) -> Result<Vec<Item>>;

    /// Every item regardless of status, newest submission first.
    async fn list_all(&self) -> Result<Vec<Item>>;

    /// Distinct categories in use, sorted.
    async fn categories(&self) -> Result<Vec<String>>;

    /// Set moderation fields. Returns the updated item and the status it had
    /// before the update.
    async fn moderate(
        &self,
        id: Uuid,
        update: ModerationUpdate,
    ) -> Result<Option<(Item, ModerationStatus)>>;

    /// Mark an item resolved now.
    async fn resolve(&self, id: Uuid, by: ResolvedBy) -> Result<Option<Item>>;

    /// Set the found-by-security flag and note. Returns the updated item and
    /// the previous flag.
    async fn set_security_flag(
        &self,
        id: Uuid,
        found: bool,
        note: String,
    ) -> Result<Option<(Item, bool)>>;

    /// Append a claim.
    async fn add_claim(&self, id: Uuid, claim: NewClaim) -> Result<Option<Item>>;

    /// Delete an item and its claims. Returns whether it existed.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Items that could answer a trigger item.
    async fn find_matches(&self, query: &MatchQuery) -> Result<Vec<Item>>;
}

// =============================================================================
// OTP REPOSITORY
// =============================================================================

/// Repository for one-time login codes. Codes are passed in already hashed.
#[async_trait]
pub trait OtpRepository: Send + Sync {
    /// Drop any outstanding code for `email` and store a new one.
    async fn replace(&self, email: &str, code_hash: &str, expires_at: DateTime<Utc>)
        -> Result<()>;

    /// Check a code, counting failed attempts.
    async fn verify(&self, email: &str, code_hash: &str, now: DateTime<Utc>) -> Result<OtpCheck>;

    /// Remove every code for `email`.
    async fn clear(&self, email: &str) -> Result<()>;

    /// Remove codes expired at `now`. Returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

// =============================================================================
// SESSION REPOSITORY
// =============================================================================

/// Repository for opaque bearer sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Issue a session. Returns the plaintext token (shown once) and the
    /// stored session.
    async fn create(&self, role: SessionRole, subject: &str, ttl: Duration)
        -> Result<(String, Session)>;

    /// Look up a live session by plaintext token.
    async fn validate(&self, token: &str) -> Result<Option<Session>>;

    /// Revoke a session. Unknown tokens are ignored.
    async fn revoke(&self, token: &str) -> Result<()>;

    /// Remove expired sessions. Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}
