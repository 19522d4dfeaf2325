//! In-process repositories backed by `tokio::sync::RwLock` maps.
//!
//! Semantics follow the PostgreSQL repositories; listing and matching reuse
//! the predicates on [`ItemFilter`] and [`MatchQuery`] directly. Used for
//! `STORE_BACKEND=memory` and for handler tests.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use lostfound_core::{
    defaults, new_v7, Claim, Item, ItemFilter, ItemRepository, MatchQuery, ModerationStatus,
    ModerationUpdate, NewClaim, NewItem, OtpCheck, OtpRepository, ResolvedBy, Result, Session,
    SessionRepository, SessionRole,
};

use crate::secrets::{generate_session_token, hash_secret};

fn newest_first(items: &mut [Item]) {
    items.sort_by(|a, b| {
        b.submitted_at
            .cmp(&a.submitted_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

// =============================================================================
// ITEMS
// =============================================================================

#[derive(Default)]
pub struct MemoryItemRepository {
    items: RwLock<HashMap<Uuid, Item>>,
}

impl MemoryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ItemRepository for MemoryItemRepository {
    async fn insert(&self, new_item: NewItem) -> Result<Item> {
        let item = new_item.into_item(new_v7(), Utc::now());
        self.items.write().await.insert(item.id, item.clone());
        Ok(item)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Item>> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: ItemFilter) -> Result<Vec<Item>> {
        let mut items: Vec<Item> = self
            .items
            .read()
            .await
            .values()
            .filter(|item| filter.admits(item))
            .cloned()
            .collect();
        newest_first(&mut items);
        Ok(items)
    }

    async fn list_all(&self) -> Result<Vec<Item>> {
        let mut items: Vec<Item> = self.items.read().await.values().cloned().collect();
        newest_first(&mut items);
        Ok(items)
    }

    async fn categories(&self) -> Result<Vec<String>> {
        let set: BTreeSet<String> = self
            .items
            .read()
            .await
            .values()
            .map(|item| item.category.clone())
            .collect();
        Ok(set.into_iter().collect())
    }

    async fn moderate(
        &self,
        id: Uuid,
        update: ModerationUpdate,
    ) -> Result<Option<(Item, ModerationStatus)>> {
        let mut items = self.items.write().await;
        let Some(item) = items.get_mut(&id) else {
            return Ok(None);
        };
        let previous = item.status;
        item.status = update.status;
        item.moderated_by = Some(update.moderated_by);
        item.moderated_at = Some(update.moderated_at);
        Ok(Some((item.clone(), previous)))
    }

    async fn resolve(&self, id: Uuid, by: ResolvedBy) -> Result<Option<Item>> {
        let mut items = self.items.write().await;
        let Some(item) = items.get_mut(&id) else {
            return Ok(None);
        };
        item.resolved = true;
        item.resolved_by = Some(by);
        item.resolved_at = Some(Utc::now());
        Ok(Some(item.clone()))
    }

    async fn set_security_flag(
        &self,
        id: Uuid,
        found: bool,
        note: String,
    ) -> Result<Option<(Item, bool)>> {
        let mut items = self.items.write().await;
        let Some(item) = items.get_mut(&id) else {
            return Ok(None);
        };
        let previous = item.found_by_security;
        item.found_by_security = found;
        item.security_note = Some(note);
        Ok(Some((item.clone(), previous)))
    }

    async fn add_claim(&self, id: Uuid, claim: NewClaim) -> Result<Option<Item>> {
        let mut items = self.items.write().await;
        let Some(item) = items.get_mut(&id) else {
            return Ok(None);
        };
        item.claims.push(Claim {
            roll_no: claim.roll_no,
            name: claim.name,
            email: claim.email,
            claimed_at: Utc::now(),
        });
        Ok(Some(item.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.items.write().await.remove(&id).is_some())
    }

    async fn find_matches(&self, query: &MatchQuery) -> Result<Vec<Item>> {
        let mut items: Vec<Item> = self
            .items
            .read()
            .await
            .values()
            .filter(|item| query.admits(item))
            .cloned()
            .collect();
        newest_first(&mut items);
        Ok(items)
    }
}

// =============================================================================
// OTPS
// =============================================================================

struct OtpEntry {
    code_hash: String,
    expires_at: DateTime<Utc>,
    attempts: i32,
}

#[derive(Default)]
pub struct MemoryOtpRepository {
    codes: RwLock<HashMap<String, OtpEntry>>,
}

impl MemoryOtpRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OtpRepository for MemoryOtpRepository {
    async fn replace(
        &self,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.codes.write().await.insert(
            email.to_string(),
            OtpEntry {
                code_hash: code_hash.to_string(),
                expires_at,
                attempts: 0,
            },
        );
        Ok(())
    }

    async fn verify(&self, email: &str, code_hash: &str, now: DateTime<Utc>) -> Result<OtpCheck> {
        let mut codes = self.codes.write().await;
        let Some(entry) = codes.get_mut(email) else {
            return Ok(OtpCheck::Missing);
        };

        if entry.expires_at <= now {
            codes.remove(email);
            return Ok(OtpCheck::Expired);
        }
        if entry.attempts >= defaults::OTP_MAX_ATTEMPTS {
            codes.remove(email);
            return Ok(OtpCheck::Exhausted);
        }
        if entry.code_hash == code_hash {
            return Ok(OtpCheck::Valid);
        }
        entry.attempts += 1;
        Ok(OtpCheck::Invalid)
    }

    async fn clear(&self, email: &str) -> Result<()> {
        self.codes.write().await.remove(email);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut codes = self.codes.write().await;
        let before = codes.len();
        codes.retain(|_, entry| entry.expires_at > now);
        Ok((before - codes.len()) as u64)
    }
}

// =============================================================================
// SESSIONS
// =============================================================================

#[derive(Default)]
pub struct MemorySessionRepository {
    /// Keyed by token hash.
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn create(
        &self,
        role: SessionRole,
        subject: &str,
        ttl: Duration,
    ) -> Result<(String, Session)> {
        let token = generate_session_token();
        let now = Utc::now();
        let session = Session {
            id: new_v7(),
            role,
            subject: subject.to_string(),
            created_at: now,
            expires_at: now + ttl,
        };
        self.sessions
            .write()
            .await
            .insert(hash_secret(&token), session.clone());
        Ok((token, session))
    }

    async fn validate(&self, token: &str) -> Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(&hash_secret(token))
            .filter(|s| s.expires_at > Utc::now())
            .cloned())
    }

    async fn revoke(&self, token: &str) -> Result<()> {
        self.sessions.write().await.remove(&hash_secret(token));
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::sample_new_item;
    use lostfound_core::ItemType;

    async fn approve(repo: &MemoryItemRepository, id: Uuid) {
        repo.moderate(
            id,
            ModerationUpdate {
                status: ModerationStatus::Approved,
                moderated_by: "Admin".to_string(),
                moderated_at: Utc::now(),
            },
        )
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test]
    async fn test_insert_starts_pending() {
        let repo = MemoryItemRepository::new();
        let item = repo
            .insert(sample_new_item(ItemType::Lost, "Red scarf", "a@x.edu"))
            .await
            .unwrap();

        assert_eq!(item.status, ModerationStatus::Pending);
        assert!(repo.list(ItemFilter::default()).await.unwrap().is_empty());
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_moderate_reports_previous_status() {
        let repo = MemoryItemRepository::new();
        let item = repo
            .insert(sample_new_item(ItemType::Found, "Keys", "a@x.edu"))
            .await
            .unwrap();

        let update = ModerationUpdate {
            status: ModerationStatus::Approved,
            moderated_by: "Dana".to_string(),
            moderated_at: Utc::now(),
        };
        let (updated, prev) = repo.moderate(item.id, update.clone()).await.unwrap().unwrap();
        assert_eq!(prev, ModerationStatus::Pending);
        assert_eq!(updated.moderated_by.as_deref(), Some("Dana"));

        let (_, prev) = repo.moderate(item.id, update).await.unwrap().unwrap();
        assert_eq!(prev, ModerationStatus::Approved);

        assert!(repo
            .moderate(Uuid::nil(), ModerationUpdate {
                status: ModerationStatus::Rejected,
                moderated_by: "Dana".to_string(),
                moderated_at: Utc::now(),
            })
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_find_matches_applies_query() {
        let repo = MemoryItemRepository::new();
        let lost = repo
            .insert(sample_new_item(ItemType::Lost, "Black Wallet", "owner@x.edu"))
            .await
            .unwrap();
        let found = repo
            .insert(sample_new_item(ItemType::Found, "wallet", "finder@x.edu"))
            .await
            .unwrap();
        let pending = repo
            .insert(sample_new_item(ItemType::Found, "wallet", "other@x.edu"))
            .await
            .unwrap();
        approve(&repo, lost.id).await;
        approve(&repo, found.id).await;

        let lost = repo.fetch(lost.id).await.unwrap().unwrap();
        let matches = repo.find_matches(&MatchQuery::for_trigger(&lost)).await.unwrap();
        let ids: Vec<Uuid> = matches.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![found.id]);
        assert!(!ids.contains(&pending.id));

        repo.resolve(found.id, ResolvedBy::Admin).await.unwrap();
        let matches = repo.find_matches(&MatchQuery::for_trigger(&lost)).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_security_flag_and_claims() {
        let repo = MemoryItemRepository::new();
        let item = repo
            .insert(sample_new_item(ItemType::Lost, "Laptop", "a@x.edu"))
            .await
            .unwrap();

        let (updated, prev) = repo
            .set_security_flag(item.id, true, "At front desk".to_string())
            .await
            .unwrap()
            .unwrap();
        assert!(!prev);
        assert!(updated.found_by_security);
        assert_eq!(updated.security_note.as_deref(), Some("At front desk"));

        let claimed = repo
            .add_claim(
                item.id,
                NewClaim {
                    roll_no: Some("21CS042".to_string()),
                    name: "Ira".to_string(),
                    email: "ira@x.edu".to_string(),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.claims.len(), 1);
        assert_eq!(claimed.claims[0].name, "Ira");
    }

    #[tokio::test]
    async fn test_categories_distinct_sorted() {
        let repo = MemoryItemRepository::new();
        for (title, category) in [("a", "Keys"), ("b", "Books"), ("c", "Keys")] {
            let mut new_item = sample_new_item(ItemType::Lost, title, "a@x.edu");
            new_item.category = category.to_string();
            repo.insert(new_item).await.unwrap();
        }
        assert_eq!(repo.categories().await.unwrap(), vec!["Books", "Keys"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = MemoryItemRepository::new();
        let item = repo
            .insert(sample_new_item(ItemType::Lost, "Bottle", "a@x.edu"))
            .await
            .unwrap();
        assert!(repo.delete(item.id).await.unwrap());
        assert!(!repo.delete(item.id).await.unwrap());
        assert!(repo.fetch(item.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_otp_lifecycle() {
        let repo = MemoryOtpRepository::new();
        let now = Utc::now();
        let email = "s@x.edu";

        assert_eq!(repo.verify(email, "h", now).await.unwrap(), OtpCheck::Missing);

        repo.replace(email, "h1", now + Duration::minutes(5)).await.unwrap();
        repo.replace(email, "h2", now + Duration::minutes(5)).await.unwrap();
        assert_eq!(repo.verify(email, "h1", now).await.unwrap(), OtpCheck::Invalid);
        assert_eq!(repo.verify(email, "h2", now).await.unwrap(), OtpCheck::Valid);

        let later = now + Duration::minutes(6);
        assert_eq!(repo.verify(email, "h2", later).await.unwrap(), OtpCheck::Expired);
        assert_eq!(repo.verify(email, "h2", now).await.unwrap(), OtpCheck::Missing);
    }

    #[tokio::test]
    async fn test_otp_attempt_limit() {
        let repo = MemoryOtpRepository::new();
        let now = Utc::now();
        repo.replace("s@x.edu", "good", now + Duration::minutes(5))
            .await
            .unwrap();

        for _ in 0..defaults::OTP_MAX_ATTEMPTS {
            assert_eq!(
                repo.verify("s@x.edu", "bad", now).await.unwrap(),
                OtpCheck::Invalid
            );
        }
        assert_eq!(
            repo.verify("s@x.edu", "good", now).await.unwrap(),
            OtpCheck::Exhausted
        );
    }

    #[tokio::test]
    async fn test_otp_purge() {
        let repo = MemoryOtpRepository::new();
        let now = Utc::now();
        repo.replace("old@x.edu", "h", now - Duration::seconds(1)).await.unwrap();
        repo.replace("new@x.edu", "h", now + Duration::minutes(5)).await.unwrap();
        assert_eq!(repo.purge_expired(now).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let repo = MemorySessionRepository::new();
        let (token, session) = repo
            .create(SessionRole::Admin, "admin", Duration::hours(2))
            .await
            .unwrap();

        let found = repo.validate(&token).await.unwrap().unwrap();
        assert_eq!(found, session);
        assert!(repo.validate("lf_at_unknown").await.unwrap().is_none());

        repo.revoke(&token).await.unwrap();
        assert!(repo.validate(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected_and_purged() {
        let repo = MemorySessionRepository::new();
        let (token, _) = repo
            .create(SessionRole::User, "s@x.edu", Duration::seconds(-1))
            .await
            .unwrap();
        assert!(repo.validate(&token).await.unwrap().is_none());
        assert_eq!(repo.purge_expired().await.unwrap(), 1);
    }
}
