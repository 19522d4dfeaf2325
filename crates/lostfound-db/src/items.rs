//! Item repository implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use lostfound_core::{
    new_v7, Claim, Error, Item, ItemFilter, ItemRepository, MatchQuery, ModerationStatus,
    ModerationUpdate, NewClaim, NewItem, ResolvedBy, Result,
};

use crate::escape_like;

const ITEM_COLUMNS: &str = "id, title, description, category, item_type, location, item_date, \
     contact_info, school_id, image_url, images, status, found_by_security, security_note, \
     submitted_by, submitted_at, moderated_by, moderated_at, resolved, resolved_by, resolved_at, \
     user_email, phone";

/// PostgreSQL implementation of ItemRepository.
#[derive(Clone)]
pub struct PgItemRepository {
    pool: Pool<Postgres>,
}

impl PgItemRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Run a SELECT over `item` and attach claims.
    async fn select_items(&self, sql: &str, params: Vec<String>) -> Result<Vec<Item>> {
        let mut q = sqlx::query(sql);
        for p in params {
            q = q.bind(p);
        }
        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;
        let mut items = rows.iter().map(parse_item_row).collect::<Result<Vec<_>>>()?;
        self.attach_claims(&mut items).await?;
        Ok(items)
    }

    /// Batch-load claims for a page of items in one query.
    async fn attach_claims(&self, items: &mut [Item]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
        let rows = sqlx::query(
            "SELECT item_id, roll_no, name, email, claimed_at
             FROM item_claim
             WHERE item_id = ANY($1)
             ORDER BY claimed_at, id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut by_item: HashMap<Uuid, Vec<Claim>> = HashMap::new();
        for row in rows {
            by_item.entry(row.get("item_id")).or_default().push(Claim {
                roll_no: row.get("roll_no"),
                name: row.get("name"),
                email: row.get("email"),
                claimed_at: row.get("claimed_at"),
            });
        }
        for item in items.iter_mut() {
            item.claims = by_item.remove(&item.id).unwrap_or_default();
        }
        Ok(())
    }
}

fn parse_item_row(row: &PgRow) -> Result<Item> {
    let item_type: String = row.get("item_type");
    let status: String = row.get("status");
    let resolved_by: Option<String> = row.get("resolved_by");

    Ok(Item {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        category: row.get("category"),
        item_type: item_type.parse()?,
        location: row.get("location"),
        date: row.get("item_date"),
        contact_info: row.get("contact_info"),
        school_id: row.get("school_id"),
        image_url: row.get("image_url"),
        images: row.get("images"),
        status: status.parse()?,
        found_by_security: row.get("found_by_security"),
        security_note: row.get("security_note"),
        submitted_by: row.get("submitted_by"),
        submitted_at: row.get("submitted_at"),
        moderated_by: row.get("moderated_by"),
        moderated_at: row.get("moderated_at"),
        resolved: row.get("resolved"),
        resolved_by: resolved_by.map(|r| r.parse()).transpose()?,
        resolved_at: row.get("resolved_at"),
        user_email: row.get("user_email"),
        phone: row.get("phone"),
        claims: Vec::new(),
    })
}

/// Translate a listing filter into a WHERE clause with positional parameters.
fn filter_clause(filter: &ItemFilter) -> (String, Vec<String>) {
    const SEARCH_FIELDS: [&str; 5] = [
        "title",
        "description",
        "location",
        "user_email",
        "submitted_by",
    ];

    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<String> = Vec::new();

    let push_search = |clauses: &mut Vec<String>, params: &mut Vec<String>, needle: &str| {
        params.push(format!("%{}%", escape_like(needle)));
        let idx = params.len();
        let any = SEARCH_FIELDS
            .iter()
            .map(|f| format!(r"{} ILIKE ${} ESCAPE '\'", f, idx))
            .collect::<Vec<_>>()
            .join(" OR ");
        clauses.push(format!("({})", any));
    };

    if let (Some(search), Some(email)) = (&filter.search, &filter.user_email) {
        params.push(email.clone());
        clauses.push(format!("user_email = ${}", params.len()));
        push_search(&mut clauses, &mut params, search);
        return (clauses.join(" AND "), params);
    }

    clauses.push("status = 'approved'".to_string());
    if let Some(kind) = filter.item_type {
        params.push(kind.as_str().to_string());
        clauses.push(format!("item_type = ${}", params.len()));
    }
    if let Some(location) = &filter.location {
        params.push(format!("%{}%", escape_like(location)));
        clauses.push(format!(r"location ILIKE ${} ESCAPE '\'", params.len()));
    }
    if let Some(category) = &filter.category {
        params.push(category.clone());
        clauses.push(format!("category = ${}", params.len()));
    }
    if let Some(search) = &filter.search {
        push_search(&mut clauses, &mut params, search);
    }
    if let Some(email) = &filter.user_email {
        params.push(email.clone());
        clauses.push(format!("user_email = ${}", params.len()));
    }
    (clauses.join(" AND "), params)
}

#[async_trait]
impl ItemRepository for PgItemRepository {
    async fn insert(&self, new_item: NewItem) -> Result<Item> {
        let id = new_v7();
        let now: DateTime<Utc> = Utc::now();
        let item = new_item.into_item(id, now);

        sqlx::query(
            "INSERT INTO item (id, title, description, category, item_type, location, item_date,
                               contact_info, school_id, image_url, images, status,
                               found_by_security, submitted_by, submitted_at, resolved,
                               user_email, phone)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, false, $13, $14, false,
                     $15, $16)",
        )
        .bind(item.id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(&item.category)
        .bind(item.item_type.as_str())
        .bind(&item.location)
        .bind(item.date)
        .bind(&item.contact_info)
        .bind(&item.school_id)
        .bind(&item.image_url)
        .bind(&item.images)
        .bind(item.status.as_str())
        .bind(&item.submitted_by)
        .bind(item.submitted_at)
        .bind(&item.user_email)
        .bind(&item.phone)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(item_id = %id, item_type = %item.item_type, "Item inserted");
        Ok(item)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {} FROM item WHERE id = $1", ITEM_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut items = vec![parse_item_row(&row)?];
        self.attach_claims(&mut items).await?;
        Ok(items.pop())
    }

    async fn list(&self, filter: ItemFilter) -> Result<Vec<Item>> {
        let (clause, params) = filter_clause(&filter);
        let sql = format!(
            "SELECT {} FROM item WHERE {} ORDER BY submitted_at DESC, id DESC",
            ITEM_COLUMNS, clause
        );
        self.select_items(&sql, params).await
    }

    async fn list_all(&self) -> Result<Vec<Item>> {
        let sql = format!(
            "SELECT {} FROM item ORDER BY submitted_at DESC, id DESC",
            ITEM_COLUMNS
        );
        self.select_items(&sql, Vec::new()).await
    }

    async fn categories(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT category FROM item ORDER BY category")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(rows.iter().map(|r| r.get("category")).collect())
    }

    async fn moderate(
        &self,
        id: Uuid,
        update: ModerationUpdate,
    ) -> Result<Option<(Item, ModerationStatus)>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let previous: Option<String> =
            sqlx::query_scalar("SELECT status FROM item WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Error::Database)?;
        let Some(previous) = previous else {
            return Ok(None);
        };
        let previous: ModerationStatus = previous.parse()?;

        sqlx::query(
            "UPDATE item SET status = $2, moderated_by = $3, moderated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(update.status.as_str())
        .bind(&update.moderated_by)
        .bind(update.moderated_at)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        Ok(self.fetch(id).await?.map(|item| (item, previous)))
    }

    async fn resolve(&self, id: Uuid, by: ResolvedBy) -> Result<Option<Item>> {
        let result = sqlx::query(
            "UPDATE item SET resolved = true, resolved_by = $2, resolved_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(by.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch(id).await
    }

    async fn set_security_flag(
        &self,
        id: Uuid,
        found: bool,
        note: String,
    ) -> Result<Option<(Item, bool)>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let previous: Option<bool> =
            sqlx::query_scalar("SELECT found_by_security FROM item WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Error::Database)?;
        let Some(previous) = previous else {
            return Ok(None);
        };

        sqlx::query("UPDATE item SET found_by_security = $2, security_note = $3 WHERE id = $1")
            .bind(id)
            .bind(found)
            .bind(&note)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        Ok(self.fetch(id).await?.map(|item| (item, previous)))
    }

    async fn add_claim(&self, id: Uuid, claim: NewClaim) -> Result<Option<Item>> {
        let result = sqlx::query(
            "INSERT INTO item_claim (id, item_id, roll_no, name, email, claimed_at)
             SELECT $1, $2, $3, $4, $5, $6
             WHERE EXISTS (SELECT 1 FROM item WHERE id = $2)",
        )
        .bind(new_v7())
        .bind(id)
        .bind(&claim.roll_no)
        .bind(&claim.name)
        .bind(&claim.email)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch(id).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM item WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_matches(&self, query: &MatchQuery) -> Result<Vec<Item>> {
        let title = query.title.trim();
        if title.is_empty() {
            return Ok(Vec::new());
        }

        // Either title may contain the other; the stored title is escaped in
        // SQL so neither side is read as a pattern.
        let sql = format!(
            r"SELECT {} FROM item
              WHERE item_type = $1
                AND status = 'approved'
                AND resolved = false
                AND ($2::uuid IS NULL OR id <> $2)
                AND btrim(title) <> ''
                AND (title ILIKE $3 ESCAPE '\'
                     OR $4 ILIKE ('%' || replace(replace(replace(btrim(title), '\', '\\'),
                                                         '%', '\%'), '_', '\_') || '%') ESCAPE '\')
              ORDER BY submitted_at DESC, id DESC",
            ITEM_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(query.target_type.as_str())
            .bind(query.exclude_id)
            .bind(format!("%{}%", escape_like(title)))
            .bind(title)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let mut items = rows.iter().map(parse_item_row).collect::<Result<Vec<_>>>()?;
        self.attach_claims(&mut items).await?;
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lostfound_core::ItemType;

    #[test]
    fn test_default_filter_is_approved_only() {
        let (clause, params) = filter_clause(&ItemFilter::default());
        assert_eq!(clause, "status = 'approved'");
        assert!(params.is_empty());
    }

    #[test]
    fn test_filter_params_are_positional() {
        let filter = ItemFilter {
            item_type: Some(ItemType::Lost),
            location: Some("lib_1".to_string()),
            category: Some("Books".to_string()),
            ..Default::default()
        };
        let (clause, params) = filter_clause(&filter);
        assert!(clause.contains("item_type = $1"));
        assert!(clause.contains(r"location ILIKE $2 ESCAPE '\'"));
        assert!(clause.contains("category = $3"));
        assert_eq!(params, vec!["lost", r"%lib\_1%", "Books"]);
    }

    #[test]
    fn test_owner_search_drops_status_filter() {
        let filter = ItemFilter {
            item_type: Some(ItemType::Found),
            search: Some("wallet".to_string()),
            user_email: Some("a@b.edu".to_string()),
            ..Default::default()
        };
        let (clause, params) = filter_clause(&filter);
        assert!(!clause.contains("status"));
        assert!(!clause.contains("item_type"));
        assert!(clause.starts_with("user_email = $1"));
        assert!(clause.contains("submitted_by ILIKE $2"));
        assert_eq!(params, vec!["a@b.edu", "%wallet%"]);
    }
}
