//! Bearer session repository.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use lostfound_core::{new_v7, Error, Result, Session, SessionRepository, SessionRole};

use crate::secrets::{generate_session_token, hash_secret};

/// PostgreSQL implementation of SessionRepository.
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: Pool<Postgres>,
}

impl PgSessionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
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

        sqlx::query(
            "INSERT INTO session_token (id, token_hash, role, subject, created_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(session.id)
        .bind(hash_secret(&token))
        .bind(role.as_str())
        .bind(&session.subject)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(session_id = %session.id, role = role.as_str(), "Session created");
        Ok((token, session))
    }

    async fn validate(&self, token: &str) -> Result<Option<Session>> {
        let row = sqlx::query(
            "UPDATE session_token SET last_used_at = now()
             WHERE token_hash = $1 AND expires_at > now()
             RETURNING id, role, subject, created_at, expires_at",
        )
        .bind(hash_secret(token))
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let role: String = row.get("role");
        Ok(Some(Session {
            id: row.get("id"),
            role: role.parse()?,
            subject: row.get("subject"),
            created_at: row.get("created_at"),
            expires_at: row.get("expires_at"),
        }))
    }

    async fn revoke(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM session_token WHERE token_hash = $1")
            .bind(hash_secret(token))
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM session_token WHERE expires_at <= now()")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
