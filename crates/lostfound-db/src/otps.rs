//! One-time login code repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use lostfound_core::{defaults, Error, OtpCheck, OtpRepository, Result};

/// PostgreSQL implementation of OtpRepository.
///
/// One row per email; issuing a new code overwrites the previous one and
/// resets the attempt counter.
#[derive(Clone)]
pub struct PgOtpRepository {
    pool: Pool<Postgres>,
}

impl PgOtpRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtpRepository for PgOtpRepository {
    async fn replace(
        &self,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO otp_code (email, code_hash, expires_at, attempts, created_at)
             VALUES ($1, $2, $3, 0, $4)
             ON CONFLICT (email) DO UPDATE
             SET code_hash = EXCLUDED.code_hash,
                 expires_at = EXCLUDED.expires_at,
                 attempts = 0,
                 created_at = EXCLUDED.created_at",
        )
        .bind(email)
        .bind(code_hash)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn verify(&self, email: &str, code_hash: &str, now: DateTime<Utc>) -> Result<OtpCheck> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(
            "SELECT code_hash, expires_at, attempts FROM otp_code WHERE email = $1 FOR UPDATE",
        )
        .bind(email)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok(OtpCheck::Missing);
        };
        let stored_hash: String = row.get("code_hash");
        let expires_at: DateTime<Utc> = row.get("expires_at");
        let attempts: i32 = row.get("attempts");

        let check = if expires_at <= now {
            OtpCheck::Expired
        } else if attempts >= defaults::OTP_MAX_ATTEMPTS {
            OtpCheck::Exhausted
        } else if stored_hash == code_hash {
            OtpCheck::Valid
        } else {
            OtpCheck::Invalid
        };

        match check {
            OtpCheck::Expired | OtpCheck::Exhausted => {
                sqlx::query("DELETE FROM otp_code WHERE email = $1")
                    .bind(email)
                    .execute(&mut *tx)
                    .await
                    .map_err(Error::Database)?;
            }
            OtpCheck::Invalid => {
                sqlx::query("UPDATE otp_code SET attempts = attempts + 1 WHERE email = $1")
                    .bind(email)
                    .execute(&mut *tx)
                    .await
                    .map_err(Error::Database)?;
            }
            OtpCheck::Valid | OtpCheck::Missing => {}
        }

        tx.commit().await.map_err(Error::Database)?;
        debug!(?check, "OTP checked");
        Ok(check)
    }

    async fn clear(&self, email: &str) -> Result<()> {
        sqlx::query("DELETE FROM otp_code WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM otp_code WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
