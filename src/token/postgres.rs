//! Postgres-backed token store and user directory.
//!
//! Raw tokens never touch the database; only SHA-256 hashes are stored, and
//! email-token consumption is a single `UPDATE ... RETURNING`, so two
//! concurrent submissions cannot both observe a valid token. The schema
//! these queries expect lives in `db/sql/ensaluto.sql`.

use super::{generate_token, hash_token, TokenConsumption, TokenStore, VerificationIntent};
use crate::directory::{AccountStatus, User, UserDirectory};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

fn ttl_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

/// [`TokenStore`] over a `PostgreSQL` pool.
#[derive(Clone, Debug)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn create_email_token(
        &self,
        user_id: Uuid,
        intent: VerificationIntent,
        ttl: Duration,
    ) -> Result<String> {
        let token = generate_token()?;
        let token_hash = hash_token(&token);

        let query = r"
            INSERT INTO email_tokens (user_id, token_hash, intent, expires_at)
            VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(&token_hash)
            .bind(intent.as_str())
            .bind(ttl_seconds(ttl))
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert email token")?;

        Ok(token)
    }

    async fn consume_email_token(&self, token: &str) -> Result<TokenConsumption> {
        let token_hash = hash_token(token);
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin email token transaction")?;

        let query = r"
            UPDATE email_tokens
            SET consumed_at = NOW()
            WHERE token_hash = $1
              AND consumed_at IS NULL
              AND expires_at > NOW()
            RETURNING user_id, intent
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&token_hash)
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await
            .context("failed to consume email token")?;

        if let Some(row) = row {
            tx.commit().await.context("commit email token consume")?;
            let intent: String = row.get("intent");
            return Ok(VerificationIntent::from_str(&intent).map_or(
                TokenConsumption::Invalid,
                |intent| TokenConsumption::Valid {
                    user_id: row.get("user_id"),
                    intent,
                },
            ));
        }

        // Expiry wins over consumption state, so an expired token reports
        // `Expired` no matter how often it was presented before.
        let query = r"
            SELECT 1 AS present
            FROM email_tokens
            WHERE token_hash = $1
              AND expires_at <= NOW()
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let expired = sqlx::query(query)
            .bind(&token_hash)
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await
            .context("failed to check email token expiry")?;
        tx.commit().await.context("commit email token check")?;

        if expired.is_some() {
            Ok(TokenConsumption::Expired)
        } else {
            Ok(TokenConsumption::Invalid)
        }
    }

    async fn create_auth_token(&self, user_id: Uuid, ttl: Duration) -> Result<String> {
        let token = generate_token()?;
        let token_hash = hash_token(&token);
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin auth token transaction")?;

        // One live token per user.
        let query = "DELETE FROM auth_tokens WHERE user_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to invalidate previous auth tokens")?;

        let query = r"
            INSERT INTO auth_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(&token_hash)
            .bind(ttl_seconds(ttl))
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert auth token")?;

        tx.commit().await.context("commit auth token insert")?;
        Ok(token)
    }

    async fn consume_auth_token(&self, token: &str) -> Result<Option<Uuid>> {
        let token_hash = hash_token(token);
        let query = r"
            DELETE FROM auth_tokens
            WHERE token_hash = $1
              AND expires_at > NOW()
            RETURNING user_id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume auth token")?;

        Ok(row.map(|row| row.get("user_id")))
    }

    async fn invalidate_auth_tokens(&self, user_id: Uuid) -> Result<()> {
        let query = "DELETE FROM auth_tokens WHERE user_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to invalidate auth tokens")?;
        Ok(())
    }
}

/// [`UserDirectory`] over a `PostgreSQL` pool.
#[derive(Clone, Debug)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> Result<User> {
    let status: String = row.get("status");
    let status = AccountStatus::from_str(&status)
        .with_context(|| format!("unknown account status: {status}"))?;
    Ok(User::new(row.get("id"), row.get::<String, _>("login"), status))
}

#[async_trait]
impl UserDirectory for PgDirectory {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<User>> {
        let query = "SELECT id, login, status::text AS status FROM users WHERE login = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(identity)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by identity")?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = "SELECT id, login, status::text AS status FROM users WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by id")?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn mfa_identity(&self, user_id: Uuid, provider: &str) -> Result<Option<String>> {
        let query = r"
            SELECT identity
            FROM mfa_identities
            WHERE user_id = $1
              AND provider = $2
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(provider)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup mfa identity")?;

        Ok(row.map(|row| row.get("identity")))
    }
}
