//! PostgreSQL stores
//!
//! Sessions are flagged with `revoked_at` rather than deleted so that the
//! sweeper can remove them in bulk.

use super::{AccountStore, RepositoryError, SessionStore};
use crate::auth::models::{Session, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, is_active, created_at, updated_at, last_login_at";

const SESSION_COLUMNS: &str = "id, user_id, token_hash, expires_at, created_at, revoked_at";

/// Create the account and session tables if they do not exist
pub async fn ensure_schema(pool: &PgPool) -> Result<(), RepositoryError> {
    for statement in [
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            email TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            last_login_at TIMESTAMPTZ
        )
        "#,
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email_lower ON users (lower(email))",
        r#"
        CREATE TABLE IF NOT EXISTS refresh_tokens (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            token_hash TEXT NOT NULL UNIQUE,
            expires_at TIMESTAMPTZ NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            revoked_at TIMESTAMPTZ
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_expires ON refresh_tokens(expires_at)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// PostgreSQL account store
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let query = format!(
            r#"
            INSERT INTO users ({USER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {USER_COLUMNS}
            "#
        );

        let created = sqlx::query_as::<_, User>(&query)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.is_active)
            .bind(user.created_at)
            .bind(user.updated_at)
            .bind(user.last_login_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update(&self, user: &User) -> Result<User, RepositoryError> {
        let query = format!(
            r#"
            UPDATE users
            SET email = $2, password_hash = $3, first_name = $4, last_name = $5,
                is_active = $6, updated_at = $7
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.is_active)
            .bind(user.updated_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::UserNotFound)
    }

    async fn record_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError> {
        let query = format!(
            r#"
            UPDATE users SET last_login_at = $2, updated_at = $2
            WHERE id = $1 AND is_active
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// PostgreSQL session store
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, RepositoryError> {
        let session = Session::new(user_id, token_hash.to_string(), expires_at);
        let query = format!(
            r#"
            INSERT INTO refresh_tokens ({SESSION_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, NULL)
            RETURNING {SESSION_COLUMNS}
            "#
        );

        let created = sqlx::query_as::<_, Session>(&query)
            .bind(session.id)
            .bind(session.user_id)
            .bind(&session.token_hash)
            .bind(session.expires_at)
            .bind(session.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(created)
    }

    async fn find_by_token(&self, token_hash: &str) -> Result<Option<Session>, RepositoryError> {
        let query = format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM refresh_tokens
            WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > NOW()
            "#
        );
        let session = sqlx::query_as::<_, Session>(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn consume(&self, token_hash: &str) -> Result<Option<Session>, RepositoryError> {
        // A single conditional UPDATE: concurrent callers serialize on the row
        // lock and only the first sees `revoked_at IS NULL`.
        let query = format!(
            r#"
            UPDATE refresh_tokens SET revoked_at = NOW()
            WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > NOW()
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let session = sqlx::query_as::<_, Session>(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn revoke(&self, token_hash: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE token_hash = $1 AND revoked_at IS NULL",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked_at = NOW()
            WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > NOW()
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn sweep_expired(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM refresh_tokens WHERE expires_at <= NOW() OR revoked_at IS NOT NULL",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
