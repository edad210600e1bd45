//! Account and session persistence
//!
//! Both stores are traits so the service can run against the in-memory
//! implementations (tests, development) or PostgreSQL (production).

mod memory;
mod postgres;

pub use memory::{MemoryAccountStore, MemorySessionStore};
pub use postgres::{ensure_schema, PgAccountStore, PgSessionStore};

use super::models::{Session, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Email already exists")]
    EmailAlreadyExists,
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::EmailAlreadyExists,
            _ => Self::DatabaseError(err.to_string()),
        }
    }
}

/// User account persistence
///
/// Email uniqueness is enforced here as well as in the service, so two
/// concurrent registrations for one address cannot both succeed.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new user; `EmailAlreadyExists` on a case-insensitive clash
    async fn create(&self, user: User) -> Result<User, RepositoryError>;

    /// Case-insensitive lookup
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;

    /// Replace the stored profile fields with those of `user`; `UserNotFound` if absent.
    /// `last_login_at` is left as stored.
    async fn update(&self, user: &User) -> Result<User, RepositoryError>;

    /// Stamp `last_login_at` and `updated_at` on an active user.
    ///
    /// Returns `None` when the user is missing or deactivated. No other
    /// field is written.
    async fn record_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError>;

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;
}

/// Refresh token session persistence, keyed by token hash
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, RepositoryError>;

    /// Only returns sessions that are neither expired nor revoked
    async fn find_by_token(&self, token_hash: &str) -> Result<Option<Session>, RepositoryError>;

    /// Atomically revoke a valid session and return it.
    ///
    /// Of any number of concurrent callers presenting the same hash, at
    /// most one receives `Some`.
    async fn consume(&self, token_hash: &str) -> Result<Option<Session>, RepositoryError>;

    /// Revoke a session. Unknown or already revoked hashes are not an error.
    async fn revoke(&self, token_hash: &str) -> Result<(), RepositoryError>;

    /// Revoke every session of a user, returning how many were live
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, RepositoryError>;

    /// Remove expired and revoked sessions, returning how many were removed
    async fn sweep_expired(&self) -> Result<u64, RepositoryError>;
}
