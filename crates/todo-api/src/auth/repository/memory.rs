//! In-memory stores backed by `RwLock<HashMap>`

use super::{AccountStore, RepositoryError, SessionStore};
use crate::auth::models::{Session, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory account store
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn email_taken(users: &HashMap<Uuid, User>, email: &str, except: Option<Uuid>) -> bool {
    users
        .values()
        .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        if email_taken(&users, &user.email, None) {
            return Err(RepositoryError::EmailAlreadyExists);
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn update(&self, user: &User) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        let last_login_at = users
            .get(&user.id)
            .ok_or(RepositoryError::UserNotFound)?
            .last_login_at;
        if email_taken(&users, &user.email, Some(user.id)) {
            return Err(RepositoryError::EmailAlreadyExists);
        }
        let stored = User {
            last_login_at,
            ..user.clone()
        };
        users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn record_login(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).filter(|u| u.is_active).map(|u| {
            u.last_login_at = Some(at);
            u.updated_at = at;
            u.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.users.write().await.remove(&id);
        Ok(())
    }
}

/// In-memory session store
///
/// Revocation removes the entry, so a revoked session and an unknown one
/// are indistinguishable to lookups.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, including expired ones not yet swept
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, RepositoryError> {
        let session = Session::new(user_id, token_hash.to_string(), expires_at);
        self.sessions
            .write()
            .await
            .insert(session.token_hash.clone(), session.clone());
        Ok(session)
    }

    async fn find_by_token(&self, token_hash: &str) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(token_hash).filter(|s| s.is_valid()).cloned())
    }

    async fn consume(&self, token_hash: &str) -> Result<Option<Session>, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        match sessions.remove(token_hash) {
            Some(mut session) if session.is_valid() => {
                session.revoked_at = Some(Utc::now());
                Ok(Some(session))
            }
            _ => Ok(None),
        }
    }

    async fn revoke(&self, token_hash: &str) -> Result<(), RepositoryError> {
        self.sessions.write().await.remove(token_hash);
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let mut live = 0;
        sessions.retain(|_, s| {
            if s.user_id != user_id {
                return true;
            }
            if s.is_valid() {
                live += 1;
            }
            false
        });
        Ok(live)
    }

    async fn sweep_expired(&self) -> Result<u64, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.is_valid());
        Ok((before - sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn user(email: &str) -> User {
        User::new(
            email.to_string(),
            "hash".to_string(),
            "Test".to_string(),
            "User".to_string(),
        )
    }

    #[tokio::test]
    async fn test_email_unique_case_insensitive() {
        let store = MemoryAccountStore::new();
        store.create(user("alice@example.com")).await.unwrap();

        let result = store.create(user("ALICE@example.com")).await;
        assert!(matches!(result, Err(RepositoryError::EmailAlreadyExists)));

        let found = store.find_by_email("Alice@Example.com").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let store = MemoryAccountStore::new();
        let result = store.update(&user("ghost@example.com")).await;
        assert!(matches!(result, Err(RepositoryError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_delete_user() {
        let store = MemoryAccountStore::new();
        let created = store.create(user("alice@example.com")).await.unwrap();

        store.delete(created.id).await.unwrap();
        assert!(store.find_by_id(created.id).await.unwrap().is_none());
        assert!(store
            .find_by_email("alice@example.com")
            .await
            .unwrap()
            .is_none());

        // Deleting again is not an error, and the address is free again
        store.delete(created.id).await.unwrap();
        store.create(user("alice@example.com")).await.unwrap();
    }

    #[tokio::test]
    async fn test_record_login_touches_only_login_fields() {
        let store = MemoryAccountStore::new();
        let created = store.create(user("alice@example.com")).await.unwrap();

        let mut renamed = created.clone();
        renamed.first_name = "Alicia".to_string();
        store.update(&renamed).await.unwrap();

        let at = Utc::now();
        let stamped = store.record_login(created.id, at).await.unwrap().unwrap();
        assert_eq!(stamped.last_login_at, Some(at));
        assert_eq!(stamped.updated_at, at);
        assert_eq!(stamped.first_name, "Alicia");

        // A profile write from an older snapshot keeps the login stamp
        let stored = store.update(&renamed).await.unwrap();
        assert_eq!(stored.last_login_at, Some(at));
    }

    #[tokio::test]
    async fn test_record_login_skips_inactive_and_missing() {
        let store = MemoryAccountStore::new();
        let mut inactive = user("bob@example.com");
        inactive.is_active = false;
        let inactive = store.create(inactive).await.unwrap();

        assert!(store
            .record_login(inactive.id, Utc::now())
            .await
            .unwrap()
            .is_none());
        assert!(store
            .record_login(Uuid::new_v4(), Utc::now())
            .await
            .unwrap()
            .is_none());

        let stored = store.find_by_id(inactive.id).await.unwrap().unwrap();
        assert!(stored.last_login_at.is_none());
    }

    #[tokio::test]
    async fn test_expired_session_not_found() {
        let store = MemorySessionStore::new();
        let user_id = Uuid::new_v4();
        store
            .create(user_id, "expired", Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        store
            .create(user_id, "live", Utc::now() + Duration::days(7))
            .await
            .unwrap();

        assert!(store.find_by_token("expired").await.unwrap().is_none());
        assert!(store.find_by_token("live").await.unwrap().is_some());
        assert!(store.consume("expired").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let store = MemorySessionStore::new();
        store
            .create(Uuid::new_v4(), "token", Utc::now() + Duration::days(7))
            .await
            .unwrap();

        store.revoke("token").await.unwrap();
        store.revoke("token").await.unwrap();
        store.revoke("never-existed").await.unwrap();

        assert!(store.find_by_token("token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_consume_only_once() {
        let store = MemorySessionStore::new();
        store
            .create(Uuid::new_v4(), "token", Utc::now() + Duration::days(7))
            .await
            .unwrap();

        let first = store.consume("token").await.unwrap();
        assert!(first.map(|s| s.is_revoked()).unwrap_or(false));
        assert!(store.consume("token").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consume_single_winner() {
        let store = Arc::new(MemorySessionStore::new());
        store
            .create(Uuid::new_v4(), "token", Utc::now() + Duration::days(7))
            .await
            .unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.consume("token").await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_sweep_and_revoke_all() {
        let store = MemorySessionStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        store
            .create(alice, "a1", Utc::now() + Duration::days(7))
            .await
            .unwrap();
        store
            .create(alice, "a2", Utc::now() + Duration::days(7))
            .await
            .unwrap();
        store
            .create(bob, "b1", Utc::now() - Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(store.sweep_expired().await.unwrap(), 1);
        assert_eq!(store.len().await, 2);

        assert_eq!(store.revoke_all_for_user(alice).await.unwrap(), 2);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_revoke_all_counts_only_live_sessions() {
        let store = MemorySessionStore::new();
        let alice = Uuid::new_v4();

        store
            .create(alice, "live", Utc::now() + Duration::days(7))
            .await
            .unwrap();
        store
            .create(alice, "stale", Utc::now() - Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(store.revoke_all_for_user(alice).await.unwrap(), 1);
        // The expired entry is removed along with the live one
        assert_eq!(store.len().await, 0);
    }
}
