//! Ownership guard
//!
//! Ties a bearer token to a user id, and a user id to the resources it may
//! touch. An invalid or expired token is an authentication failure (401);
//! a valid token for the wrong owner is an authorization failure (403).

use super::jwt::{validate_access_token, JwtConfig, JwtError};
use crate::error::AppError;
use std::sync::Arc;
use thiserror::Error;
use todo_core::{ResourceRef, ResourceRepository};
use uuid::Uuid;

/// Guard failures
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Access denied to {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Failed to resolve owner: {0}")]
    Lookup(String),
}

impl From<JwtError> for GuardError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::ExpiredToken => GuardError::TokenExpired,
            _ => GuardError::InvalidToken,
        }
    }
}

impl From<GuardError> for AppError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::TokenExpired => AppError::unauthorized("Token has expired"),
            GuardError::InvalidToken => AppError::unauthorized("Invalid token"),
            GuardError::Forbidden(resource) => {
                AppError::Forbidden(format!("Access denied to {resource}"))
            }
            GuardError::NotFound(resource) => AppError::NotFound(format!("{resource} not found")),
            GuardError::Lookup(msg) => AppError::Internal(msg),
        }
    }
}

/// Verifies bearer tokens and resource ownership
#[derive(Clone)]
pub struct OwnershipGuard {
    jwt_config: JwtConfig,
    resources: Arc<dyn ResourceRepository>,
}

impl OwnershipGuard {
    pub fn new(jwt_config: JwtConfig, resources: Arc<dyn ResourceRepository>) -> Self {
        Self {
            jwt_config,
            resources,
        }
    }

    /// Verify an access token and return its subject
    pub fn authorize(&self, token: &str) -> Result<Uuid, GuardError> {
        let claims = validate_access_token(&self.jwt_config, token)?;
        Ok(claims.subject()?)
    }

    /// Fail with `Forbidden` unless the subject owns the resource
    pub fn check_ownership(subject: Uuid, owner: Uuid) -> Result<(), GuardError> {
        if subject == owner {
            Ok(())
        } else {
            Err(GuardError::Forbidden("resource".to_string()))
        }
    }

    /// Resolve a resource's owner and check it against the subject
    pub async fn authorize_resource(
        &self,
        subject: Uuid,
        resource: ResourceRef,
    ) -> Result<(), GuardError> {
        let owner = self
            .resources
            .owner_of(resource)
            .await
            .map_err(|e| GuardError::Lookup(e.to_string()))?
            .ok_or_else(|| GuardError::NotFound(resource_kind(resource).to_string()))?;

        Self::check_ownership(subject, owner)
            .map_err(|_| GuardError::Forbidden(resource.to_string()))
    }
}

fn resource_kind(resource: ResourceRef) -> &'static str {
    match resource {
        ResourceRef::List(_) => "List",
        ResourceRef::Task(_) => "Task",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{generate_access_token, generate_refresh_token};
    use todo_core::{MemoryResourceStore, TodoList};

    fn guard() -> (OwnershipGuard, Arc<MemoryResourceStore>) {
        let store = Arc::new(MemoryResourceStore::new());
        (OwnershipGuard::new(JwtConfig::default(), store.clone()), store)
    }

    #[test]
    fn test_check_ownership() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(OwnershipGuard::check_ownership(a, a).is_ok());
        assert!(matches!(
            OwnershipGuard::check_ownership(b, a),
            Err(GuardError::Forbidden(_))
        ));
    }

    #[test]
    fn test_authorize_access_token() {
        let (guard, _) = guard();
        let user_id = Uuid::new_v4();

        let token = generate_access_token(&JwtConfig::default(), user_id).unwrap();
        assert_eq!(guard.authorize(&token).unwrap(), user_id);

        let refresh = generate_refresh_token(&JwtConfig::default(), user_id).unwrap();
        assert!(matches!(
            guard.authorize(&refresh),
            Err(GuardError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_authorize_resource() {
        let (guard, store) = guard();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let list = store.create_list(TodoList::new(alice, "Alice's")).await.unwrap();

        guard
            .authorize_resource(alice, ResourceRef::List(list.id))
            .await
            .unwrap();

        assert!(matches!(
            guard
                .authorize_resource(bob, ResourceRef::List(list.id))
                .await,
            Err(GuardError::Forbidden(_))
        ));
        assert!(matches!(
            guard
                .authorize_resource(alice, ResourceRef::Task(Uuid::new_v4()))
                .await,
            Err(GuardError::NotFound(_))
        ));
    }

    #[test]
    fn test_guard_error_status_mapping() {
        use axum::http::StatusCode;

        assert_eq!(
            AppError::from(GuardError::TokenExpired).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(GuardError::Forbidden("list".into())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(GuardError::NotFound("List".into())).status(),
            StatusCode::NOT_FOUND
        );
    }
}
