//! Authentication service layer
//!
//! Registration, login, refresh rotation, logout, and profile management.
//! The service is the only writer of users and sessions; both stores are
//! injected so the same logic runs in memory and against PostgreSQL.

use super::jwt::{
    generate_access_token, generate_refresh_token, validate_token, JwtConfig, JwtError,
    TokenKind,
};
use super::models::{
    AuthResponse, LoginRequest, RegisterRequest, TokenPair, UpdateProfileRequest, User,
    UserPublic,
};
use super::password::{check_strength, hash_password, verify_password, PasswordConfig};
use super::repository::{AccountStore, MemoryAccountStore, MemorySessionStore, SessionStore};
use crate::error::AppError;
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

pub const TOKEN_TYPE: &str = "Bearer";

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const ACCOUNT_DEACTIVATED: &str = "Account is deactivated";
const INVALID_REFRESH: &str = "Invalid or revoked refresh token";

/// Outcome of a successful refresh
#[derive(Debug, Clone)]
pub struct Rotation {
    pub user_id: Uuid,
    pub tokens: TokenPair,
}

/// Outcome of a successful profile update
#[derive(Debug, Clone)]
pub struct ProfileChange {
    pub user: UserPublic,
    /// Names of the fields that were written
    pub changed: Vec<String>,
}

impl ProfileChange {
    pub fn password_changed(&self) -> bool {
        self.changed.iter().any(|f| f == "password")
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    sessions: Arc<dyn SessionStore>,
    jwt_config: JwtConfig,
    password_config: PasswordConfig,
}

impl AuthService {
    /// Create a new authentication service over the given stores
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        sessions: Arc<dyn SessionStore>,
        jwt_config: JwtConfig,
        password_config: PasswordConfig,
    ) -> Self {
        Self {
            accounts,
            sessions,
            jwt_config,
            password_config,
        }
    }

    /// Service backed by fresh in-memory stores
    pub fn in_memory(jwt_config: JwtConfig, password_config: PasswordConfig) -> Self {
        Self::new(
            Arc::new(MemoryAccountStore::new()),
            Arc::new(MemorySessionStore::new()),
            jwt_config,
            password_config,
        )
    }

    pub fn jwt_config(&self) -> &JwtConfig {
        &self.jwt_config
    }

    /// Register a new user
    ///
    /// Order of checks: field presence and email format, then email
    /// uniqueness, then password strength. No tokens are issued.
    pub async fn register(&self, request: RegisterRequest) -> Result<UserPublic, AppError> {
        let request = RegisterRequest {
            email: request.email.trim().to_lowercase(),
            password: request.password,
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
        };

        request
            .validate()
            .map_err(|e| AppError::Validation(validation_messages(&e)))?;

        if self.accounts.find_by_email(&request.email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let strength = check_strength(&request.password);
        if !strength.is_valid {
            return Err(AppError::Validation(strength.reasons));
        }

        let password_hash = self.hash(request.password).await?;
        let user = User::new(
            request.email,
            password_hash,
            request.first_name,
            request.last_name,
        );

        // The store rejects a concurrent duplicate that slipped past the check above
        let created = self.accounts.create(user).await?;
        debug!(user_id = %created.id, "User registered");

        Ok(created.to_public())
    }

    /// Login with email and password
    ///
    /// Unknown email and wrong password produce the same error. A
    /// deactivation or password change that lands while the password is
    /// being verified makes the login fail and revokes the session it issued.
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AppError> {
        let email = request.email.trim().to_lowercase();

        let user = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AppError::unauthorized(INVALID_CREDENTIALS))?;

        if !user.is_active {
            return Err(AppError::unauthorized(ACCOUNT_DEACTIVATED));
        }

        if !self
            .verify(request.password, user.password_hash.clone())
            .await?
        {
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        }

        let tokens = self.issue_session(user.id).await?;

        let stamped = match self.accounts.record_login(user.id, Utc::now()).await? {
            Some(stamped) if stamped.password_hash == user.password_hash => stamped,
            stamped => {
                self.sessions
                    .revoke(&hash_token(&tokens.refresh_token))
                    .await?;
                let reason = if stamped.is_some() {
                    INVALID_CREDENTIALS
                } else {
                    ACCOUNT_DEACTIVATED
                };
                return Err(AppError::unauthorized(reason));
            }
        };

        Ok(AuthResponse {
            user: stamped.to_public(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type,
            expires_in: tokens.expires_in,
        })
    }

    /// Exchange a refresh token for a new token pair
    ///
    /// The presented token is consumed; presenting it again fails.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Rotation, AppError> {
        let claims = validate_token(&self.jwt_config, refresh_token, TokenKind::Refresh)
            .map_err(|e| match e {
                JwtError::ExpiredToken => AppError::unauthorized("Refresh token has expired"),
                _ => AppError::unauthorized("Invalid refresh token"),
            })?;
        let user_id = claims
            .subject()
            .map_err(|_| AppError::unauthorized("Invalid refresh token"))?;

        let token_hash = hash_token(refresh_token);

        // A validly signed token may still have been revoked
        let session = self
            .sessions
            .find_by_token(&token_hash)
            .await?
            .ok_or_else(|| AppError::unauthorized(INVALID_REFRESH))?;
        if session.user_id != user_id {
            return Err(AppError::unauthorized(INVALID_REFRESH));
        }

        match self.accounts.find_by_id(user_id).await? {
            Some(user) if user.is_active => {}
            Some(_) => return Err(AppError::unauthorized(ACCOUNT_DEACTIVATED)),
            None => return Err(AppError::unauthorized(INVALID_REFRESH)),
        }

        // Only one concurrent caller gets past this point for a given token
        self.sessions
            .consume(&token_hash)
            .await?
            .ok_or_else(|| AppError::unauthorized(INVALID_REFRESH))?;

        let tokens = self.issue_session(user_id).await?;
        Ok(Rotation { user_id, tokens })
    }

    /// Revoke a refresh token. Never fails for the caller.
    pub async fn logout(&self, refresh_token: &str) {
        let token_hash = hash_token(refresh_token);
        if let Err(e) = self.sessions.revoke(&token_hash).await {
            warn!(error = %e, "Failed to revoke session during logout");
        }
    }

    /// Revoke every session of a user
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        Ok(self.sessions.revoke_all_for_user(user_id).await?)
    }

    pub async fn get_user_profile(&self, user_id: Uuid) -> Result<UserPublic, AppError> {
        self.accounts
            .find_by_id(user_id)
            .await?
            .map(|u| u.to_public())
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Apply a partial profile update
    ///
    /// `id` and `email` cannot be changed here. A new password must pass the
    /// strength policy. Deactivating the account or changing the password
    /// revokes all of the user's sessions.
    pub async fn update_user_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<ProfileChange, AppError> {
        let mut errors = Vec::new();
        if request.id.is_some() {
            errors.push("User id cannot be changed".to_string());
        }
        if request.email.is_some() {
            errors.push("Email cannot be changed through a profile update".to_string());
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let mut user = self
            .accounts
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        let mut changed = Vec::new();

        for (field, value, target) in [
            ("firstName", request.first_name, &mut user.first_name),
            ("lastName", request.last_name, &mut user.last_name),
        ] {
            let Some(value) = value else { continue };
            let value = value.trim();
            if value.is_empty() {
                errors.push(format!("{field} cannot be empty"));
            } else {
                *target = value.to_string();
                changed.push(field.to_string());
            }
        }

        if let Some(password) = &request.password {
            errors.extend(check_strength(password).reasons);
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        if let Some(password) = request.password {
            user.password_hash = self.hash(password).await?;
            changed.push("password".to_string());
        }

        if let Some(is_active) = request.is_active {
            user.is_active = is_active;
            changed.push("isActive".to_string());
        }

        user.updated_at = Utc::now();
        let user = self.accounts.update(&user).await?;

        if !user.is_active || changed.iter().any(|f| f == "password") {
            let revoked = self.sessions.revoke_all_for_user(user.id).await?;
            debug!(user_id = %user.id, revoked, "Sessions revoked after profile update");
        }

        Ok(ProfileChange {
            user: user.to_public(),
            changed,
        })
    }

    /// Verify an access token and return its subject
    pub fn verify_access_token(&self, token: &str) -> Result<Uuid, JwtError> {
        validate_token(&self.jwt_config, token, TokenKind::Access)?.subject()
    }

    /// Remove expired and revoked sessions
    pub async fn sweep_expired_sessions(&self) -> Result<u64, AppError> {
        Ok(self.sessions.sweep_expired().await?)
    }

    /// Issue a token pair and persist the refresh token's session
    async fn issue_session(&self, user_id: Uuid) -> Result<TokenPair, AppError> {
        let access_token = generate_access_token(&self.jwt_config, user_id)
            .map_err(|e| AppError::Internal(format!("Failed to generate access token: {e}")))?;
        let refresh_token = generate_refresh_token(&self.jwt_config, user_id)
            .map_err(|e| AppError::Internal(format!("Failed to generate refresh token: {e}")))?;

        let expires_at = Utc::now() + Duration::days(self.jwt_config.refresh_expiration_days);
        self.sessions
            .create(user_id, &hash_token(&refresh_token), expires_at)
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: TOKEN_TYPE.to_string(),
            expires_in: self.jwt_config.access_expiration_secs,
        })
    }

    async fn hash(&self, password: String) -> Result<String, AppError> {
        let config = self.password_config.clone();
        tokio::task::spawn_blocking(move || hash_password(&password, &config))
            .await
            .map_err(|e| AppError::Internal(format!("Hashing task failed: {e}")))?
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    async fn verify(&self, password: String, hash: String) -> Result<bool, AppError> {
        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Verification task failed: {e}")))?
            .map_err(|e| AppError::Internal(e.to_string()))
    }
}

/// Hash a token for storage (SHA-256, hex)
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn validation_messages(errors: &ValidationErrors) -> Vec<String> {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{field} is invalid"))
            })
        })
        .collect();
    messages.sort();
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::Claims;
    use crate::auth::repository::RepositoryError;

    fn service() -> AuthService {
        AuthService::in_memory(JwtConfig::default(), PasswordConfig::low_cost())
    }

    fn alice() -> RegisterRequest {
        RegisterRequest {
            email: "alice@example.com".to_string(),
            password: "Secure123!".to_string(),
            first_name: "Alice".to_string(),
            last_name: "A".to_string(),
        }
    }

    fn login(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn unauthorized_reason(err: AppError) -> String {
        match err {
            AppError::Unauthorized(reason) => reason,
            other => panic!("expected Unauthorized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let service = service();

        let user = service.register(alice()).await.unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert!(user.is_active);
        assert!(user.last_login_at.is_none());

        let response = service
            .login(login("ALICE@example.com", "Secure123!"))
            .await
            .unwrap();
        assert_eq!(response.user.id, user.id);
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 900);
        assert!(response.user.last_login_at.is_some());

        let json = serde_json::to_value(&response).unwrap();
        assert!(json["user"].get("password").is_none());
        assert!(json["user"].get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn test_register_normalizes_email_and_names() {
        let service = service();
        let user = service
            .register(RegisterRequest {
                email: "  Bob@Example.COM ".to_string(),
                first_name: "  Bob ".to_string(),
                ..alice()
            })
            .await
            .unwrap();

        assert_eq!(user.email, "bob@example.com");
        assert_eq!(user.first_name, "Bob");
    }

    #[tokio::test]
    async fn test_register_missing_fields_and_bad_email() {
        let service = service();
        let err = service
            .register(RegisterRequest {
                email: "not-an-email".to_string(),
                password: String::new(),
                first_name: "   ".to_string(),
                last_name: "A".to_string(),
            })
            .await
            .unwrap_err();

        match err {
            AppError::Validation(reasons) => assert_eq!(reasons.len(), 3),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts_before_password_policy() {
        let service = service();
        service.register(alice()).await.unwrap();

        let err = service
            .register(RegisterRequest {
                email: "Alice@Example.com".to_string(),
                password: "weak".to_string(),
                ..alice()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_weak_password_reports_all_reasons() {
        let service = service();
        let err = service
            .register(RegisterRequest {
                password: "short".to_string(),
                ..alice()
            })
            .await
            .unwrap_err();

        match err {
            AppError::Validation(reasons) => {
                // length, uppercase, digit, special
                assert_eq!(reasons.len(), 4);
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let service = service();
        service.register(alice()).await.unwrap();

        let wrong_password = service
            .login(login("alice@example.com", "Wrong123!"))
            .await
            .unwrap_err();
        let unknown_email = service
            .login(login("nobody@example.com", "Secure123!"))
            .await
            .unwrap_err();

        assert_eq!(unauthorized_reason(wrong_password), "Invalid credentials");
        assert_eq!(unauthorized_reason(unknown_email), "Invalid credentials");
    }

    #[tokio::test]
    async fn test_deactivated_account_cannot_login() {
        let service = service();
        let user = service.register(alice()).await.unwrap();
        service
            .update_user_profile(
                user.id,
                UpdateProfileRequest {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = service
            .login(login("alice@example.com", "Secure123!"))
            .await
            .unwrap_err();
        assert_eq!(unauthorized_reason(err), "Account is deactivated");
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_consumes() {
        let service = service();
        service.register(alice()).await.unwrap();
        let session = service
            .login(login("alice@example.com", "Secure123!"))
            .await
            .unwrap();

        let rotation = service.refresh(&session.refresh_token).await.unwrap();
        assert_eq!(rotation.user_id, session.user.id);
        assert_ne!(rotation.tokens.refresh_token, session.refresh_token);
        assert_ne!(rotation.tokens.access_token, session.access_token);

        let reuse = service.refresh(&session.refresh_token).await.unwrap_err();
        assert_eq!(
            unauthorized_reason(reuse),
            "Invalid or revoked refresh token"
        );

        // The rotated token keeps working exactly once
        service.refresh(&rotation.tokens.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token_and_garbage() {
        let service = service();
        service.register(alice()).await.unwrap();
        let session = service
            .login(login("alice@example.com", "Secure123!"))
            .await
            .unwrap();

        assert!(matches!(
            service.refresh(&session.access_token).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            service.refresh("not-a-token").await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let service = service();
        service.register(alice()).await.unwrap();
        let session = service
            .login(login("alice@example.com", "Secure123!"))
            .await
            .unwrap();

        service.logout(&session.refresh_token).await;
        service.logout(&session.refresh_token).await;
        service.logout("never-issued").await;

        assert!(matches!(
            service.refresh(&session.refresh_token).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_all_revokes_every_session() {
        let service = service();
        let user = service.register(alice()).await.unwrap();
        let first = service
            .login(login("alice@example.com", "Secure123!"))
            .await
            .unwrap();
        let second = service
            .login(login("alice@example.com", "Secure123!"))
            .await
            .unwrap();

        assert_eq!(service.logout_all(user.id).await.unwrap(), 2);
        assert!(service.refresh(&first.refresh_token).await.is_err());
        assert!(service.refresh(&second.refresh_token).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_single_winner() {
        let service = service();
        service.register(alice()).await.unwrap();
        let session = service
            .login(login("alice@example.com", "Secure123!"))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let token = session.refresh_token.clone();
                tokio::spawn(async move { service.refresh(&token).await })
            })
            .collect();

        let mut successes = 0;
        let mut unauthorized = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AppError::Unauthorized(_)) => unauthorized += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(unauthorized, 7);
    }

    #[tokio::test]
    async fn test_update_rejects_identity_fields() {
        let service = service();
        let user = service.register(alice()).await.unwrap();

        let err = service
            .update_user_profile(
                user.id,
                UpdateProfileRequest {
                    email: Some("new@x.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = service
            .update_user_profile(
                user.id,
                UpdateProfileRequest {
                    id: Some(serde_json::json!("00000000-0000-0000-0000-000000000000")),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let profile = service.get_user_profile(user.id).await.unwrap();
        assert_eq!(profile.email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_update_names_trimmed() {
        let service = service();
        let user = service.register(alice()).await.unwrap();

        let change = service
            .update_user_profile(
                user.id,
                UpdateProfileRequest {
                    first_name: Some("  Alicia ".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(change.user.first_name, "Alicia");
        assert_eq!(change.user.last_name, "A");
        assert_eq!(change.changed, vec!["firstName".to_string()]);

        let err = service
            .update_user_profile(
                user.id,
                UpdateProfileRequest {
                    last_name: Some("   ".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_password_change_enforces_policy_and_rehashes() {
        let service = service();
        let user = service.register(alice()).await.unwrap();
        let session = service
            .login(login("alice@example.com", "Secure123!"))
            .await
            .unwrap();

        let err = service
            .update_user_profile(
                user.id,
                UpdateProfileRequest {
                    password: Some("weakpass".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let change = service
            .update_user_profile(
                user.id,
                UpdateProfileRequest {
                    password: Some("Another456#".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(change.password_changed());

        assert!(service
            .login(login("alice@example.com", "Secure123!"))
            .await
            .is_err());
        service
            .login(login("alice@example.com", "Another456#"))
            .await
            .unwrap();

        // Existing sessions do not survive a password change
        assert!(service.refresh(&session.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn test_profile_of_unknown_user() {
        let service = service();
        let err = service.get_user_profile(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_access_token_verifies_to_subject() {
        let service = service();
        let user = service.register(alice()).await.unwrap();
        let session = service
            .login(login("alice@example.com", "Secure123!"))
            .await
            .unwrap();

        assert_eq!(
            service.verify_access_token(&session.access_token).unwrap(),
            user.id
        );
        assert!(matches!(
            service.verify_access_token(&session.refresh_token),
            Err(JwtError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_sweep_expired_sessions() {
        let sessions = Arc::new(MemorySessionStore::new());
        let service = AuthService::new(
            Arc::new(MemoryAccountStore::new()),
            sessions.clone(),
            JwtConfig::default(),
            PasswordConfig::low_cost(),
        );

        sessions
            .create(Uuid::new_v4(), "old", Utc::now() - Duration::minutes(5))
            .await
            .unwrap();
        sessions
            .create(Uuid::new_v4(), "new", Utc::now() + Duration::days(1))
            .await
            .unwrap();

        assert_eq!(service.sweep_expired_sessions().await.unwrap(), 1);
        assert_eq!(sessions.len().await, 1);
    }

    /// Account store that stalls after an email lookup, as a slow password
    /// hash would, so other writes can land mid-login
    struct StallingAccounts {
        inner: MemoryAccountStore,
        stall: std::time::Duration,
    }

    #[async_trait::async_trait]
    impl AccountStore for StallingAccounts {
        async fn create(&self, user: User) -> Result<User, RepositoryError> {
            self.inner.create(user).await
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
            let found = self.inner.find_by_email(email).await;
            tokio::time::sleep(self.stall).await;
            found
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
            self.inner.find_by_id(id).await
        }

        async fn update(&self, user: &User) -> Result<User, RepositoryError> {
            self.inner.update(user).await
        }

        async fn record_login(
            &self,
            id: Uuid,
            at: chrono::DateTime<Utc>,
        ) -> Result<Option<User>, RepositoryError> {
            self.inner.record_login(id, at).await
        }

        async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
            self.inner.delete(id).await
        }
    }

    fn stalling_service() -> (AuthService, Arc<MemorySessionStore>) {
        let sessions = Arc::new(MemorySessionStore::new());
        let service = AuthService::new(
            Arc::new(StallingAccounts {
                inner: MemoryAccountStore::new(),
                stall: std::time::Duration::from_millis(100),
            }),
            sessions.clone(),
            JwtConfig::default(),
            PasswordConfig::low_cost(),
        );
        (service, sessions)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deactivation_during_login_sticks() {
        let (service, sessions) = stalling_service();
        let user = service.register(alice()).await.unwrap();

        let pending = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .login(login("alice@example.com", "Secure123!"))
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        service
            .update_user_profile(
                user.id,
                UpdateProfileRequest {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(unauthorized_reason(err), "Account is deactivated");

        let profile = service.get_user_profile(user.id).await.unwrap();
        assert!(!profile.is_active);
        assert!(profile.last_login_at.is_none());
        assert_eq!(sessions.len().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_password_change_during_login_sticks() {
        let (service, sessions) = stalling_service();
        let user = service.register(alice()).await.unwrap();

        let pending = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .login(login("alice@example.com", "Secure123!"))
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        service
            .update_user_profile(
                user.id,
                UpdateProfileRequest {
                    password: Some("Another456#".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(unauthorized_reason(err), "Invalid credentials");
        assert_eq!(sessions.len().await, 0);

        // The new password is still the one on record
        service
            .login(login("alice@example.com", "Another456#"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_profile_update_keeps_login_stamp() {
        let service = service();
        let user = service.register(alice()).await.unwrap();
        let session = service
            .login(login("alice@example.com", "Secure123!"))
            .await
            .unwrap();

        let change = service
            .update_user_profile(
                user.id,
                UpdateProfileRequest {
                    last_name: Some("B".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(change.user.last_login_at, session.user.last_login_at);
    }

    fn signed_refresh(config: &JwtConfig, user_id: Uuid, iat: u64, exp: u64) -> String {
        let claims = Claims {
            iss: config.issuer.clone(),
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat,
            exp,
            kind: TokenKind::Refresh,
        };
        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(config.refresh_secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_refresh_with_expired_jwt() {
        let service = service();
        let user = service.register(alice()).await.unwrap();

        let now = Utc::now().timestamp() as u64;
        let token = signed_refresh(service.jwt_config(), user.id, now - 7200, now - 3600);

        let err = service.refresh(&token).await.unwrap_err();
        assert_eq!(unauthorized_reason(err), "Refresh token has expired");
    }

    #[tokio::test]
    async fn test_refresh_with_expired_session_row() {
        let sessions = Arc::new(MemorySessionStore::new());
        let service = AuthService::new(
            Arc::new(MemoryAccountStore::new()),
            sessions.clone(),
            JwtConfig::default(),
            PasswordConfig::low_cost(),
        );
        let user = service.register(alice()).await.unwrap();

        // The JWT is still valid but its session row has already lapsed
        let now = Utc::now().timestamp() as u64;
        let token = signed_refresh(service.jwt_config(), user.id, now, now + 3600);
        sessions
            .create(user.id, &hash_token(&token), Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        let err = service.refresh(&token).await.unwrap_err();
        assert_eq!(
            unauthorized_reason(err),
            "Invalid or revoked refresh token"
        );
    }

    #[tokio::test]
    async fn test_refresh_with_tampered_token() {
        let service = service();
        service.register(alice()).await.unwrap();
        let session = service
            .login(login("alice@example.com", "Secure123!"))
            .await
            .unwrap();

        // Swap the payload for one naming another subject, keeping the signature
        let parts: Vec<&str> = session.refresh_token.split('.').collect();
        let forged = signed_refresh(
            service.jwt_config(),
            Uuid::new_v4(),
            Utc::now().timestamp() as u64,
            Utc::now().timestamp() as u64 + 3600,
        );
        let forged_payload = forged.split('.').nth(1).unwrap();
        let tampered = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        let err = service.refresh(&tampered).await.unwrap_err();
        assert_eq!(unauthorized_reason(err), "Invalid refresh token");

        // The genuine token is untouched
        service.refresh(&session.refresh_token).await.unwrap();
    }

    #[test]
    fn test_hash_token_is_stable_hex() {
        let hash = hash_token("abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token("abc"));
        assert_ne!(hash, hash_token("abd"));
    }
}
