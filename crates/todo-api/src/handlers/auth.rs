//! Authentication API handlers
//!
//! Provides HTTP endpoints for registration, login, token rotation, logout,
//! and profile management. Every outcome is written to the audit log.

use crate::audit::{audit_log, AuditEvent, RequestMeta};
use crate::auth::{
    AuthResponse, AuthenticatedUser, LoginRequest, LogoutRequest, RefreshRequest,
    RegisterRequest, TokenPair, UpdateProfileRequest, UserPublic,
};
use crate::error::{AppError, AppJson};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

/// Register a new user account
///
/// Returns the created user without tokens; the client logs in separately.
///
/// # Responses
///
/// * `201 Created` - User registered
/// * `400 Bad Request` - Missing field, bad email, or weak password
/// * `409 Conflict` - Email already registered
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = UserPublic),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 409, description = "Email already registered", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(request): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let meta = RequestMeta::from_headers(&headers);
    let email = request.email.trim().to_lowercase();

    match state.auth.register(request).await {
        Ok(user) => {
            audit_log(&AuditEvent::RegistrationSuccess {
                user_id: user.id,
                email: user.email.clone(),
                meta,
            });
            Ok((StatusCode::CREATED, Json(user)))
        }
        Err(e) => {
            audit_log(&AuditEvent::RegistrationFailure {
                email,
                reason: e.to_string(),
                meta,
            });
            Err(e)
        }
    }
}

/// Login with email and password
///
/// Unknown email and wrong password return the same message.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials or deactivated account", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(request): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let meta = RequestMeta::from_headers(&headers);
    let email = request.email.trim().to_lowercase();

    match state.auth.login(request).await {
        Ok(response) => {
            audit_log(&AuditEvent::LoginSuccess {
                user_id: response.user.id,
                email,
                meta,
            });
            Ok(Json(response))
        }
        Err(e) => {
            audit_log(&AuditEvent::LoginFailure {
                email,
                reason: e.to_string(),
                meta,
            });
            Err(e)
        }
    }
}

/// Exchange a refresh token for a new token pair
///
/// The presented refresh token is consumed; reusing it fails with 401.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = TokenPair),
        (status = 401, description = "Invalid, expired, or revoked refresh token", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(request): AppJson<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let meta = RequestMeta::from_headers(&headers);

    match state.auth.refresh(&request.refresh_token).await {
        Ok(rotation) => {
            audit_log(&AuditEvent::TokenRefresh {
                user_id: rotation.user_id,
                meta,
            });
            Ok(Json(rotation.tokens))
        }
        Err(e) => {
            audit_log(&AuditEvent::RefreshFailure {
                reason: e.to_string(),
                meta,
            });
            Err(e)
        }
    }
}

/// Revoke a refresh token
///
/// Always succeeds, even for unknown, revoked, or missing tokens.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logged out"),
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Option<AppJson<LogoutRequest>>,
) -> StatusCode {
    if let Some(AppJson(request)) = request {
        state.auth.logout(&request.refresh_token).await;
    }

    audit_log(&AuditEvent::Logout {
        user_id: None,
        all_devices: false,
        meta: RequestMeta::from_headers(&headers),
    });

    StatusCode::OK
}

/// Revoke every session of the authenticated user
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout-all",
    tag = "auth",
    responses(
        (status = 200, description = "All sessions revoked"),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout_all_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let revoked = state.auth.logout_all(user.user_id).await?;
    tracing::debug!(user_id = %user.user_id, revoked, "Revoked all sessions");

    audit_log(&AuditEvent::Logout {
        user_id: Some(user.user_id),
        all_devices: true,
        meta: RequestMeta::from_headers(&headers),
    });

    Ok(StatusCode::OK)
}

/// Get the current user's profile
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserPublic),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<UserPublic>, AppError> {
    let profile = state.auth.get_user_profile(user.user_id).await?;
    Ok(Json(profile))
}

/// Update the current user's profile
///
/// `id` and `email` are immutable here. Changing the password or
/// deactivating the account revokes every session.
#[utoipa::path(
    patch,
    path = "/api/v1/auth/me",
    tag = "auth",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated user", body = UserPublic),
        (status = 400, description = "Invalid update", body = crate::error::ApiError),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    AppJson(request): AppJson<UpdateProfileRequest>,
) -> Result<Json<UserPublic>, AppError> {
    let change = state
        .auth
        .update_user_profile(user.user_id, request)
        .await?;
    let meta = RequestMeta::from_headers(&headers);

    if change.password_changed() {
        audit_log(&AuditEvent::PasswordChange {
            user_id: user.user_id,
            meta: meta.clone(),
        });
    }
    if !change.changed.is_empty() {
        audit_log(&AuditEvent::ProfileUpdate {
            user_id: user.user_id,
            fields: change.changed,
            meta,
        });
    }

    Ok(Json(change.user))
}
