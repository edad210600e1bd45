//! Authentication middleware for protecting routes
//!
//! Extracts the bearer token from the Authorization header and verifies it
//! through the ownership guard. On success, the authenticated user is added
//! to request extensions.

use super::guard::{GuardError, OwnershipGuard};
use crate::audit::{audit_log, AuditEvent, RequestMeta};
use crate::error::ApiError;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Authenticated user extracted from the access token
///
/// Handlers read it with `Extension<AuthenticatedUser>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

/// Authentication middleware errors
///
/// Every variant is a 401; the code tells clients why.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingToken,

    #[error("Authorization header must be 'Bearer <token>'")]
    MalformedToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "MISSING_TOKEN",
            AuthError::MalformedToken => "MALFORMED_TOKEN",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::InvalidToken => "INVALID_TOKEN",
        }
    }
}

impl From<GuardError> for AuthError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::TokenExpired => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ApiError::new(self.code(), self.to_string());

        let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        response
    }
}

/// Extract the token from an Authorization header value
///
/// The scheme is matched case-insensitively.
pub fn parse_bearer(value: Option<&HeaderValue>) -> Result<&str, AuthError> {
    let value = value
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedToken)?;

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::MalformedToken)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() || token.contains(' ') {
        return Err(AuthError::MalformedToken);
    }
    Ok(token)
}

/// Authentication middleware that requires a valid access token
///
/// ```ignore
/// use axum::{middleware, routing::get, Router};
///
/// let app = Router::new()
///     .route("/protected", get(handler))
///     .route_layer(middleware::from_fn_with_state(guard, auth_middleware));
/// ```
pub async fn auth_middleware(
    State(guard): State<OwnershipGuard>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let result = parse_bearer(request.headers().get(header::AUTHORIZATION))
        .and_then(|token| guard.authorize(token).map_err(AuthError::from));

    let user_id = match result {
        Ok(user_id) => user_id,
        Err(e) => {
            audit_log(&AuditEvent::InvalidToken {
                reason: e.code().to_string(),
                meta: RequestMeta::from_headers(request.headers()),
            });
            return Err(e);
        }
    };

    request
        .extensions_mut()
        .insert(AuthenticatedUser { user_id });

    Ok(next.run(request).await)
}
