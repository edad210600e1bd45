//! API handlers

pub mod auth;
pub mod health;
pub mod lists;
pub mod tasks;

use crate::audit::{audit_log, AuditEvent, RequestMeta};
use crate::auth::{AuthenticatedUser, GuardError};
use crate::error::AppError;
use crate::state::AppState;
use axum::http::HeaderMap;
use todo_core::ResourceRef;

/// Resolve the resource's owner and require it to be the caller
///
/// Unknown resources are 404, foreign ones 403 and audited.
pub(crate) async fn require_owner(
    state: &AppState,
    user: AuthenticatedUser,
    resource: ResourceRef,
    headers: &HeaderMap,
) -> Result<(), AppError> {
    state
        .guard
        .authorize_resource(user.user_id, resource)
        .await
        .map_err(|e| {
            if matches!(e, GuardError::Forbidden(_)) {
                audit_log(&AuditEvent::AccessDenied {
                    user_id: user.user_id,
                    resource: resource.to_string(),
                    meta: RequestMeta::from_headers(headers),
                });
            }
            AppError::from(e)
        })
}

/// Trimmed non-empty text or a validation error naming the field
pub(crate) fn required_text(field: &str, value: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        Err(AppError::validation(format!("{field} is required")))
    } else {
        Ok(value.to_string())
    }
}
