//! Security audit logging for authentication events
//!
//! All audit events are logged at INFO level with the "audit" target so
//! they can be filtered and routed separately from application logs.
//! Passwords and raw token values never appear in an event.
//!
//! # Example
//!
//! ```ignore
//! use todo_api::audit::{audit_log, AuditEvent, RequestMeta};
//!
//! let meta = RequestMeta::from_headers(&headers);
//! audit_log(&AuditEvent::LoginSuccess {
//!     user_id: user.id,
//!     email: user.email.clone(),
//!     meta,
//! });
//! ```

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Client information taken from request headers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    RegistrationSuccess {
        user_id: Uuid,
        email: String,
        #[serde(flatten)]
        meta: RequestMeta,
    },

    RegistrationFailure {
        email: String,
        reason: String,
        #[serde(flatten)]
        meta: RequestMeta,
    },

    LoginSuccess {
        user_id: Uuid,
        email: String,
        #[serde(flatten)]
        meta: RequestMeta,
    },

    LoginFailure {
        email: String,
        reason: String,
        #[serde(flatten)]
        meta: RequestMeta,
    },

    TokenRefresh {
        user_id: Uuid,
        #[serde(flatten)]
        meta: RequestMeta,
    },

    RefreshFailure {
        reason: String,
        #[serde(flatten)]
        meta: RequestMeta,
    },

    /// `user_id` is absent for single-session logout, which is anonymous
    Logout {
        user_id: Option<Uuid>,
        all_devices: bool,
        #[serde(flatten)]
        meta: RequestMeta,
    },

    ProfileUpdate {
        user_id: Uuid,
        fields: Vec<String>,
        #[serde(flatten)]
        meta: RequestMeta,
    },

    PasswordChange {
        user_id: Uuid,
        #[serde(flatten)]
        meta: RequestMeta,
    },

    /// Authenticated caller touched a resource owned by someone else
    AccessDenied {
        user_id: Uuid,
        resource: String,
        #[serde(flatten)]
        meta: RequestMeta,
    },

    InvalidToken {
        reason: String,
        #[serde(flatten)]
        meta: RequestMeta,
    },

    SessionSweep {
        removed: u64,
    },
}

impl AuditEvent {
    fn summary(&self) -> &'static str {
        match self {
            Self::RegistrationSuccess { .. } => "Registration successful",
            Self::RegistrationFailure { .. } => "Registration failed",
            Self::LoginSuccess { .. } => "Login successful",
            Self::LoginFailure { .. } => "Login failed",
            Self::TokenRefresh { .. } => "Token refresh",
            Self::RefreshFailure { .. } => "Token refresh failed",
            Self::Logout { .. } => "User logout",
            Self::ProfileUpdate { .. } => "Profile updated",
            Self::PasswordChange { .. } => "Password changed",
            Self::AccessDenied { .. } => "Access denied",
            Self::InvalidToken { .. } => "Invalid token",
            Self::SessionSweep { .. } => "Expired sessions swept",
        }
    }

    fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::RegistrationSuccess { user_id, .. }
            | Self::LoginSuccess { user_id, .. }
            | Self::TokenRefresh { user_id, .. }
            | Self::ProfileUpdate { user_id, .. }
            | Self::PasswordChange { user_id, .. }
            | Self::AccessDenied { user_id, .. } => Some(*user_id),
            Self::Logout { user_id, .. } => *user_id,
            _ => None,
        }
    }

    fn meta(&self) -> Option<&RequestMeta> {
        match self {
            Self::RegistrationSuccess { meta, .. }
            | Self::RegistrationFailure { meta, .. }
            | Self::LoginSuccess { meta, .. }
            | Self::LoginFailure { meta, .. }
            | Self::TokenRefresh { meta, .. }
            | Self::RefreshFailure { meta, .. }
            | Self::Logout { meta, .. }
            | Self::ProfileUpdate { meta, .. }
            | Self::PasswordChange { meta, .. }
            | Self::AccessDenied { meta, .. }
            | Self::InvalidToken { meta, .. } => Some(meta),
            Self::SessionSweep { .. } => None,
        }
    }
}

/// Log a security audit event with structured fields
///
/// The full event is attached as JSON in the `event` field; the user id and
/// client address are also emitted as separate fields for filtering.
pub fn audit_log(event: &AuditEvent) {
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));
    let ip_address = event.meta().and_then(|m| m.ip_address.as_deref());

    info!(
        target: "audit",
        event = %event_json,
        user_id = ?event.user_id(),
        ip_address = ?ip_address,
        "{}",
        event.summary()
    );
}

/// Extract the client IP from X-Forwarded-For or X-Real-IP
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(first_ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
    {
        return Some(first_ip.trim().to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
