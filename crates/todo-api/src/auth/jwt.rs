//! JWT token generation and validation
//!
//! Access and refresh tokens are HMAC-SHA256 JWTs signed with distinct
//! secrets. Each token carries its kind, so a refresh token can never be
//! accepted where an access token is expected (or the reverse).

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use todo_core::AuthConfig;
use uuid::Uuid;

/// Token kind marker embedded in every token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Access => write!(f, "access"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - user ID
    pub sub: String,
    /// JWT ID, makes every issued token value unique
    pub jti: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
    /// Access or refresh
    pub kind: TokenKind,
}

impl Claims {
    /// Parse the subject as a user id
    pub fn subject(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::InvalidToken)
    }
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    /// Malformed, bad signature, wrong issuer, or wrong kind
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("System time error: {0}")]
    SystemTimeError(#[from] std::time::SystemTimeError),
}

/// JWT Configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret for access tokens
    pub access_secret: String,
    /// Secret for refresh tokens, distinct from the access secret
    pub refresh_secret: String,
    /// Access token lifetime in seconds
    pub access_expiration_secs: u64,
    /// Refresh token lifetime in days
    pub refresh_expiration_days: i64,
    /// Token issuer identifier
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for JwtConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            access_secret: config.access_secret.clone(),
            refresh_secret: config.refresh_secret.clone(),
            access_expiration_secs: config.access_ttl_secs,
            refresh_expiration_days: config.refresh_ttl_days,
            issuer: config.issuer.clone(),
        }
    }
}

impl JwtConfig {
    fn secret(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::Access => self.access_secret.as_bytes(),
            TokenKind::Refresh => self.refresh_secret.as_bytes(),
        }
    }

    fn lifetime_secs(&self, kind: TokenKind) -> u64 {
        match kind {
            TokenKind::Access => self.access_expiration_secs,
            TokenKind::Refresh => (self.refresh_expiration_days.max(0) as u64) * 24 * 60 * 60,
        }
    }
}

fn issue(config: &JwtConfig, user_id: Uuid, kind: TokenKind) -> Result<String, JwtError> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

    let claims = Claims {
        iss: config.issuer.clone(),
        sub: user_id.to_string(),
        jti: Uuid::new_v4().to_string(),
        iat: now,
        exp: now + config.lifetime_secs(kind),
        kind,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret(kind)),
    )?;

    Ok(token)
}

/// Generate a short-lived access token for a user
///
/// # Example
///
/// ```no_run
/// use todo_api::auth::jwt::{generate_access_token, JwtConfig};
/// use uuid::Uuid;
///
/// let config = JwtConfig::default();
/// let token = generate_access_token(&config, Uuid::new_v4()).expect("Failed to generate token");
/// ```
pub fn generate_access_token(config: &JwtConfig, user_id: Uuid) -> Result<String, JwtError> {
    issue(config, user_id, TokenKind::Access)
}

/// Generate a long-lived refresh token for a user
///
/// The token is only honoured while a matching session exists.
pub fn generate_refresh_token(config: &JwtConfig, user_id: Uuid) -> Result<String, JwtError> {
    issue(config, user_id, TokenKind::Refresh)
}

/// Validate a token of the expected kind and extract its claims
///
/// # Returns
///
/// * `Ok(Claims)` - Decoded and validated claims
/// * `Err(JwtError::ExpiredToken)` - Signature valid but expiry passed
/// * `Err(JwtError::InvalidToken)` - Anything else, including a kind mismatch
pub fn validate_token(
    config: &JwtConfig,
    token: &str,
    expected: TokenKind,
) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.set_required_spec_claims(&["exp", "sub", "iss"]);
    validation.leeway = 0;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret(expected)),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
        _ => JwtError::InvalidToken,
    })?;

    if token_data.claims.kind != expected {
        return Err(JwtError::InvalidToken);
    }

    Ok(token_data.claims)
}

/// Validate an access token
pub fn validate_access_token(config: &JwtConfig, token: &str) -> Result<Claims, JwtError> {
    validate_token(config, token, TokenKind::Access)
}
