/// Password hashing and verification using Argon2id
///
/// Hashes are PHC strings carrying algorithm, parameters, and a random
/// 16-byte salt, so verification needs nothing but the stored string.
/// The strength policy reports every violated rule at once.
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use serde::Serialize;
use thiserror::Error;
use todo_core::AuthConfig;
use utoipa::ToSchema;

/// Minimum password length in characters
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Characters that satisfy the special-character rule
pub const SPECIAL_CHARACTERS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?`~";

/// Password hashing and verification errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Failed to verify password: {0}")]
    VerificationFailed(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,
}

/// Argon2 cost parameters
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Iterations
    pub time_cost: u32,
    /// Lanes
    pub parallelism: u32,
    /// Output length in bytes
    pub output_len: Option<usize>,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for PasswordConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            memory_cost: config.memory_cost,
            time_cost: config.time_cost,
            parallelism: config.parallelism,
            output_len: Some(32),
        }
    }
}

impl PasswordConfig {
    /// Minimal cost parameters for tests and local tooling
    pub fn low_cost() -> Self {
        Self {
            memory_cost: 8,
            time_cost: 1,
            parallelism: 1,
            output_len: Some(32),
        }
    }

    fn to_params(&self) -> Result<Params, PasswordError> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            self.output_len,
        )
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }
}

/// Hash a plaintext password using Argon2id
///
/// # Example
///
/// ```no_run
/// use todo_api::auth::password::{hash_password, PasswordConfig};
///
/// let hash = hash_password("Secure123!", &PasswordConfig::default()).unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str, config: &PasswordConfig) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let params = config.to_params()?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

    Ok(password_hash.to_string())
}

/// Verify a plaintext password against a stored hash
///
/// # Returns
///
/// * `Ok(true)` - Password matches
/// * `Ok(false)` - Password does not match
/// * `Err(PasswordError)` - The stored hash is not a valid PHC string
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    // Parameters come from the PHC string; the comparison is constant-time.
    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerificationFailed(e.to_string())),
    }
}

/// Result of a password policy check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PasswordStrength {
    pub is_valid: bool,
    pub reasons: Vec<String>,
}

/// Check a password against the strength policy
///
/// Rules:
/// - At least 8 characters
/// - At least 1 uppercase letter
/// - At least 1 lowercase letter
/// - At least 1 digit
/// - At least 1 character from [`SPECIAL_CHARACTERS`]
pub fn check_strength(password: &str) -> PasswordStrength {
    let mut reasons = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        reasons.push(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        ));
    }

    if !password.chars().any(|c| c.is_uppercase()) {
        reasons.push("Password must contain at least one uppercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_lowercase()) {
        reasons.push("Password must contain at least one lowercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        reasons.push("Password must contain at least one digit".to_string());
    }

    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        reasons.push("Password must contain at least one special character".to_string());
    }

    PasswordStrength {
        is_valid: reasons.is_empty(),
        reasons,
    }
}
