//! Authentication and authorization module
//!
//! - Token generation and validation (access and refresh JWTs)
//! - Password hashing with Argon2id and the strength policy
//! - Account and session stores (in-memory and PostgreSQL)
//! - Authentication service for registration, login, rotation, and logout
//! - Ownership guard and bearer middleware
//! - Background session sweeper

pub mod guard;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repository;
pub mod service;
pub mod sweeper;

pub use guard::{GuardError, OwnershipGuard};
pub use jwt::{
    generate_access_token, generate_refresh_token, validate_access_token, validate_token, Claims,
    JwtConfig, JwtError, TokenKind,
};
pub use middleware::{auth_middleware, AuthError, AuthenticatedUser};
pub use models::{
    AuthResponse, LoginRequest, LogoutRequest, RefreshRequest, RegisterRequest, Session,
    TokenPair, UpdateProfileRequest, User, UserPublic,
};
pub use password::{
    check_strength, hash_password, verify_password, PasswordConfig, PasswordError,
    PasswordStrength,
};
pub use repository::{
    AccountStore, MemoryAccountStore, MemorySessionStore, PgAccountStore, PgSessionStore,
    RepositoryError, SessionStore,
};
pub use service::{hash_token, AuthService, ProfileChange, Rotation};
