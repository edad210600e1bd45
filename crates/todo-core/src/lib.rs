//! Todo Core - configuration, shared error type, and list/task resources
//!
//! This crate defines the pieces shared by the API server and the CLI:
//! - Configuration management
//! - Common error types
//! - List and task records, and the store that resolves their owners

pub mod config;
pub mod resources;

pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, LoggingConfig, ServerConfig,
    StorageBackend,
};
pub use resources::{
    MemoryResourceStore, NewTask, PgResourceStore, ResourceRef, ResourceRepository, Task,
    TaskUpdate, TodoList,
};

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for store and configuration operations
#[derive(Error, Debug)]
pub enum TodoError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, TodoError>;
