//! To-do operator CLI
//!
//! Usage:
//!   todo check-password <password>
//!   todo hash-password <password>
//!   todo sweep-sessions
//!   todo init-schema

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sqlx::postgres::{PgPool, PgPoolOptions};
use todo_api::auth::{
    check_strength, hash_password, repository::ensure_schema, PasswordConfig, PgSessionStore,
    SessionStore,
};
use todo_core::config::{AppConfig, StorageBackend};
use todo_core::PgResourceStore;

#[derive(Parser)]
#[command(name = "todo")]
#[command(about = "Housekeeping for the to-do API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a password against the strength policy
    CheckPassword {
        password: String,
    },
    /// Print the Argon2id hash of a password using the configured cost
    HashPassword {
        password: String,
    },
    /// Remove expired and revoked sessions from PostgreSQL
    SweepSessions,
    /// Create the PostgreSQL tables if they do not exist
    InitSchema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::CheckPassword { password } => {
            let strength = check_strength(&password);
            println!("{}", serde_json::to_string_pretty(&strength)?);
            if !strength.is_valid {
                std::process::exit(1);
            }
        }
        Commands::HashPassword { password } => {
            let config = AppConfig::load()?;
            let hash = hash_password(&password, &PasswordConfig::from(&config.auth))?;
            println!("{hash}");
        }
        Commands::SweepSessions => {
            let pool = connect().await?;
            let removed = PgSessionStore::new(pool).sweep_expired().await?;
            tracing::info!(removed, "Session sweep complete");
        }
        Commands::InitSchema => {
            let pool = connect().await?;
            ensure_schema(&pool).await?;
            PgResourceStore::from_pool(pool).ensure_schema().await?;
            tracing::info!("Schema ready");
        }
    }

    Ok(())
}

async fn connect() -> anyhow::Result<PgPool> {
    let config = AppConfig::load()?;
    if config.database.backend != StorageBackend::Postgres {
        bail!("This command needs STORAGE_BACKEND=postgres");
    }

    PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.database.postgres_url)
        .await
        .context("Failed to connect to PostgreSQL")
}
