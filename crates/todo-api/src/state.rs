//! Application state management

use crate::auth::{
    repository::ensure_schema, AuthService, JwtConfig, OwnershipGuard, PasswordConfig,
    PgAccountStore, PgSessionStore,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use todo_core::config::{AppConfig, StorageBackend};
use todo_core::{MemoryResourceStore, PgResourceStore, ResourceRepository};
use tokio::sync::RwLock;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Registration, login, rotation, and profile operations
    pub auth: AuthService,
    /// Bearer verification and resource ownership checks
    pub guard: OwnershipGuard,
    /// List and task persistence
    pub resources: Arc<dyn ResourceRepository>,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Pool pinged by the readiness probe; `None` for in-memory storage
    pub database: Option<PgPool>,
    /// Per-endpoint request metrics keyed by normalized path
    pub metrics: RwLock<HashMap<String, EndpointMetrics>>,
}

/// Counters for one normalized endpoint
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EndpointMetrics {
    pub status_counts: HashMap<u16, u64>,
    pub total_latency_us: u64,
    pub latency_count: u64,
    pub min_latency_us: u64,
    pub max_latency_us: u64,
}

impl EndpointMetrics {
    fn record(&mut self, status: u16, latency_us: u64) {
        *self.status_counts.entry(status).or_insert(0) += 1;
        if self.latency_count == 0 || latency_us < self.min_latency_us {
            self.min_latency_us = latency_us;
        }
        self.max_latency_us = self.max_latency_us.max(latency_us);
        self.total_latency_us += latency_us;
        self.latency_count += 1;
    }

    /// Mean latency in microseconds
    pub fn avg_latency_us(&self) -> u64 {
        if self.latency_count == 0 {
            0
        } else {
            self.total_latency_us / self.latency_count
        }
    }
}

impl AppState {
    /// Build state over already constructed services
    pub fn new(
        config: AppConfig,
        auth: AuthService,
        resources: Arc<dyn ResourceRepository>,
    ) -> Self {
        let guard = OwnershipGuard::new(auth.jwt_config().clone(), resources.clone());
        Self {
            config,
            auth,
            guard,
            resources,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            database: None,
            metrics: RwLock::new(HashMap::new()),
        }
    }

    /// Build state from configuration, connecting to PostgreSQL when selected
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let jwt_config = JwtConfig::from(&config.auth);
        let password_config = PasswordConfig::from(&config.auth);

        match config.database.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                let auth = AuthService::in_memory(jwt_config, password_config);
                Ok(Self::new(config, auth, Arc::new(MemoryResourceStore::new())))
            }
            StorageBackend::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.database.pool_size)
                    .connect(&config.database.postgres_url)
                    .await?;

                // Resource tables reference users
                ensure_schema(&pool).await?;
                let resources = PgResourceStore::from_pool(pool.clone());
                resources.ensure_schema().await?;
                tracing::info!("Connected to PostgreSQL");

                let auth = AuthService::new(
                    Arc::new(PgAccountStore::new(pool.clone())),
                    Arc::new(PgSessionStore::new(pool.clone())),
                    jwt_config,
                    password_config,
                );
                Ok(Self::new(config, auth, Arc::new(resources)).with_database(pool))
            }
        }
    }

    /// In-memory state with low-cost hashing, for tests
    pub fn in_memory(config: AppConfig) -> Self {
        let auth = AuthService::in_memory(JwtConfig::from(&config.auth), PasswordConfig::low_cost());
        Self::new(config, auth, Arc::new(MemoryResourceStore::new()))
    }

    /// Attach the pool the readiness probe checks
    pub fn with_database(mut self, pool: PgPool) -> Self {
        self.database = Some(pool);
        self
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Ready when the backing database answers a trivial query
    pub async fn is_ready(&self) -> bool {
        let Some(pool) = &self.database else {
            return true;
        };
        match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Readiness check failed");
                false
            }
        }
    }

    /// Record one completed request
    pub async fn record_request(&self, endpoint: String, status: u16, latency_us: u64) {
        self.increment_requests();
        self.metrics
            .write()
            .await
            .entry(endpoint)
            .or_default()
            .record(status, latency_us);
    }
}
