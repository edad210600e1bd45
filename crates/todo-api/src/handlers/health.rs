//! Health check and metrics handlers

use crate::state::{AppState, EndpointMetrics};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use todo_core::config::StorageBackend;
use utoipa::ToSchema;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub name: String,
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
    })
}

/// Readiness response
#[derive(Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub ready: bool,
    /// `memory` or `postgres`
    pub storage: String,
}

/// Readiness probe
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessResponse),
        (status = 503, description = "Service not ready", body = ReadinessResponse)
    )
)]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ready = state.is_ready().await;
    let response = ReadinessResponse {
        ready,
        storage: match state.config.database.backend {
            StorageBackend::Memory => "memory",
            StorageBackend::Postgres => "postgres",
        }
        .to_string(),
    };

    if ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// JSON metrics response
#[derive(Serialize)]
pub struct MetricsResponse {
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub requests_per_second: f64,
    /// Sorted by endpoint for stable output
    pub endpoints: BTreeMap<String, EndpointSummary>,
}

#[derive(Serialize)]
pub struct EndpointSummary {
    pub requests: u64,
    pub status_counts: BTreeMap<u16, u64>,
    pub avg_latency_us: u64,
    pub min_latency_us: u64,
    pub max_latency_us: u64,
}

impl From<&EndpointMetrics> for EndpointSummary {
    fn from(metrics: &EndpointMetrics) -> Self {
        Self {
            requests: metrics.latency_count,
            status_counts: metrics.status_counts.iter().map(|(k, v)| (*k, *v)).collect(),
            avg_latency_us: metrics.avg_latency_us(),
            min_latency_us: metrics.min_latency_us,
            max_latency_us: metrics.max_latency_us,
        }
    }
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.uptime_secs();
    let total_requests = state.get_request_count();
    let rps = if uptime > 0 {
        total_requests as f64 / uptime as f64
    } else {
        0.0
    };

    let endpoints = state
        .metrics
        .read()
        .await
        .iter()
        .map(|(endpoint, m)| (endpoint.clone(), EndpointSummary::from(m)))
        .collect();

    Json(MetricsResponse {
        uptime_seconds: uptime,
        total_requests,
        requests_per_second: rps,
        endpoints,
    })
}
