//! Request metrics middleware
//!
//! Counts requests per route template and status code and tracks latency,
//! exposed as JSON on `/metrics`.

use crate::state::AppState;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

/// Bucket for requests that matched no route
pub const UNMATCHED: &str = "unmatched";

/// Record count, status, and latency for every request
pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let endpoint = endpoint_key(&request);

    let response = next.run(request).await;

    let latency_us = start.elapsed().as_micros() as u64;
    state
        .record_request(endpoint, response.status().as_u16(), latency_us)
        .await;

    response
}

/// Route template such as `/api/v1/lists/:id`, so the key set is bounded by
/// the router rather than by client input
fn endpoint_key(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware::from_fn_with_state, routing::get, Router};
    use todo_core::config::AppConfig;
    use tower::ServiceExt;

    fn router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/items/:id", get(|| async { "ok" }))
            .layer(from_fn_with_state(state.clone(), metrics_middleware))
            .with_state(state)
    }

    async fn get_path(router: &Router, path: &str) {
        router
            .clone()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_keys_use_route_template() {
        let state = Arc::new(AppState::in_memory(AppConfig::default()));
        let router = router(state.clone());

        get_path(&router, "/items/1").await;
        get_path(&router, "/items/550e8400-e29b-41d4-a716-446655440000").await;

        let metrics = state.metrics.read().await;
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics["/items/:id"].status_counts[&200], 2);
    }

    #[tokio::test]
    async fn test_unknown_paths_share_one_bucket() {
        let state = Arc::new(AppState::in_memory(AppConfig::default()));
        let router = router(state.clone());

        for i in 0..50 {
            get_path(&router, &format!("/nope-{i}")).await;
        }

        let metrics = state.metrics.read().await;
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[UNMATCHED].status_counts[&404], 50);
        assert_eq!(state.get_request_count(), 50);
    }
}
