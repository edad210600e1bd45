//! To-do API - REST server and authentication engine
//!
//! Provides registration, login, refresh-token rotation, logout, profile
//! management, and ownership-checked list and task endpoints.

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use state::AppState;
use std::sync::Arc;
use todo_core::config::AppConfig;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

/// OpenAPI document for every public endpoint
#[derive(OpenApi)]
#[openapi(
    info(
        title = "To-do API",
        description = "To-do lists and tasks behind JWT bearer authentication. \
                       Access tokens are short-lived; refresh tokens rotate on every use."
    ),
    paths(
        handlers::health::health_check,
        handlers::health::readiness_check,
        handlers::auth::register_handler,
        handlers::auth::login_handler,
        handlers::auth::refresh_handler,
        handlers::auth::logout_handler,
        handlers::auth::logout_all_handler,
        handlers::auth::me_handler,
        handlers::auth::update_me_handler,
        handlers::lists::list_lists,
        handlers::lists::create_list,
        handlers::lists::get_list,
        handlers::lists::delete_list,
        handlers::lists::list_tasks,
        handlers::lists::create_task,
        handlers::tasks::get_task,
        handlers::tasks::update_task,
        handlers::tasks::delete_task,
    ),
    components(schemas(
        error::ApiError,
        auth::RegisterRequest,
        auth::LoginRequest,
        auth::RefreshRequest,
        auth::LogoutRequest,
        auth::UpdateProfileRequest,
        auth::UserPublic,
        auth::AuthResponse,
        auth::TokenPair,
        handlers::health::HealthResponse,
        handlers::health::ReadinessResponse,
        handlers::lists::CreateListRequest,
        handlers::lists::ListResponse,
        handlers::tasks::CreateTaskRequest,
        handlers::tasks::UpdateTaskRequest,
        handlers::tasks::TaskResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Liveness and readiness"),
        (name = "auth", description = "Registration, login, tokens, and profile"),
        (name = "lists", description = "To-do lists"),
        (name = "tasks", description = "Tasks"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::health::metrics))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api/v1", routes::api_routes(&state))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::metrics_middleware,
        ))
        .layer(axum_middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Router over fresh in-memory stores with default configuration
pub fn create_router_for_testing() -> Router {
    create_router(Arc::new(AppState::in_memory(AppConfig::default())))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
