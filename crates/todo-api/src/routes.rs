//! API route definitions

use crate::auth::middleware::auth_middleware;
use crate::handlers::{auth, lists, tasks};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Create API v1 routes
pub fn api_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (bearer access token required)
    let protected_routes = Router::new()
        .route("/auth/logout-all", post(auth::logout_all_handler))
        .route(
            "/auth/me",
            get(auth::me_handler).patch(auth::update_me_handler),
        )
        .route("/lists", get(lists::list_lists).post(lists::create_list))
        .route("/lists/:id", get(lists::get_list).delete(lists::delete_list))
        .route(
            "/lists/:id/tasks",
            get(lists::list_tasks).post(lists::create_task),
        )
        .route(
            "/tasks/:id",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route_layer(middleware::from_fn_with_state(
            state.guard.clone(),
            auth_middleware,
        ));

    Router::new().merge(public_routes).merge(protected_routes)
}
