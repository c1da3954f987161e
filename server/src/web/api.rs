pub mod v1;

use std::sync::Arc;

use crate::{
    auth::{self, AuthState},
    task::web::TaskState,
    user::web::UserState,
};

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
};

use tower::ServiceBuilder;

/// Creates the API routes for JSON API endpoints.
/// Registration, login, and password reset are public; everything else
/// requires a bearer token.
pub fn create_api_router(
    auth_state: Arc<AuthState>,
    user_state: Arc<UserState>,
    task_state: Arc<TaskState>,
) -> axum::Router {
    let auth_router = auth::api::v1::create_api_router(auth_state.clone());
    let user_router = crate::user::api::v1::create_api_router(user_state);
    let task_router = crate::task::api::v1::create_api_router(task_state);
    let protected_routes = user_router
        .merge(task_router)
        .layer(ServiceBuilder::new().layer(from_fn(auth::api::v1::require_auth_middleware)));
    let public_routes = auth_router;
    let api_routes = public_routes.merge(protected_routes);
    Router::new()
        .nest("/api/v1", api_routes)
        .layer(ServiceBuilder::new().layer(from_fn_with_state(
            auth_state,
            auth::api::v1::auth_user_middleware,
        )))
}
