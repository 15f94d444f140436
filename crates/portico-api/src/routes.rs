//! API Routes
//!
//! Route definitions for all API endpoints.

use axum::{
    routing::{get, patch, post},
    Json, Router,
};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::handlers;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Everything under `/api`
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/auth", auth_routes())
        .nest("/users", user_routes())
        .nest("/admin", admin_routes())
}

/// Authentication routes
fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/verify-code", post(handlers::auth::verify_code))
        .route("/complete-profile", post(handlers::auth::complete_profile))
        .route("/login", post(handlers::auth::login))
        .route("/oauth/google", post(handlers::auth::oauth_google))
        .route("/logout", post(handlers::auth::logout))
        .route("/forgot-password", post(handlers::auth::forgot_password))
        .route("/reset-password", post(handlers::auth::reset_password))
        .route("/me", get(handlers::auth::me))
        .route("/status", get(handlers::auth::status))
}

/// Profile routes (session gate)
fn user_routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/me",
        get(handlers::users::get_profile).patch(handlers::users::update_profile),
    )
}

/// Admin routes (session + admin gate)
fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/clients",
            get(handlers::admin::list_clients).post(handlers::admin::create_client),
        )
        .route("/clients/:id", patch(handlers::admin::update_client))
        .route("/users/:id", patch(handlers::admin::set_role))
}

/// Machine API (key gate on every handler)
pub fn internal_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/find-user", post(handlers::internal::find_user))
        .route("/create-user-email", post(handlers::internal::create_user_email))
        .route(
            "/store-verification-code",
            post(handlers::internal::store_verification_code),
        )
        .route("/verify-code", post(handlers::internal::verify_code))
        .route(
            "/set-username-password",
            post(handlers::internal::set_username_password),
        )
        .route("/set-oauth-user", post(handlers::internal::set_oauth_user))
        .route("/create-reset-token", post(handlers::internal::create_reset_token))
        .route("/consume-reset-token", post(handlers::internal::consume_reset_token))
        .route("/set-password", post(handlers::internal::set_password))
}

/// Health probes and the OpenAPI document
pub fn service_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/healthz", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
}
