//! Custom Axum Extractors
//!
//! The session, admin and key gates as typed extractors. A handler that
//! names one of these receives the verified identity as a value; a request
//! that fails the gate never reaches the handler.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};
use portico_auth::{middleware::require_admin, AuthContext, ClientContext};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Session Gate
// =============================================================================

/// Verified session; rejects with `AUTH_REQUIRED` or `AUTH_INVALID`
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthContext);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let ctx = state.auth.authenticate(&parts.headers)?;
        Ok(CurrentUser(ctx))
    }
}

/// Session when one verifies, otherwise `None`
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthContext>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(state.auth.authenticate_optional(&parts.headers)))
    }
}

// =============================================================================
// Admin Gate
// =============================================================================

/// Verified session holding the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthContext);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let ctx = state.auth.authenticate(&parts.headers)?;
        Ok(AdminUser(require_admin(Some(ctx))?))
    }
}

// =============================================================================
// Key Gate
// =============================================================================

/// Active API client resolved from `x-api-key` or the query string
#[derive(Debug, Clone)]
pub struct AuthorizedClient(pub ClientContext);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthorizedClient {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let client = state
            .auth
            .authenticate_client(&parts.headers, parts.uri.query())
            .await?;
        Ok(AuthorizedClient(client))
    }
}

// =============================================================================
// Validated JSON Extractor
// =============================================================================

/// JSON body that has passed its `validator` rules
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}
