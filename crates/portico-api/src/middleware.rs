//! API Middleware

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::state::AppState;

/// Requests slower than this are logged at `warn`
const SLOW_REQUEST_MS: u128 = 1000;

/// Request timing middleware
pub async fn timing_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let response = next.run(req).await;

    let elapsed = start.elapsed();

    if elapsed.as_millis() > SLOW_REQUEST_MS {
        tracing::warn!(
            method = %method,
            uri = %uri,
            elapsed_ms = elapsed.as_millis(),
            "Slow request detected"
        );
    } else {
        tracing::debug!(
            method = %method,
            uri = %uri,
            elapsed_ms = elapsed.as_millis(),
            status = response.status().as_u16(),
            "Request completed"
        );
    }

    response
}

/// Key gate in front of a whole router
pub async fn require_client_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    match state
        .auth
        .authenticate_client(req.headers(), req.uri().query())
        .await
    {
        Ok(client) => {
            tracing::debug!(client_id = client.id, "API client authorized");
            next.run(req).await
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}
