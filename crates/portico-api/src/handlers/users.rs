//! Profile Handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use portico_db::ProfilePatch;

use crate::dto::{ApiResponse, UpdateProfileRequest, UserDto};
use crate::error::ApiResult;
use crate::extractors::{CurrentUser, ValidatedJson};
use crate::state::AppState;

/// Own profile
#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "Users",
    responses(
        (status = 200, description = "Current user", body = UserDto),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "User no longer exists")
    ),
    security(("bearer" = []))
)]
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    CurrentUser(ctx): CurrentUser,
) -> ApiResult<Json<ApiResponse<UserDto>>> {
    let user = state.auth.current_user(ctx.user_id).await?;
    Ok(Json(ApiResponse::new(user.into())))
}

/// Edit own username or picture
#[utoipa::path(
    patch,
    path = "/api/users/me",
    tag = "Users",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserDto),
        (status = 401, description = "Not authenticated"),
        (status = 409, description = "Username taken")
    ),
    security(("bearer" = []))
)]
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    CurrentUser(ctx): CurrentUser,
    ValidatedJson(request): ValidatedJson<UpdateProfileRequest>,
) -> ApiResult<Json<ApiResponse<UserDto>>> {
    let patch = ProfilePatch {
        username: request.username,
        profile_picture_url: request.profile_picture_url,
    };

    let user = state.auth.update_profile(ctx.user_id, patch).await?;
    tracing::info!(user_id = ctx.user_id, "Profile updated");
    Ok(Json(ApiResponse::new(user.into())))
}
