//! Admin Handlers
//!
//! API client management and role changes. Every handler takes `AdminUser`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use portico_auth::UserRole;

use crate::dto::{
    ApiClientDto, ApiResponse, CreateClientRequest, SetRoleRequest, UpdateClientRequest, UserDto,
};
use crate::error::ApiResult;
use crate::extractors::{AdminUser, ValidatedJson};
use crate::state::AppState;

/// List API clients
#[utoipa::path(
    get,
    path = "/api/admin/clients",
    tag = "Admin",
    responses(
        (status = 200, description = "All API clients", body = [ApiClientDto]),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not an admin")
    ),
    security(("bearer" = []))
)]
pub async fn list_clients(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<Json<ApiResponse<Vec<ApiClientDto>>>> {
    let clients = state.auth.list_clients().await?;
    Ok(Json(ApiResponse::new(
        clients.into_iter().map(ApiClientDto::from).collect(),
    )))
}

/// Register an API client
#[utoipa::path(
    post,
    path = "/api/admin/clients",
    tag = "Admin",
    request_body = CreateClientRequest,
    responses(
        (status = 201, description = "Client created", body = ApiClientDto),
        (status = 403, description = "Not an admin"),
        (status = 409, description = "API key already in use")
    ),
    security(("bearer" = []))
)]
pub async fn create_client(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ValidatedJson(request): ValidatedJson<CreateClientRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<ApiClientDto>>)> {
    let client = state
        .auth
        .create_client(&request.name, request.api_key.as_deref())
        .await?;

    tracing::info!(admin_id = admin.user_id, client_id = client.id, "Admin created API client");
    Ok((StatusCode::CREATED, Json(ApiResponse::new(client.into()))))
}

/// Activate or deactivate an API client
#[utoipa::path(
    patch,
    path = "/api/admin/clients/{id}",
    tag = "Admin",
    request_body = UpdateClientRequest,
    params(("id" = i64, Path, description = "Client id")),
    responses(
        (status = 200, description = "Client updated", body = ApiClientDto),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Unknown client")
    ),
    security(("bearer" = []))
)]
pub async fn update_client(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(client_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<UpdateClientRequest>,
) -> ApiResult<Json<ApiResponse<ApiClientDto>>> {
    let client = state
        .auth
        .set_client_active(client_id, request.is_active)
        .await?;
    Ok(Json(ApiResponse::new(client.into())))
}

/// Change a user's role
#[utoipa::path(
    patch,
    path = "/api/admin/users/{id}",
    tag = "Admin",
    request_body = SetRoleRequest,
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Role changed", body = UserDto),
        (status = 400, description = "Unknown role"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Unknown user")
    ),
    security(("bearer" = []))
)]
pub async fn set_role(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<SetRoleRequest>,
) -> ApiResult<Json<ApiResponse<UserDto>>> {
    let role: UserRole = request.role.parse()?;
    let user = state.auth.set_role(user_id, role).await?;

    tracing::info!(admin_id = admin.user_id, user_id, "Admin changed role");
    Ok(Json(ApiResponse::new(user.into())))
}
