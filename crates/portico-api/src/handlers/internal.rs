//! Internal machine API
//!
//! Thin wrappers over the identity store for a trusted backend service.
//! Every handler takes `AuthorizedClient`, so each call needs an active API
//! key. Absent users come back as `"data": null` rather than 404, except
//! where the write has no user-shaped response to null out.

use std::sync::Arc;

use axum::{extract::State, Json};
use portico_auth::one_time::hash_for_storage;
use portico_auth::AuthError;
use portico_db::OAuthProfile;

use crate::dto::{
    AckResponse, ApiResponse, ConsumeResetTokenRequest, CreateResetTokenRequest,
    CreateUserEmailRequest, FindUserRequest, InternalVerifyRequest, SetOAuthUserRequest,
    SetPasswordRequest, SetUsernamePasswordRequest, StoreCodeRequest, UserDto, VerifyOutcome,
};
use crate::error::ApiResult;
use crate::extractors::{AuthorizedClient, ValidatedJson};
use crate::state::AppState;

type MaybeUserResponse = Json<ApiResponse<Option<UserDto>>>;

fn normalized(email: &str) -> String {
    email.trim().to_lowercase()
}

fn maybe_user(user: Option<portico_db::DbUser>) -> MaybeUserResponse {
    Json(ApiResponse::new(user.map(UserDto::from)))
}

/// Find a user by id, email or provider identity
#[utoipa::path(
    post,
    path = "/internal/find-user",
    tag = "Internal",
    request_body = FindUserRequest,
    responses((status = 200, description = "User or null", body = UserDto)),
    security(("api_key" = []))
)]
pub async fn find_user(
    State(state): State<Arc<AppState>>,
    AuthorizedClient(_client): AuthorizedClient,
    ValidatedJson(request): ValidatedJson<FindUserRequest>,
) -> ApiResult<MaybeUserResponse> {
    let user = match request {
        FindUserRequest { id: Some(id), .. } => state.store.find_user_by_id(id).await?,
        FindUserRequest {
            email: Some(email), ..
        } => state.store.find_user_by_email(&normalized(&email)).await?,
        FindUserRequest {
            provider: Some(provider),
            oauth_id: Some(oauth_id),
            ..
        } => state.store.find_user_by_oauth(&provider, &oauth_id).await?,
        _ => None,
    };
    Ok(maybe_user(user))
}

/// Create (or return) an unverified email-only user
#[utoipa::path(
    post,
    path = "/internal/create-user-email",
    tag = "Internal",
    request_body = CreateUserEmailRequest,
    responses((status = 200, description = "User", body = UserDto)),
    security(("api_key" = []))
)]
pub async fn create_user_email(
    State(state): State<Arc<AppState>>,
    AuthorizedClient(_client): AuthorizedClient,
    ValidatedJson(request): ValidatedJson<CreateUserEmailRequest>,
) -> ApiResult<Json<ApiResponse<UserDto>>> {
    let user = state.store.create_unverified_by_email(&normalized(&request.email)).await?;
    Ok(Json(ApiResponse::new(user.into())))
}

/// Store a caller-generated verification code
#[utoipa::path(
    post,
    path = "/internal/store-verification-code",
    tag = "Internal",
    request_body = StoreCodeRequest,
    responses(
        (status = 200, description = "Stored", body = AckResponse),
        (status = 404, description = "Unknown user id")
    ),
    security(("api_key" = []))
)]
pub async fn store_verification_code(
    State(state): State<Arc<AppState>>,
    AuthorizedClient(client): AuthorizedClient,
    ValidatedJson(request): ValidatedJson<StoreCodeRequest>,
) -> ApiResult<Json<AckResponse>> {
    if state.store.find_user_by_id(request.user_id).await?.is_none() {
        return Err(AuthError::UserNotFound.into());
    }

    state
        .store
        .store_verification_code(request.user_id, &request.code, request.expires_at)
        .await?;

    tracing::debug!(client_id = client.id, user_id = request.user_id, "Verification code stored");
    Ok(Json(AckResponse::ok()))
}

/// Check and consume a verification code
#[utoipa::path(
    post,
    path = "/internal/verify-code",
    tag = "Internal",
    request_body = InternalVerifyRequest,
    responses((status = 200, description = "Outcome", body = VerifyOutcome)),
    security(("api_key" = []))
)]
pub async fn verify_code(
    State(state): State<Arc<AppState>>,
    AuthorizedClient(_client): AuthorizedClient,
    ValidatedJson(request): ValidatedJson<InternalVerifyRequest>,
) -> ApiResult<Json<VerifyOutcome>> {
    let Some(user) = state.store.find_user_by_email(&normalized(&request.email)).await? else {
        return Ok(Json(VerifyOutcome::rejected("no_user")));
    };

    let consumed = match state.store.find_valid_code(user.id, request.code.trim()).await? {
        Some(code) => state.store.consume_code(user.id, code.id).await?,
        None => false,
    };

    if consumed {
        Ok(Json(VerifyOutcome::verified(user.id)))
    } else {
        Ok(Json(VerifyOutcome::rejected("invalid_or_expired")))
    }
}

/// Set username and password on a verified user
#[utoipa::path(
    post,
    path = "/internal/set-username-password",
    tag = "Internal",
    request_body = SetUsernamePasswordRequest,
    responses(
        (status = 200, description = "User, or null when unknown or unverified", body = UserDto),
        (status = 409, description = "Username taken")
    ),
    security(("api_key" = []))
)]
pub async fn set_username_password(
    State(state): State<Arc<AppState>>,
    AuthorizedClient(_client): AuthorizedClient,
    ValidatedJson(request): ValidatedJson<SetUsernamePasswordRequest>,
) -> ApiResult<MaybeUserResponse> {
    let user = match state.store.find_user_by_email(&normalized(&request.email)).await? {
        Some(user) if user.is_email_verified => user,
        _ => return Ok(maybe_user(None)),
    };

    let password_hash = state.auth.password.hash_password(&request.password)?;
    let updated = state
        .store
        .complete_profile(user.id, request.username.trim(), &password_hash)
        .await?;
    Ok(maybe_user(updated))
}

/// Link or create an OAuth user
#[utoipa::path(
    post,
    path = "/internal/set-oauth-user",
    tag = "Internal",
    request_body = SetOAuthUserRequest,
    responses((status = 200, description = "User", body = UserDto)),
    security(("api_key" = []))
)]
pub async fn set_oauth_user(
    State(state): State<Arc<AppState>>,
    AuthorizedClient(_client): AuthorizedClient,
    ValidatedJson(request): ValidatedJson<SetOAuthUserRequest>,
) -> ApiResult<Json<ApiResponse<UserDto>>> {
    let profile = OAuthProfile {
        provider: request.provider,
        provider_id: request.oauth_id,
        email: normalized(&request.email),
        display_name: request.username,
        picture_url: request.picture_url,
    };

    let user = state.store.upsert_oauth_identity(&profile).await?;
    Ok(Json(ApiResponse::new(user.into())))
}

/// Store the digest of a caller-minted reset token
#[utoipa::path(
    post,
    path = "/internal/create-reset-token",
    tag = "Internal",
    request_body = CreateResetTokenRequest,
    responses((status = 200, description = "Owner, or null for an unknown email", body = UserDto)),
    security(("api_key" = []))
)]
pub async fn create_reset_token(
    State(state): State<Arc<AppState>>,
    AuthorizedClient(_client): AuthorizedClient,
    ValidatedJson(request): ValidatedJson<CreateResetTokenRequest>,
) -> ApiResult<MaybeUserResponse> {
    let Some(user) = state.store.find_user_by_email(&normalized(&request.email)).await? else {
        return Ok(maybe_user(None));
    };

    state
        .store
        .store_reset_token(user.id, &hash_for_storage(request.token.trim()), request.expires_at)
        .await?;
    Ok(maybe_user(Some(user)))
}

/// Mark a reset token used; returns its owner when this call won
#[utoipa::path(
    post,
    path = "/internal/consume-reset-token",
    tag = "Internal",
    request_body = ConsumeResetTokenRequest,
    responses((status = 200, description = "Owner, or null", body = UserDto)),
    security(("api_key" = []))
)]
pub async fn consume_reset_token(
    State(state): State<Arc<AppState>>,
    AuthorizedClient(_client): AuthorizedClient,
    ValidatedJson(request): ValidatedJson<ConsumeResetTokenRequest>,
) -> ApiResult<MaybeUserResponse> {
    let digest = hash_for_storage(request.token.trim());
    let Some(token) = state.store.find_valid_reset_token(&digest).await? else {
        return Ok(maybe_user(None));
    };

    if !state.store.mark_reset_token_used(token.id).await? {
        return Ok(maybe_user(None));
    }

    let user = state.store.find_user_by_id(token.user_id).await?;
    Ok(maybe_user(user))
}

/// Replace a user's password
#[utoipa::path(
    post,
    path = "/internal/set-password",
    tag = "Internal",
    request_body = SetPasswordRequest,
    responses((status = 200, description = "User, or null for an unknown id", body = UserDto)),
    security(("api_key" = []))
)]
pub async fn set_password(
    State(state): State<Arc<AppState>>,
    AuthorizedClient(_client): AuthorizedClient,
    ValidatedJson(request): ValidatedJson<SetPasswordRequest>,
) -> ApiResult<MaybeUserResponse> {
    let password_hash = state.auth.password.hash_password(&request.new_password)?;
    let user = state
        .store
        .set_credential(request.user_id, &password_hash)
        .await?;
    Ok(maybe_user(user))
}
