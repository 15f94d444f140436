//! Authentication Handlers
//!
//! Endpoints for registration, verification, login, OAuth, password reset
//! and session status. Sessions are returned in the body and set as an
//! httpOnly cookie.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use portico_auth::{config::SameSitePolicy, config::SessionConfig, AuthError, AuthSession};
use portico_db::OAuthProfile;

use crate::dto::{
    AckResponse, ApiResponse, CompleteProfileRequest, ForgotPasswordRequest, LoginRequest,
    OAuthLoginRequest, RegisterRequest, ResetPasswordRequest, SessionResponse, StatusResponse,
    UserDto, VerifyCodeRequest,
};
use crate::error::ApiResult;
use crate::extractors::{AuthorizedClient, CurrentUser, MaybeUser, ValidatedJson};
use crate::state::AppState;

// =============================================================================
// Session cookie
// =============================================================================

fn same_site(policy: SameSitePolicy) -> SameSite {
    match policy {
        SameSitePolicy::Strict => SameSite::Strict,
        SameSitePolicy::Lax => SameSite::Lax,
        SameSitePolicy::None => SameSite::None,
    }
}

fn session_cookie(config: &SessionConfig, token: String, remember: bool) -> Cookie<'static> {
    let max_age = time::Duration::try_from(config.max_age(remember)).unwrap_or(time::Duration::DAY);

    Cookie::build((config.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(same_site(config.cookie_same_site))
        .max_age(max_age)
        .build()
}

fn session_response(
    state: &AppState,
    jar: CookieJar,
    session: AuthSession,
    remember: bool,
) -> (CookieJar, Json<ApiResponse<SessionResponse>>) {
    let cookie = session_cookie(&state.auth.config().session, session.token.clone(), remember);
    let body = ApiResponse::new(SessionResponse {
        token: session.token,
        user: session.user.into(),
    });
    (jar.add(cookie), Json(body))
}

// =============================================================================
// Registration
// =============================================================================

/// Register
///
/// Without a password: creates or reuses the unverified account and sends a
/// verification code (200, no session). With a password: creates a verified
/// account directly (201 with a session).
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Verification code sent", body = AckResponse),
        (status = 201, description = "Account created", body = SessionResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Email or username already registered")
    )
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> ApiResult<Response> {
    match request.password.as_deref() {
        Some(password) => {
            let session = state
                .auth
                .register_direct(&request.email, request.username.as_deref(), password)
                .await?;
            let (jar, body) = session_response(&state, jar, session, false);
            Ok((StatusCode::CREATED, jar, body).into_response())
        }
        None => {
            state.auth.register(&request.email).await?;
            Ok(Json(AckResponse::with_message("Verification code sent")).into_response())
        }
    }
}

/// Verify the emailed code
#[utoipa::path(
    post,
    path = "/api/auth/verify-code",
    tag = "Authentication",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "Email verified", body = AckResponse),
        (status = 400, description = "Invalid or expired code"),
        (status = 404, description = "Unknown email")
    )
)]
pub async fn verify_code(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<VerifyCodeRequest>,
) -> ApiResult<Json<AckResponse>> {
    state.auth.verify_code(&request.email, &request.code).await?;
    Ok(Json(AckResponse::with_message("Email verified")))
}

/// Set username and password after verification
#[utoipa::path(
    post,
    path = "/api/auth/complete-profile",
    tag = "Authentication",
    request_body = CompleteProfileRequest,
    responses(
        (status = 200, description = "Profile completed", body = SessionResponse),
        (status = 400, description = "Email not verified"),
        (status = 409, description = "Username taken or profile already completed")
    )
)]
pub async fn complete_profile(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ValidatedJson(request): ValidatedJson<CompleteProfileRequest>,
) -> ApiResult<(CookieJar, Json<ApiResponse<SessionResponse>>)> {
    let session = state
        .auth
        .complete_profile(&request.email, &request.username, &request.password)
        .await?;
    Ok(session_response(&state, jar, session, request.remember))
}

// =============================================================================
// Login
// =============================================================================

/// Password login
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = SessionResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> ApiResult<(CookieJar, Json<ApiResponse<SessionResponse>>)> {
    let session = state.auth.login(&request.email, &request.password).await?;
    Ok(session_response(&state, jar, session, request.remember))
}

/// Google sign-in
///
/// The body is an identity the calling backend has already verified with
/// Google, so the route always sits behind the key gate regardless of
/// `require_client_key`.
#[utoipa::path(
    post,
    path = "/api/auth/oauth/google",
    tag = "Authentication",
    request_body = OAuthLoginRequest,
    responses(
        (status = 200, description = "Login successful", body = SessionResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Missing or invalid API key")
    ),
    security(("api_key" = []))
)]
pub async fn oauth_google(
    State(state): State<Arc<AppState>>,
    AuthorizedClient(client): AuthorizedClient,
    jar: CookieJar,
    ValidatedJson(request): ValidatedJson<OAuthLoginRequest>,
) -> ApiResult<(CookieJar, Json<ApiResponse<SessionResponse>>)> {
    tracing::debug!(client_id = client.id, "OAuth login relayed by API client");

    let profile = OAuthProfile {
        provider: "google".to_string(),
        provider_id: request.oauth_id,
        email: request.email,
        display_name: request.username,
        picture_url: request.picture_url,
    };

    let session = state.auth.oauth_login(profile).await?;
    Ok(session_response(&state, jar, session, request.remember))
}

/// Clear the session cookie. Tokens stay valid until they expire.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Authentication",
    responses(
        (status = 200, description = "Session cookie cleared", body = AckResponse)
    )
)]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<AckResponse>) {
    // Added rather than removed: the jar only emits removals for cookies
    // the request carried
    let mut removal = Cookie::build((state.auth.config().session.cookie_name.clone(), ""))
        .path("/")
        .build();
    removal.make_removal();
    (jar.add(removal), Json(AckResponse::ok()))
}

// =============================================================================
// Password Reset
// =============================================================================

/// Request a reset link. Succeeds whether or not the email is known.
#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    tag = "Authentication",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset link sent if the account exists", body = AckResponse)
    )
)]
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<ForgotPasswordRequest>,
) -> ApiResult<Json<AckResponse>> {
    state.auth.forgot_password(&request.email).await?;
    Ok(Json(AckResponse::with_message(
        "If the account exists, a reset link has been sent",
    )))
}

/// Redeem a reset token
#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    tag = "Authentication",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = AckResponse),
        (status = 400, description = "Invalid or expired token")
    )
)]
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<ResetPasswordRequest>,
) -> ApiResult<Json<AckResponse>> {
    state
        .auth
        .reset_password(&request.token, &request.password)
        .await?;
    Ok(Json(AckResponse::with_message("Password changed")))
}

// =============================================================================
// Identity
// =============================================================================

/// Current user
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Authentication",
    responses(
        (status = 200, description = "Current user", body = UserDto),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer" = []))
)]
pub async fn me(
    State(state): State<Arc<AppState>>,
    CurrentUser(ctx): CurrentUser,
) -> ApiResult<Json<ApiResponse<UserDto>>> {
    let user = state
        .auth
        .current_user(ctx.user_id)
        .await
        .map_err(|e| match e {
            // The token outlived its account
            AuthError::UserNotFound => AuthError::InvalidToken,
            other => other,
        })?;
    Ok(Json(ApiResponse::new(user.into())))
}

/// Session status
#[utoipa::path(
    get,
    path = "/api/auth/status",
    tag = "Authentication",
    responses(
        (status = 200, description = "Session status", body = StatusResponse)
    )
)]
pub async fn status(
    State(state): State<Arc<AppState>>,
    MaybeUser(ctx): MaybeUser,
) -> ApiResult<Json<StatusResponse>> {
    let user = match ctx {
        Some(ctx) => match state.auth.current_user(ctx.user_id).await {
            Ok(user) => Some(user),
            Err(AuthError::UserNotFound) => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };

    Ok(Json(StatusResponse {
        authenticated: user.is_some(),
        user: user.map(UserDto::from),
    }))
}
