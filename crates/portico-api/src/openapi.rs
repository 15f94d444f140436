//! OpenAPI Documentation
//!
//! OpenAPI 3.0 document for the Portico API, served at
//! `/api-docs/openapi.json`.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;

use crate::dto;
use crate::error::ErrorResponse;
use crate::handlers;

/// Portico API Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Portico API",
        description = "Authentication, profile, admin and internal identity endpoints.",
        version = "0.1.0"
    ),
    paths(
        // Health
        handlers::health::health_check,
        handlers::health::readiness_check,
        // Auth
        handlers::auth::register,
        handlers::auth::verify_code,
        handlers::auth::complete_profile,
        handlers::auth::login,
        handlers::auth::oauth_google,
        handlers::auth::logout,
        handlers::auth::forgot_password,
        handlers::auth::reset_password,
        handlers::auth::me,
        handlers::auth::status,
        // Users
        handlers::users::get_profile,
        handlers::users::update_profile,
        // Admin
        handlers::admin::list_clients,
        handlers::admin::create_client,
        handlers::admin::update_client,
        handlers::admin::set_role,
        // Internal
        handlers::internal::find_user,
        handlers::internal::create_user_email,
        handlers::internal::store_verification_code,
        handlers::internal::verify_code,
        handlers::internal::set_username_password,
        handlers::internal::set_oauth_user,
        handlers::internal::create_reset_token,
        handlers::internal::consume_reset_token,
        handlers::internal::set_password,
    ),
    components(
        schemas(
            // Common
            ErrorResponse,
            dto::AckResponse,
            handlers::health::ReadinessResponse,
            handlers::health::ComponentStatus,
            // Auth
            dto::RegisterRequest,
            dto::VerifyCodeRequest,
            dto::CompleteProfileRequest,
            dto::LoginRequest,
            dto::OAuthLoginRequest,
            dto::SessionResponse,
            dto::ForgotPasswordRequest,
            dto::ResetPasswordRequest,
            dto::StatusResponse,
            // Users
            dto::UserDto,
            dto::UpdateProfileRequest,
            // Admin
            dto::ApiClientDto,
            dto::CreateClientRequest,
            dto::UpdateClientRequest,
            dto::SetRoleRequest,
            // Internal
            dto::FindUserRequest,
            dto::CreateUserEmailRequest,
            dto::StoreCodeRequest,
            dto::InternalVerifyRequest,
            dto::VerifyOutcome,
            dto::SetUsernamePasswordRequest,
            dto::SetOAuthUserRequest,
            dto::CreateResetTokenRequest,
            dto::ConsumeResetTokenRequest,
            dto::SetPasswordRequest,
        )
    ),
    tags(
        (name = "Health", description = "Service health and readiness"),
        (name = "Authentication", description = "Registration, login and password reset"),
        (name = "Users", description = "Own profile"),
        (name = "Admin", description = "API clients and roles"),
        (name = "Internal", description = "Machine-to-machine identity operations")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Security scheme modifier
pub struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-api-key"))),
            );
        }
    }
}
