//! Request gates
//!
//! Framework-independent halves of the session, admin and key gates. They
//! read credentials from request headers and return an explicit identity
//! value; the HTTP layer decides how to attach it to a handler.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use headers::{authorization::Bearer, Authorization, HeaderMapExt};
use tracing::debug;

use crate::api_key::{extract_api_key, ApiKeyCache};
use crate::error::{AuthError, AuthResult};
use crate::jwt::JwtService;
use crate::types::{AuthContext, ClientContext};

/// Session token from `Authorization: Bearer`, else from the session cookie
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
        let token = bearer.token().trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// Session gate: `Unauthenticated` without a credential, `InvalidToken`
/// when the credential does not verify
pub fn authenticate_session(
    jwt: &JwtService,
    headers: &HeaderMap,
    cookie_name: &str,
) -> AuthResult<AuthContext> {
    let token = extract_session_token(headers, cookie_name).ok_or(AuthError::Unauthenticated)?;
    let claims = jwt.verify(&token)?;
    let user_id = claims.user_id().ok_or(AuthError::InvalidToken)?;

    Ok(AuthContext {
        user_id,
        role: claims.role,
        email: claims.email,
    })
}

/// Optional session gate: never fails
pub fn authenticate_optional(
    jwt: &JwtService,
    headers: &HeaderMap,
    cookie_name: &str,
) -> Option<AuthContext> {
    match authenticate_session(jwt, headers, cookie_name) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            if !matches!(e, AuthError::Unauthenticated) {
                debug!(error = %e, "Ignoring invalid optional session");
            }
            None
        }
    }
}

/// Admin gate over an already-resolved session
pub fn require_admin(ctx: Option<AuthContext>) -> AuthResult<AuthContext> {
    let ctx = ctx.ok_or(AuthError::Unauthenticated)?;
    if ctx.is_admin() {
        Ok(ctx)
    } else {
        Err(AuthError::InsufficientPermissions)
    }
}

/// Key gate: `MissingApiKey` without a key, `InvalidApiKey` for unknown or
/// inactive clients
pub async fn authenticate_client(
    cache: &ApiKeyCache,
    headers: &HeaderMap,
    query: Option<&str>,
) -> AuthResult<ClientContext> {
    let key = extract_api_key(headers, query).ok_or(AuthError::MissingApiKey)?;
    cache.lookup(&key).await?.ok_or(AuthError::InvalidApiKey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::types::UserRole;
    use axum::http::header::{AUTHORIZATION, COOKIE};

    fn jwt() -> JwtService {
        JwtService::new(JwtConfig {
            secret: "test-secret-key-for-jwt-tokens-min-32-bytes!".to_string(),
            ..JwtConfig::default()
        })
    }

    #[test]
    fn test_header_beats_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer header-token".parse().unwrap());
        headers.insert(COOKIE, "token=cookie-token".parse().unwrap());

        let token = extract_session_token(&headers, "token");
        assert_eq!(token.as_deref(), Some("header-token"));
    }

    #[test]
    fn test_cookie_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, "other=value; token=cookie-token; more=stuff".parse().unwrap());

        let token = extract_session_token(&headers, "token");
        assert_eq!(token.as_deref(), Some("cookie-token"));
    }

    #[test]
    fn test_session_gate_outcomes() {
        let jwt = jwt();

        let headers = HeaderMap::new();
        assert!(matches!(
            authenticate_session(&jwt, &headers, "token"),
            Err(AuthError::Unauthenticated)
        ));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer garbage".parse().unwrap());
        assert!(matches!(
            authenticate_session(&jwt, &headers, "token"),
            Err(AuthError::InvalidToken)
        ));
        assert!(authenticate_optional(&jwt, &headers, "token").is_none());

        let token = jwt.sign(9, UserRole::User, "a@example.com").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bearer {}", token).parse().unwrap());
        let ctx = authenticate_session(&jwt, &headers, "token").unwrap();
        assert_eq!(ctx.user_id, 9);
        assert_eq!(ctx.email, "a@example.com");
    }

    #[test]
    fn test_admin_gate() {
        assert!(matches!(require_admin(None), Err(AuthError::Unauthenticated)));

        let user = AuthContext {
            user_id: 1,
            role: UserRole::User,
            email: "a@example.com".to_string(),
        };
        assert!(matches!(
            require_admin(Some(user.clone())),
            Err(AuthError::InsufficientPermissions)
        ));

        let admin = AuthContext {
            role: UserRole::Admin,
            ..user
        };
        assert!(require_admin(Some(admin)).is_ok());
    }
}
