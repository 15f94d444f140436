//! API Integration Tests
//!
//! Drives the real router over the in-memory identity store. Verification
//! codes and reset tokens are captured from a channel delivery sink.

use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum_test::{TestResponse, TestServer};
use portico_api::{create_router, ApiConfig, AppState};
use portico_auth::{AuthConfig, AuthService, ChannelDelivery, DeliveryMessage, UserRole};
use portico_db::{IdentityStore, MemoryStore, NewPasswordUser};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

struct TestApp {
    server: TestServer,
    auth: Arc<AuthService>,
    store: Arc<MemoryStore>,
    outbox: UnboundedReceiver<DeliveryMessage>,
}

impl TestApp {
    fn new() -> Self {
        Self::with_api_config(ApiConfig::default())
    }

    fn with_api_config(api_config: ApiConfig) -> Self {
        let mut config = AuthConfig::default();
        config.jwt.secret = "test-secret-key-for-jwt-tokens-min-32-bytes!".to_string();
        config.password.memory_cost = 4096;
        config.password.time_cost = 1;

        let store = Arc::new(MemoryStore::new());
        let (delivery, outbox) = ChannelDelivery::new();
        let auth = Arc::new(AuthService::new(store.clone(), Arc::new(delivery), config));
        let state = Arc::new(AppState::new(auth.clone()));

        let server = TestServer::new(create_router(state, api_config)).unwrap();
        Self {
            server,
            auth,
            store,
            outbox,
        }
    }

    fn take_code(&mut self) -> String {
        match self.outbox.try_recv().unwrap() {
            DeliveryMessage::VerificationCode { code, .. } => code,
            other => panic!("expected a verification code, got {:?}", other),
        }
    }

    fn take_reset_token(&mut self) -> String {
        match self.outbox.try_recv().unwrap() {
            DeliveryMessage::PasswordReset { token, .. } => token,
            other => panic!("expected a reset token, got {:?}", other),
        }
    }

    /// Runs the email-code flow to completion and returns the session token
    async fn signed_up(&mut self, email: &str, username: &str, password: &str) -> String {
        self.server
            .post("/api/auth/register")
            .json(&json!({ "email": email }))
            .await
            .assert_status_ok();
        let code = self.take_code();

        self.server
            .post("/api/auth/verify-code")
            .json(&json!({ "email": email, "code": code }))
            .await
            .assert_status_ok();

        let response = self
            .server
            .post("/api/auth/complete-profile")
            .json(&json!({ "email": email, "username": username, "password": password }))
            .await;
        response.assert_status_ok();
        response.json::<Value>()["data"]["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    async fn admin_token(&self) -> String {
        let user = self
            .store
            .create_user_with_password(&NewPasswordUser {
                email: "root@portico.dev".to_string(),
                username: Some("root".to_string()),
                password_hash: self.auth.password.hash_password("rootpass").unwrap(),
            })
            .await
            .unwrap();
        self.store.set_role(user.id, "admin").await.unwrap();
        self.auth
            .jwt
            .sign(user.id, UserRole::Admin, &user.email)
            .unwrap()
    }

    async fn api_key(&self) -> String {
        self.auth.create_client("billing", None).await.unwrap().api_key
    }
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

fn api_key_header() -> HeaderName {
    HeaderName::from_static("x-api-key")
}

fn error_code(response: &TestResponse) -> String {
    response.json::<Value>()["code"].as_str().unwrap_or_default().to_string()
}

// =============================================================================
// Service Endpoints
// =============================================================================

mod service_endpoints {
    use super::*;

    #[tokio::test]
    async fn test_healthz() {
        let app = TestApp::new();
        let response = app.server.get("/healthz").await;

        response.assert_status_ok();
        assert_eq!(response.json::<Value>(), json!({ "ok": true }));
    }

    #[tokio::test]
    async fn test_ready() {
        let app = TestApp::new();
        let response = app.server.get("/ready").await;

        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["database"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let app = TestApp::new();
        let response = app.server.get("/api-docs/openapi.json").await;

        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["info"]["title"], "Portico API");
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let app = TestApp::new();
        let response = app.server.get("/healthz").await;
        assert!(!response.header("x-request-id").is_empty());
    }
}

// =============================================================================
// Registration and Login
// =============================================================================

mod auth_flows {
    use super::*;

    #[tokio::test]
    async fn test_email_code_signup() {
        let mut app = TestApp::new();

        let response = app
            .server
            .post("/api/auth/register")
            .json(&json!({ "email": "A@B.com" }))
            .await;
        response.assert_status_ok();
        assert!(response.json::<Value>().get("data").is_none());

        let code = app.take_code();
        assert_eq!(code.len(), 6);

        app.server
            .post("/api/auth/verify-code")
            .json(&json!({ "email": "a@b.com", "code": code }))
            .await
            .assert_status_ok();

        // Second use of the same code fails
        let replay = app
            .server
            .post("/api/auth/verify-code")
            .json(&json!({ "email": "a@b.com", "code": code }))
            .await;
        replay.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&replay), "CODE_INVALID_OR_EXPIRED");

        let response = app
            .server
            .post("/api/auth/complete-profile")
            .json(&json!({ "email": "a@b.com", "username": "alice", "password": "hunter22" }))
            .await;
        response.assert_status_ok();

        let set_cookie = response.header(header::SET_COOKIE);
        let set_cookie = set_cookie.to_str().unwrap();
        assert!(set_cookie.starts_with("token="));
        assert!(set_cookie.contains("HttpOnly"));

        let body = response.json::<Value>();
        assert_eq!(body["ok"], true);
        assert_eq!(body["data"]["user"]["username"], "alice");
        assert!(body["data"]["user"].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn test_reregistering_verified_email_conflicts() {
        let mut app = TestApp::new();
        app.signed_up("a@b.com", "alice", "hunter22").await;

        let response = app
            .server
            .post("/api/auth/register")
            .json(&json!({ "email": "a@b.com" }))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(error_code(&response), "EMAIL_ALREADY_REGISTERED");
    }

    #[tokio::test]
    async fn test_direct_registration() {
        let app = TestApp::new();

        let response = app
            .server
            .post("/api/auth/register")
            .json(&json!({ "email": "d@b.com", "username": "dee", "password": "hunter22" }))
            .await;
        response.assert_status(StatusCode::CREATED);

        let body = response.json::<Value>();
        assert!(body["data"]["token"].as_str().is_some());
        assert_eq!(body["data"]["user"]["is_email_verified"], true);

        let taken = app
            .server
            .post("/api/auth/register")
            .json(&json!({ "email": "e@b.com", "username": "dee", "password": "hunter22" }))
            .await;
        taken.assert_status(StatusCode::CONFLICT);
        assert_eq!(error_code(&taken), "USERNAME_TAKEN");
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let mut app = TestApp::new();
        app.signed_up("a@b.com", "alice", "hunter22").await;

        let unknown = app
            .server
            .post("/api/auth/login")
            .json(&json!({ "email": "x@y.com", "password": "wrong!" }))
            .await;
        let wrong = app
            .server
            .post("/api/auth/login")
            .json(&json!({ "email": "a@b.com", "password": "wrong!" }))
            .await;

        unknown.assert_status(StatusCode::UNAUTHORIZED);
        wrong.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.json::<Value>(), wrong.json::<Value>());
    }

    #[tokio::test]
    async fn test_login_then_me() {
        let mut app = TestApp::new();
        app.signed_up("a@b.com", "alice", "hunter22").await;

        let login = app
            .server
            .post("/api/auth/login")
            .json(&json!({ "email": "a@b.com", "password": "hunter22", "remember": true }))
            .await;
        login.assert_status_ok();
        let token = login.json::<Value>()["data"]["token"].as_str().unwrap().to_string();

        let me = app
            .server
            .get("/api/auth/me")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await;
        me.assert_status_ok();
        assert_eq!(me.json::<Value>()["data"]["email"], "a@b.com");

        // Same token through the cookie transport
        let me = app
            .server
            .get("/api/auth/me")
            .add_header(
                header::COOKIE,
                HeaderValue::from_str(&format!("token={}", token)).unwrap(),
            )
            .await;
        me.assert_status_ok();
    }

    #[tokio::test]
    async fn test_oauth_login() {
        let app = TestApp::new();
        let payload = json!({
            "email": "g@b.com",
            "oauthId": "google-123",
            "username": "gee",
            "pictureUrl": "https://img.example.com/g.png"
        });

        let key = HeaderValue::from_str(&app.api_key().await).unwrap();

        let first = app
            .server
            .post("/api/auth/oauth/google")
            .add_header(api_key_header(), key.clone())
            .json(&payload)
            .await;
        first.assert_status_ok();
        let second = app
            .server
            .post("/api/auth/oauth/google")
            .add_header(api_key_header(), key)
            .json(&payload)
            .await;
        second.assert_status_ok();

        let first = first.json::<Value>();
        let second = second.json::<Value>();
        assert_eq!(first["data"]["user"]["id"], second["data"]["user"]["id"]);
        assert_eq!(first["data"]["user"]["oauth_provider"], "google");
    }

    #[tokio::test]
    async fn test_oauth_login_requires_api_key() {
        let mut app = TestApp::new();
        app.signed_up("victim@x.com", "victim", "hunter22").await;
        let payload = json!({ "email": "victim@x.com", "oauthId": "attacker-1" });

        let anonymous = app.server.post("/api/auth/oauth/google").json(&payload).await;
        anonymous.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&anonymous), "API_KEY_REQUIRED");
        assert!(anonymous.json::<Value>().get("data").is_none());

        let forged = app
            .server
            .post("/api/auth/oauth/google")
            .add_header(api_key_header(), HeaderValue::from_static("not-a-client-key"))
            .json(&payload)
            .await;
        forged.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&forged), "API_KEY_INVALID");

        // The account was not linked to the supplied identity
        let victim = app.store.find_user_by_email("victim@x.com").await.unwrap().unwrap();
        assert!(victim.oauth_provider.is_none());
    }

    #[tokio::test]
    async fn test_token_for_deleted_account() {
        let app = TestApp::new();
        let orphan = app
            .auth
            .jwt
            .sign(9999, UserRole::User, "gone@b.com")
            .unwrap();

        let me = app
            .server
            .get("/api/auth/me")
            .add_header(header::AUTHORIZATION, bearer(&orphan))
            .await;
        me.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&me), "AUTH_INVALID");

        let status = app
            .server
            .get("/api/auth/status")
            .add_header(header::AUTHORIZATION, bearer(&orphan))
            .await;
        status.assert_status_ok();
        let body = status.json::<Value>();
        assert_eq!(body["authenticated"], false);
        assert!(body.get("user").is_none());
    }

    #[tokio::test]
    async fn test_logout_expires_cookie() {
        let app = TestApp::new();
        let response = app.server.post("/api/auth/logout").await;

        response.assert_status_ok();
        let set_cookie = response.header(header::SET_COOKIE);
        let set_cookie = set_cookie.to_str().unwrap();
        assert!(set_cookie.starts_with("token="));
        assert!(set_cookie.contains("Max-Age=0"));
    }
}

// =============================================================================
// Password Reset
// =============================================================================

mod password_reset {
    use super::*;

    #[tokio::test]
    async fn test_unknown_email_looks_like_known_email() {
        let mut app = TestApp::new();
        app.signed_up("a@b.com", "alice", "hunter22").await;

        let unknown = app
            .server
            .post("/api/auth/forgot-password")
            .json(&json!({ "email": "unknown@x.com" }))
            .await;
        let known = app
            .server
            .post("/api/auth/forgot-password")
            .json(&json!({ "email": "a@b.com" }))
            .await;

        unknown.assert_status_ok();
        known.assert_status_ok();
        assert_eq!(unknown.json::<Value>(), known.json::<Value>());
    }

    #[tokio::test]
    async fn test_reset_token_works_once() {
        let mut app = TestApp::new();
        app.signed_up("a@b.com", "alice", "hunter22").await;

        app.server
            .post("/api/auth/forgot-password")
            .json(&json!({ "email": "a@b.com" }))
            .await
            .assert_status_ok();
        let token = app.take_reset_token();

        app.server
            .post("/api/auth/reset-password")
            .json(&json!({ "token": token, "password": "newpass1" }))
            .await
            .assert_status_ok();

        let replay = app
            .server
            .post("/api/auth/reset-password")
            .json(&json!({ "token": token, "password": "newpass2" }))
            .await;
        replay.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&replay), "RESET_TOKEN_INVALID_OR_EXPIRED");

        app.server
            .post("/api/auth/login")
            .json(&json!({ "email": "a@b.com", "password": "newpass1" }))
            .await
            .assert_status_ok();
    }
}

// =============================================================================
// Gates and Errors
// =============================================================================

mod gates {
    use super::*;

    #[tokio::test]
    async fn test_missing_and_invalid_session() {
        let app = TestApp::new();

        let missing = app.server.get("/api/users/me").await;
        missing.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&missing), "AUTH_REQUIRED");

        let invalid = app
            .server
            .get("/api/users/me")
            .add_header(header::AUTHORIZATION, bearer("not-a-jwt"))
            .await;
        invalid.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&invalid), "AUTH_INVALID");
    }

    #[tokio::test]
    async fn test_status() {
        let mut app = TestApp::new();

        let anonymous = app.server.get("/api/auth/status").await;
        anonymous.assert_status_ok();
        assert_eq!(anonymous.json::<Value>(), json!({ "authenticated": false }));

        let token = app.signed_up("a@b.com", "alice", "hunter22").await;
        let signed_in = app
            .server
            .get("/api/auth/status")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await;
        let body = signed_in.json::<Value>();
        assert_eq!(body["authenticated"], true);
        assert_eq!(body["user"]["username"], "alice");
    }

    #[tokio::test]
    async fn test_validation_error_details() {
        let app = TestApp::new();
        let response = app
            .server
            .post("/api/auth/login")
            .json(&json!({ "email": "not-an-email", "password": "hunter22" }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body = response.json::<Value>();
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["details"]["email"].is_array());
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let app = TestApp::new();
        let response = app
            .server
            .post("/api/auth/login")
            .content_type("application/json")
            .text("{not json")
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&response), "INVALID_BODY");
    }

    #[tokio::test]
    async fn test_profile_update_username_collision() {
        let mut app = TestApp::new();
        app.signed_up("a@b.com", "alice", "hunter22").await;
        let token = app.signed_up("b@b.com", "bob", "hunter22").await;

        let response = app
            .server
            .patch("/api/users/me")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .json(&json!({ "username": "alice" }))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(error_code(&response), "USERNAME_TAKEN");

        let response = app
            .server
            .patch("/api/users/me")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .json(&json!({ "username": "bobby" }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["data"]["username"], "bobby");
    }

    #[tokio::test]
    async fn test_client_key_on_whole_api() {
        let app = TestApp::with_api_config(ApiConfig {
            require_client_key: true,
            ..ApiConfig::default()
        });
        let key = app.api_key().await;

        let missing = app.server.get("/api/auth/status").await;
        missing.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&missing), "API_KEY_REQUIRED");

        app.server
            .get("/api/auth/status")
            .add_header(api_key_header(), HeaderValue::from_str(&key).unwrap())
            .await
            .assert_status_ok();

        // Probes stay open
        app.server.get("/healthz").await.assert_status_ok();
    }
}

// =============================================================================
// Admin
// =============================================================================

mod admin {
    use super::*;

    #[tokio::test]
    async fn test_admin_gate() {
        let mut app = TestApp::new();
        let token = app.signed_up("a@b.com", "alice", "hunter22").await;

        let response = app
            .server
            .get("/api/admin/clients")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(error_code(&response), "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_client_lifecycle() {
        let app = TestApp::new();
        let admin = app.admin_token().await;

        let created = app
            .server
            .post("/api/admin/clients")
            .add_header(header::AUTHORIZATION, bearer(&admin))
            .json(&json!({ "name": "reports", "api_key": "reports-key-1" }))
            .await;
        created.assert_status(StatusCode::CREATED);
        let id = created.json::<Value>()["data"]["id"].as_i64().unwrap();

        let duplicate = app
            .server
            .post("/api/admin/clients")
            .add_header(header::AUTHORIZATION, bearer(&admin))
            .json(&json!({ "name": "copy", "api_key": "reports-key-1" }))
            .await;
        duplicate.assert_status(StatusCode::CONFLICT);
        assert_eq!(error_code(&duplicate), "API_KEY_TAKEN");

        let find = json!({ "id": 1 });
        app.server
            .post("/internal/find-user")
            .add_header(api_key_header(), HeaderValue::from_static("reports-key-1"))
            .json(&find)
            .await
            .assert_status_ok();

        app.server
            .patch(&format!("/api/admin/clients/{}", id))
            .add_header(header::AUTHORIZATION, bearer(&admin))
            .json(&json!({ "is_active": false }))
            .await
            .assert_status_ok();

        // Deactivation invalidated the cache
        let rejected = app
            .server
            .post("/internal/find-user")
            .add_header(api_key_header(), HeaderValue::from_static("reports-key-1"))
            .json(&find)
            .await;
        rejected.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&rejected), "API_KEY_INVALID");

        let listed = app
            .server
            .get("/api/admin/clients")
            .add_header(header::AUTHORIZATION, bearer(&admin))
            .await;
        listed.assert_status_ok();
        assert_eq!(listed.json::<Value>()["data"][0]["is_active"], false);

        let missing = app
            .server
            .patch("/api/admin/clients/9999")
            .add_header(header::AUTHORIZATION, bearer(&admin))
            .json(&json!({ "is_active": true }))
            .await;
        missing.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(error_code(&missing), "CLIENT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_set_role() {
        let mut app = TestApp::new();
        let admin = app.admin_token().await;
        app.signed_up("a@b.com", "alice", "hunter22").await;
        let alice = app.store.find_user_by_email("a@b.com").await.unwrap().unwrap();

        let response = app
            .server
            .patch(&format!("/api/admin/users/{}", alice.id))
            .add_header(header::AUTHORIZATION, bearer(&admin))
            .json(&json!({ "role": "admin" }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["data"]["role"], "admin");

        let bad_role = app
            .server
            .patch(&format!("/api/admin/users/{}", alice.id))
            .add_header(header::AUTHORIZATION, bearer(&admin))
            .json(&json!({ "role": "superuser" }))
            .await;
        bad_role.assert_status(StatusCode::BAD_REQUEST);

        let missing = app
            .server
            .patch("/api/admin/users/9999")
            .add_header(header::AUTHORIZATION, bearer(&admin))
            .json(&json!({ "role": "user" }))
            .await;
        missing.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(error_code(&missing), "USER_NOT_FOUND");
    }
}

// =============================================================================
// Internal Machine API
// =============================================================================

mod internal_api {
    use super::*;

    #[tokio::test]
    async fn test_requires_api_key() {
        let app = TestApp::new();

        let missing = app
            .server
            .post("/internal/find-user")
            .json(&json!({ "email": "a@b.com" }))
            .await;
        missing.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&missing), "API_KEY_REQUIRED");

        let unknown = app
            .server
            .post("/internal/find-user")
            .add_header(api_key_header(), HeaderValue::from_static("nope-nope"))
            .json(&json!({ "email": "a@b.com" }))
            .await;
        unknown.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&unknown), "API_KEY_INVALID");
    }

    #[tokio::test]
    async fn test_query_parameter_key() {
        let app = TestApp::new();
        let key = app.api_key().await;

        let response = app
            .server
            .post("/internal/find-user")
            .add_query_param("api_key", &key)
            .json(&json!({ "email": "nobody@b.com" }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>(), json!({ "ok": true, "data": null }));
    }

    #[tokio::test]
    async fn test_code_lifecycle() {
        let app = TestApp::new();
        let key = HeaderValue::from_str(&app.api_key().await).unwrap();

        let no_user = app
            .server
            .post("/internal/verify-code")
            .add_header(api_key_header(), key.clone())
            .json(&json!({ "email": "a@b.com", "code": "123456" }))
            .await;
        assert_eq!(
            no_user.json::<Value>(),
            json!({ "ok": false, "reason": "no_user" })
        );

        let created = app
            .server
            .post("/internal/create-user-email")
            .add_header(api_key_header(), key.clone())
            .json(&json!({ "email": "a@b.com" }))
            .await;
        let user_id = created.json::<Value>()["data"]["id"].as_i64().unwrap();

        let expires_at = chrono::Utc::now() + chrono::Duration::minutes(10);
        app.server
            .post("/internal/store-verification-code")
            .add_header(api_key_header(), key.clone())
            .json(&json!({ "userId": user_id, "code": "123456", "expiresAt": expires_at }))
            .await
            .assert_status_ok();

        let wrong = app
            .server
            .post("/internal/verify-code")
            .add_header(api_key_header(), key.clone())
            .json(&json!({ "email": "a@b.com", "code": "654321" }))
            .await;
        assert_eq!(wrong.json::<Value>()["reason"], "invalid_or_expired");

        let ok = app
            .server
            .post("/internal/verify-code")
            .add_header(api_key_header(), key.clone())
            .json(&json!({ "email": "a@b.com", "code": "123456" }))
            .await;
        assert_eq!(ok.json::<Value>(), json!({ "ok": true, "userId": user_id }));

        let profile = app
            .server
            .post("/internal/set-username-password")
            .add_header(api_key_header(), key)
            .json(&json!({ "email": "a@b.com", "username": "alice", "password": "hunter22" }))
            .await;
        let body = profile.json::<Value>();
        assert_eq!(body["data"]["username"], "alice");
        assert!(body["data"].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn test_store_code_for_unknown_user() {
        let app = TestApp::new();
        let key = HeaderValue::from_str(&app.api_key().await).unwrap();
        let expires_at = chrono::Utc::now() + chrono::Duration::minutes(10);

        let response = app
            .server
            .post("/internal/store-verification-code")
            .add_header(api_key_header(), key)
            .json(&json!({ "userId": 9999, "code": "123456", "expiresAt": expires_at }))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(error_code(&response), "USER_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unverified_user_cannot_set_password() {
        let app = TestApp::new();
        let key = HeaderValue::from_str(&app.api_key().await).unwrap();
        app.store.create_unverified_by_email("u@b.com").await.unwrap();

        let response = app
            .server
            .post("/internal/set-username-password")
            .add_header(api_key_header(), key)
            .json(&json!({ "email": "u@b.com", "username": "unver", "password": "hunter22" }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["data"], Value::Null);
    }

    #[tokio::test]
    async fn test_reset_token_consumed_once() {
        let mut app = TestApp::new();
        app.signed_up("a@b.com", "alice", "hunter22").await;
        let key = HeaderValue::from_str(&app.api_key().await).unwrap();

        let raw = "caller-minted-reset-token-0001";
        let expires_at = chrono::Utc::now() + chrono::Duration::hours(1);
        let created = app
            .server
            .post("/internal/create-reset-token")
            .add_header(api_key_header(), key.clone())
            .json(&json!({ "email": "a@b.com", "token": raw, "expiresAt": expires_at }))
            .await;
        assert_eq!(created.json::<Value>()["data"]["email"], "a@b.com");

        let first = app
            .server
            .post("/internal/consume-reset-token")
            .add_header(api_key_header(), key.clone())
            .json(&json!({ "token": raw }))
            .await;
        let user_id = first.json::<Value>()["data"]["id"].as_i64().unwrap();

        let second = app
            .server
            .post("/internal/consume-reset-token")
            .add_header(api_key_header(), key.clone())
            .json(&json!({ "token": raw }))
            .await;
        assert_eq!(second.json::<Value>()["data"], Value::Null);

        app.server
            .post("/internal/set-password")
            .add_header(api_key_header(), key)
            .json(&json!({ "userId": user_id, "newPassword": "newpass1" }))
            .await
            .assert_status_ok();

        app.server
            .post("/api/auth/login")
            .json(&json!({ "email": "a@b.com", "password": "newpass1" }))
            .await
            .assert_status_ok();
    }
}
