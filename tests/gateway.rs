use argon2::Params;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

use techfeed::{
    api::{
        self,
        authorizer::{default_routes, HttpAuthorizer},
        ApiState,
    },
    auth::{
        AuthService, IdentityProvider, ManualClock, MemorySessionStore, MemoryUserDirectory,
        OAuthError, PasswordHasher, Profile, ProviderToken, SessionError, SessionStore,
        TokenCodec, TokenKind,
    },
};

const STATE: &str = "configured-state";
const ACCESS_TTL: i64 = 3600;

struct StubProvider;

#[async_trait]
impl IdentityProvider for StubProvider {
    fn login_url(&self) -> String {
        format!("https://accounts.example.com/auth?client_id=techfeed&state={STATE}")
    }

    fn check_state(&self, state: &str) -> bool {
        state == STATE
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderToken, OAuthError> {
        match code {
            "valid-code" => Ok(ProviderToken(SecretString::from("provider".to_string()))),
            _ => Err(OAuthError::ExchangeFailed(anyhow::anyhow!("invalid_grant"))),
        }
    }

    async fn fetch_profile(&self, _token: &ProviderToken) -> Result<Profile, OAuthError> {
        Ok(Profile {
            external_id: "g-42".to_string(),
            name: "Dana".to_string(),
            email: "dana@example.com".to_string(),
        })
    }
}

// Accepts writes, never answers reads.
struct StalledSessionStore;

#[async_trait]
impl SessionStore for StalledSessionStore {
    async fn set(&self, _principal: &str, _token_id: &str) -> Result<(), SessionError> {
        Ok(())
    }

    async fn get(&self, _principal: &str) -> Result<String, SessionError> {
        std::future::pending().await
    }

    async fn delete(&self, _principal: &str) -> Result<(), SessionError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), SessionError> {
        Ok(())
    }

    fn ttl_seconds(&self) -> i64 {
        ACCESS_TTL
    }
}

struct Gateway {
    app: Router,
    clock: Arc<ManualClock>,
}

fn gateway() -> Gateway {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let sessions = Arc::new(MemorySessionStore::new(ACCESS_TTL, clock.clone()));
    gateway_with(clock, sessions, Duration::from_secs(5))
}

fn gateway_with(
    clock: Arc<ManualClock>,
    access_sessions: Arc<dyn SessionStore>,
    request_timeout: Duration,
) -> Gateway {
    let secret = SecretString::from("gateway-secret".to_string());
    let access = TokenKind::new(
        TokenCodec::new("techfeed", &secret, ACCESS_TTL, clock.clone()),
        access_sessions,
    );
    let refresh = TokenKind::new(
        TokenCodec::new("techfeed", &secret, 2_592_000, clock.clone()),
        Arc::new(MemorySessionStore::new(2_592_000, clock.clone())),
    );
    let params = Params::new(8, 1, 1, None).expect("params");
    let service = Arc::new(
        AuthService::new(
            Arc::new(MemoryUserDirectory::new(clock.clone())),
            Arc::new(StubProvider),
            access,
            refresh,
        )
        .with_hasher(PasswordHasher::new(params)),
    );

    let authorizer = HttpAuthorizer::new(
        default_routes().expect("routes"),
        service.verifier(),
        request_timeout,
    );
    let app = api::router(
        ApiState::new(service, request_timeout),
        Arc::new(authorizer),
    );

    Gateway { app, clock }
}

impl Gateway {
    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    async fn signup(&self, email: &str, password: &str) -> Value {
        let (status, body) = self
            .send(
                Method::POST,
                "/v1/signup",
                None,
                Some(json!({ "name": "Ada", "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    async fn signin(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            "/v1/signin",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }
}

fn field<'a>(value: &'a Value, name: &str) -> &'a str {
    value[name].as_str().unwrap_or_default()
}

#[tokio::test]
async fn signup_signin_and_signout() {
    let gw = gateway();

    let created = gw.signup("  Ada@Example.com ", "correct horse").await;
    assert_eq!(created["user"]["email"], "ada@example.com");
    assert!(created["user"].get("password_hash").is_none());

    let (status, tokens) = gw.signin("ada@example.com", "correct horse").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tokens["token_type"], "Bearer");
    assert_eq!(tokens["expires_in"], ACCESS_TTL);
    let access = field(&tokens, "access_token").to_string();

    let (status, user) = gw
        .send(Method::GET, "/v1/signin/user", Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["email"], "ada@example.com");
    assert_eq!(user["id"], created["user"]["id"]);

    let (status, body) = gw
        .send(Method::POST, "/v1/signout", Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, body) = gw
        .send(Method::GET, "/v1/signin/user", Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "invalid token" }));
}

#[tokio::test]
async fn second_signin_revokes_first_token() {
    let gw = gateway();
    gw.signup("ada@example.com", "correct horse").await;

    let (_, first) = gw.signin("ada@example.com", "correct horse").await;
    gw.clock.advance(1);
    let (_, second) = gw.signin("ada@example.com", "correct horse").await;

    let (status, _) = gw
        .send(
            Method::GET,
            "/v1/signin/user",
            Some(field(&first, "access_token")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = gw
        .send(
            Method::GET,
            "/v1/signin/user",
            Some(field(&second, "access_token")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn expired_access_token_is_rejected() {
    let gw = gateway();
    gw.signup("ada@example.com", "correct horse").await;
    let (_, tokens) = gw.signin("ada@example.com", "correct horse").await;

    gw.clock.advance(ACCESS_TTL);

    let (status, body) = gw
        .send(
            Method::GET,
            "/v1/signin/user",
            Some(field(&tokens, "access_token")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid token");
}

#[tokio::test]
async fn refresh_token_until_signout() {
    let gw = gateway();
    gw.signup("ada@example.com", "correct horse").await;
    let (_, tokens) = gw.signin("ada@example.com", "correct horse").await;
    let refresh = json!({ "refresh_token": field(&tokens, "refresh_token") });

    gw.clock.advance(10);
    let (status, refreshed) = gw
        .send(Method::POST, "/v1/refresh-token", None, Some(refresh.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refreshed["token_type"], "Bearer");
    assert_eq!(refreshed["expires_in"], ACCESS_TTL);
    assert!(refreshed.get("refresh_token").is_none());

    let new_access = field(&refreshed, "access_token").to_string();
    let (status, _) = gw
        .send(Method::GET, "/v1/signin/user", Some(&new_access), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = gw
        .send(Method::POST, "/v1/signout", Some(&new_access), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = gw
        .send(Method::POST, "/v1/refresh-token", None, Some(refresh))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid token");
}

#[tokio::test]
async fn signin_failures_are_indistinguishable() {
    let gw = gateway();
    gw.signup("ada@example.com", "correct horse").await;

    let (wrong_status, wrong_body) = gw.signin("ada@example.com", "battery staple").await;
    let (unknown_status, unknown_body) = gw.signin("nobody@example.com", "correct horse").await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, unknown_body);
    assert_eq!(wrong_body["error"], "email or password is incorrect");
}

#[tokio::test]
async fn signup_validation_and_conflicts() {
    let gw = gateway();
    gw.signup("ada@example.com", "correct horse").await;

    let (status, body) = gw
        .send(
            Method::POST,
            "/v1/signup",
            None,
            Some(json!({ "name": "Other", "email": "ADA@example.com", "password": "pw" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "email already registered");

    let (status, _) = gw
        .send(
            Method::POST,
            "/v1/signup",
            None,
            Some(json!({ "name": "Bob", "email": "not-an-email", "password": "pw" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = gw
        .send(
            Method::POST,
            "/v1/signup",
            None,
            Some(json!({ "email": "bob@example.com", "password": "pw" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_body_is_invalid_argument() {
    let gw = gateway();
    let response = gw
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/v1/signin")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn authorizer_gates_routes() {
    let gw = gateway();

    let (status, body) = gw.send(Method::GET, "/v1/unknown", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid url");

    let (status, body) = gw.send(Method::DELETE, "/v1/signup", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid url");

    let (status, body) = gw
        .send(
            Method::POST,
            "/v1/articles",
            None,
            Some(json!({ "title": "t" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid token");

    let (status, _) = gw
        .send(Method::GET, "/v1/signin/user", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Open read routes pass the authorizer; no handler is mounted here.
    let (status, _) = gw.send(Method::GET, "/v1/articles/7", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn google_login_flow() {
    let gw = gateway();

    let (status, body) = gw
        .send(Method::GET, "/v1/oauth/google/login", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(field(&body, "url").contains(&format!("state={STATE}")));

    let (status, body) = gw
        .send(
            Method::GET,
            "/v1/oauth/google/callback?state=forged&code=valid-code",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid state");

    let (status, body) = gw
        .send(
            Method::GET,
            &format!("/v1/oauth/google/callback?state={STATE}&code=expired"),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "identity provider error");

    let (status, tokens) = gw
        .send(
            Method::GET,
            &format!("/v1/oauth/google/callback?state={STATE}&code=valid-code"),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tokens["token_type"], "Bearer");

    let (status, user) = gw
        .send(
            Method::GET,
            "/v1/signin/user",
            Some(field(&tokens, "access_token")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["email"], "dana@example.com");
    assert_eq!(user["name"], "Dana");

    // Federated-only accounts cannot sign in with a password.
    let (status, _) = gw.signin("dana@example.com", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = gw.signin("dana@example.com", "guess").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_reports_dependencies() {
    let gw = gateway();
    let response = gw
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let x_app = response
        .headers()
        .get("x-app")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(x_app.starts_with(&format!(
        "{}:{}:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )));
    assert!(response.headers().contains_key("x-request-id"));

    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let body: Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(body["database"], "ok");
    assert_eq!(body["session_store"], "ok");
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
}

#[tokio::test]
async fn stalled_session_store_times_out_protected_request() {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let gateway = gateway_with(
        clock,
        Arc::new(StalledSessionStore),
        Duration::from_millis(200),
    );
    gateway.signup("eve@example.com", "hunter2").await;
    let (status, body) = gateway.signin("eve@example.com", "hunter2").await;
    assert_eq!(status, StatusCode::OK);
    let token = field(&body, "access_token").to_string();

    let (status, body) = tokio::time::timeout(
        Duration::from_secs(2),
        gateway.send(Method::GET, "/v1/signin/user", Some(&token), None),
    )
    .await
    .expect("response within the request deadline");
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"], "deadline exceeded");
}
