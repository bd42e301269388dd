//! REST/JSON gateway.

pub mod authorizer;
pub mod error;
pub mod handlers;

use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Extension, Router,
};
use serde_json::json;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

use crate::auth::{AuthService, Deadline};
use authorizer::{default_routes, HttpAuthorizer};
use handlers::{auth, health};

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<AuthService>,
    pub request_timeout: Duration,
}

impl ApiState {
    #[must_use]
    pub fn new(service: Arc<AuthService>, request_timeout: Duration) -> Self {
        Self {
            service,
            request_timeout,
        }
    }

    pub(crate) fn deadline(&self) -> Deadline {
        Deadline::after(self.request_timeout)
    }
}

/// Build the gateway router. Every request, unknown paths included, passes
/// through `authorizer` before reaching a handler.
pub fn router(state: ApiState, authorizer: Arc<HttpAuthorizer>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/v1/signup", post(auth::signup))
        .route("/v1/signin", post(auth::signin))
        .route("/v1/signout", post(auth::signout))
        .route("/v1/refresh-token", post(auth::refresh_token))
        .route("/v1/signin/user", get(auth::signin_user))
        .route("/v1/oauth/google/login", get(auth::google_login))
        .route("/v1/oauth/google/callback", get(auth::google_callback))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            authorizer,
            authorizer::authorize,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}

/// Serve the gateway until `shutdown` resolves.
///
/// # Errors
/// Returns an error if the route table is invalid, the listener cannot bind or
/// the server fails.
pub async fn serve(
    service: Arc<AuthService>,
    port: u16,
    request_timeout: Duration,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let authorizer = Arc::new(HttpAuthorizer::new(
        default_routes()?,
        service.verifier(),
        request_timeout,
    ));
    let app = router(ApiState::new(service, request_timeout), authorizer);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
