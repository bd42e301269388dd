//! Request authorizer for the REST gateway.
//!
//! Routes are matched in order by method and path regex. The first match
//! decides whether a live access token is needed. Requests matching no entry
//! are rejected with 401 "invalid url", so the table doubles as an allow-list.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use regex::Regex;
use std::{sync::Arc, time::Duration};
use tracing::debug;

use crate::auth::{
    extract_bearer_token, AuthError, Deadline, PrincipalId, TokenVerifier, INVALID_TOKEN,
};

pub const INVALID_URL: &str = "invalid url";

#[derive(Debug, Clone)]
pub struct Route {
    method: Method,
    path: Regex,
    requires_auth: bool,
}

impl Route {
    /// # Errors
    /// Returns an error if `pattern` is not a valid regex.
    pub fn new(method: Method, pattern: &str, requires_auth: bool) -> Result<Self, regex::Error> {
        Ok(Self {
            method,
            path: Regex::new(pattern)?,
            requires_auth,
        })
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        self.method == method && self.path.is_match(path)
    }
}

/// Routes served by this binary plus the article, bookmark and comment
/// surfaces gated in front of their handlers.
///
/// # Errors
/// Returns an error if a pattern fails to compile.
pub fn default_routes() -> Result<Vec<Route>, regex::Error> {
    const ID: &str = r"[0-9]+";
    let table: Vec<(Method, String, bool)> = vec![
        (Method::GET, "^/health$".into(), false),
        (Method::POST, "^/v1/signup$".into(), false),
        (Method::POST, "^/v1/signin$".into(), false),
        (Method::POST, "^/v1/signout$".into(), true),
        (Method::POST, "^/v1/refresh-token$".into(), false),
        (Method::GET, "^/v1/signin/user$".into(), true),
        (Method::GET, "^/v1/oauth/google/login$".into(), false),
        (Method::GET, "^/v1/oauth/google/callback$".into(), false),
        (Method::GET, "^/v1/articles$".into(), false),
        (Method::GET, format!("^/v1/articles/{ID}$"), false),
        (Method::POST, "^/v1/articles$".into(), true),
        (Method::PATCH, format!("^/v1/articles/{ID}$"), true),
        (Method::DELETE, format!("^/v1/articles/{ID}$"), true),
        (Method::GET, "^/v1/bookmarks$".into(), false),
        (Method::POST, "^/v1/bookmarks$".into(), true),
        (Method::DELETE, format!("^/v1/bookmarks/{ID}$"), true),
        (Method::GET, format!("^/v1/articles/{ID}/comments$"), false),
        (Method::POST, format!("^/v1/articles/{ID}/comments$"), true),
        (Method::DELETE, format!("^/v1/comments/{ID}$"), true),
    ];

    table
        .into_iter()
        .map(|(method, pattern, requires_auth)| Route::new(method, &pattern, requires_auth))
        .collect()
}

pub struct HttpAuthorizer {
    routes: Vec<Route>,
    verifier: TokenVerifier,
    request_timeout: Duration,
}

impl HttpAuthorizer {
    #[must_use]
    pub fn new(routes: Vec<Route>, verifier: TokenVerifier, request_timeout: Duration) -> Self {
        Self {
            routes,
            verifier,
            request_timeout,
        }
    }

    /// `Ok(None)` for open routes, `Ok(Some(_))` once a protected request is accepted.
    ///
    /// # Errors
    /// `Unauthenticated` for unknown routes and any token failure,
    /// `DeadlineExceeded` if the session lookup outlives the request timeout.
    pub async fn authorize(
        &self,
        method: &Method,
        path: &str,
        authorization: Option<&str>,
    ) -> Result<Option<PrincipalId>, AuthError> {
        let Some(route) = self.routes.iter().find(|route| route.matches(method, path)) else {
            debug!(http.method = %method, path, "no route");
            return Err(AuthError::Unauthenticated(INVALID_URL));
        };
        if !route.requires_auth {
            return Ok(None);
        }

        let token = authorization
            .and_then(extract_bearer_token)
            .ok_or(AuthError::Unauthenticated(INVALID_TOKEN))?;

        Deadline::after(self.request_timeout)
            .run(self.verifier.verify(token))
            .await
            .map(Some)
    }
}

/// `axum::middleware::from_fn_with_state` entry point.
pub async fn authorize(
    State(authorizer): State<Arc<HttpAuthorizer>>,
    mut request: Request,
    next: Next,
) -> Response {
    // Request bodies are not `Sync`; copy out what the check needs.
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    match authorizer
        .authorize(&method, &path, authorization.as_deref())
        .await
    {
        Ok(Some(principal)) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Ok(None) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}
