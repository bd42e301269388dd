//! Request authorizer for the RPC surface.
//!
//! A `tower` layer in front of the tonic router. Each call is matched by its
//! fully-qualified method path (`/techfeed.v1.AuthService/Signout`) against a
//! table of `method -> requires auth`. Unknown methods are rejected before
//! reaching any service. Protected methods need `authorization: Bearer <token>`
//! metadata; the accepted [`PrincipalId`] is inserted into the request
//! extensions where handlers read it back. The session lookup runs under the
//! same deadline as the handler, shortened by a client `grpc-timeout`.

use std::{
    collections::HashMap,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tonic::{
    body::BoxBody,
    codegen::{http, BoxFuture},
    Status,
};
use tower::{Layer, Service};
use tracing::{debug, Instrument};

use super::parse_grpc_timeout;
use crate::auth::{
    extract_bearer_token, AuthError, Deadline, PrincipalId, TokenVerifier, INVALID_TOKEN,
};

pub const INVALID_METHOD: &str = "invalid method";

const AUTH_SERVICE: &str = "techfeed.v1.AuthService";

/// `AuthService` methods and whether each needs a live access token.
#[must_use]
pub fn auth_service_methods() -> Vec<(String, bool)> {
    [
        ("Signup", false),
        ("Signin", false),
        ("Signout", true),
        ("RefreshToken", false),
        ("GetSigninUser", true),
        ("GetGoogleLoginURL", false),
        ("GoogleLoginCallback", false),
    ]
    .into_iter()
    .map(|(method, requires_auth)| (format!("/{AUTH_SERVICE}/{method}"), requires_auth))
    .collect()
}

pub struct RpcAuthorizer {
    methods: HashMap<String, bool>,
    verifier: TokenVerifier,
    request_timeout: Duration,
}

impl RpcAuthorizer {
    #[must_use]
    pub fn new(verifier: TokenVerifier, request_timeout: Duration) -> Self {
        Self {
            methods: HashMap::new(),
            verifier,
            request_timeout,
        }
    }

    #[must_use]
    pub fn with_method(mut self, path: impl Into<String>, requires_auth: bool) -> Self {
        self.methods.insert(path.into(), requires_auth);
        self
    }

    #[must_use]
    pub fn with_methods(self, methods: impl IntoIterator<Item = (String, bool)>) -> Self {
        methods
            .into_iter()
            .fold(self, |authorizer, (path, requires_auth)| {
                authorizer.with_method(path, requires_auth)
            })
    }

    /// `Ok(None)` for open methods, `Ok(Some(_))` once a protected call is accepted.
    ///
    /// # Errors
    /// `UNAUTHENTICATED` for unknown methods and any token failure,
    /// `DEADLINE_EXCEEDED` if the session lookup outlives the deadline.
    pub async fn authorize(
        &self,
        path: &str,
        authorization: Option<&str>,
        client_timeout: Option<Duration>,
    ) -> Result<Option<PrincipalId>, Status> {
        let Some(&requires_auth) = self.methods.get(path) else {
            debug!(rpc.method = path, "unknown method");
            return Err(Status::unauthenticated(INVALID_METHOD));
        };
        if !requires_auth {
            return Ok(None);
        }

        let token = authorization
            .and_then(extract_bearer_token)
            .ok_or_else(|| Status::unauthenticated(INVALID_TOKEN))?;

        Deadline::after(self.request_timeout)
            .min(client_timeout)
            .run(self.verifier.verify(token))
            .await
            .map(Some)
            .map_err(|err| match err {
                AuthError::DeadlineExceeded => Status::from(err),
                _ => Status::unauthenticated(INVALID_TOKEN),
            })
    }

    #[must_use]
    pub fn into_layer(self) -> RpcAuthLayer {
        RpcAuthLayer {
            authorizer: Arc::new(self),
        }
    }
}

#[derive(Clone)]
pub struct RpcAuthLayer {
    authorizer: Arc<RpcAuthorizer>,
}

impl<S> Layer<S> for RpcAuthLayer {
    type Service = RpcAuth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RpcAuth {
            inner,
            authorizer: self.authorizer.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RpcAuth<S> {
    inner: S,
    authorizer: Arc<RpcAuthorizer>,
}

impl<S, B> Service<http::Request<B>> for RpcAuth<S>
where
    S: Service<http::Request<B>, Response = http::Response<BoxBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: http::Request<B>) -> Self::Future {
        // The ready inner service goes into the future; a fresh clone stays behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let authorizer = self.authorizer.clone();

        // Request bodies are not `Sync`; copy out what the check needs.
        let path = request.uri().path().to_owned();
        let authorization = request
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let client_timeout = request
            .headers()
            .get("grpc-timeout")
            .and_then(|value| value.to_str().ok())
            .and_then(parse_grpc_timeout);

        let span = tracing::info_span!("rpc.request", rpc.system = "grpc", rpc.method = %path);

        Box::pin(
            async move {
                match authorizer
                    .authorize(&path, authorization.as_deref(), client_timeout)
                    .await
                {
                    Ok(Some(principal)) => {
                        request.extensions_mut().insert(principal);
                    }
                    Ok(None) => {}
                    Err(status) => return Ok(status.into_http()),
                }
                inner.call(request).await
            }
            .instrument(span),
        )
    }
}
