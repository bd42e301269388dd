//! gRPC surface for `techfeed.v1.AuthService`.

pub mod authorizer;
pub mod messages;

#[allow(clippy::all, clippy::pedantic)]
mod generated {
    include!(concat!(env!("OUT_DIR"), "/techfeed.v1.AuthService.rs"));
}

pub use generated::auth_service_server::{AuthService as AuthServiceRpc, AuthServiceServer};

use std::{net::SocketAddr, sync::Arc, time::Duration};
use tonic::{metadata::MetadataMap, Request, Response, Status};
use tracing::{error, info, instrument};

use crate::auth::{AuthError, AuthService, Deadline, PrincipalId, INVALID_TOKEN};
use authorizer::{auth_service_methods, RpcAuthorizer};
use messages::{
    AccessTokenResponse, Empty, GoogleLoginCallbackRequest, GoogleLoginUrlResponse,
    RefreshTokenRequest, SigninRequest, SignupRequest, SignupResponse, TokenResponse, User,
};

impl From<AuthError> for Status {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::InvalidArgument(_) | AuthError::InvalidState => {
                Status::invalid_argument(message)
            }
            AuthError::AuthenticationFailed
            | AuthError::Unauthenticated(_)
            | AuthError::InvalidToken => Status::unauthenticated(message),
            AuthError::DuplicateEmail => Status::already_exists(message),
            AuthError::NotFound => Status::not_found(message),
            AuthError::ExchangeFailed | AuthError::ProfileFetchFailed => {
                Status::unavailable(message)
            }
            AuthError::DeadlineExceeded => Status::deadline_exceeded(message),
            AuthError::Internal(source) => {
                error!("Internal error: {source:#}");
                Status::internal(message)
            }
        }
    }
}

/// Parse a `grpc-timeout` value: up to 8 digits followed by a unit
/// (`H`, `M`, `S`, `m`, `u`, `n`).
#[must_use]
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || value.len() > 9 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;
    match unit {
        "H" => Some(Duration::from_secs(amount * 3600)),
        "M" => Some(Duration::from_secs(amount * 60)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}

fn client_timeout(metadata: &MetadataMap) -> Option<Duration> {
    metadata
        .get("grpc-timeout")
        .and_then(|value| value.to_str().ok())
        .and_then(parse_grpc_timeout)
}

fn principal<T>(request: &Request<T>) -> Result<PrincipalId, Status> {
    request
        .extensions()
        .get::<PrincipalId>()
        .copied()
        .ok_or_else(|| Status::unauthenticated(INVALID_TOKEN))
}

#[derive(Clone)]
pub struct AuthRpc {
    service: Arc<AuthService>,
    request_timeout: Duration,
}

impl AuthRpc {
    #[must_use]
    pub fn new(service: Arc<AuthService>, request_timeout: Duration) -> Self {
        Self {
            service,
            request_timeout,
        }
    }

    fn deadline<T>(&self, request: &Request<T>) -> Deadline {
        Deadline::after(self.request_timeout).min(client_timeout(request.metadata()))
    }
}

#[tonic::async_trait]
impl AuthServiceRpc for AuthRpc {
    #[instrument(skip_all, err)]
    async fn signup(
        &self,
        request: Request<SignupRequest>,
    ) -> Result<Response<SignupResponse>, Status> {
        let deadline = self.deadline(&request);
        let req = request.into_inner();
        let user = deadline
            .run(self.service.signup(&req.name, &req.email, &req.password))
            .await?;
        Ok(Response::new(SignupResponse {
            user: Some(user.into()),
        }))
    }

    #[instrument(skip_all, err)]
    async fn signin(
        &self,
        request: Request<SigninRequest>,
    ) -> Result<Response<TokenResponse>, Status> {
        let deadline = self.deadline(&request);
        let req = request.into_inner();
        let tokens = deadline
            .run(self.service.signin(&req.email, &req.password))
            .await?;
        Ok(Response::new(tokens.into()))
    }

    #[instrument(skip_all, fields(principal), err)]
    async fn signout(&self, request: Request<Empty>) -> Result<Response<Empty>, Status> {
        let deadline = self.deadline(&request);
        let principal = principal(&request)?;
        tracing::Span::current().record("principal", principal.0);
        deadline.run(self.service.signout(principal)).await?;
        Ok(Response::new(Empty {}))
    }

    #[instrument(skip_all, err)]
    async fn refresh_token(
        &self,
        request: Request<RefreshTokenRequest>,
    ) -> Result<Response<AccessTokenResponse>, Status> {
        let deadline = self.deadline(&request);
        let req = request.into_inner();
        let token = deadline
            .run(self.service.refresh_token(&req.refresh_token))
            .await?;
        Ok(Response::new(token.into()))
    }

    #[instrument(skip_all, fields(principal), err)]
    async fn get_signin_user(&self, request: Request<Empty>) -> Result<Response<User>, Status> {
        let deadline = self.deadline(&request);
        let principal = principal(&request)?;
        tracing::Span::current().record("principal", principal.0);
        let user = deadline.run(self.service.get_signin_user(principal)).await?;
        Ok(Response::new(user.into()))
    }

    #[instrument(skip_all, err)]
    async fn get_google_login_url(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<GoogleLoginUrlResponse>, Status> {
        Ok(Response::new(GoogleLoginUrlResponse {
            url: self.service.google_login_url(),
        }))
    }

    #[instrument(skip_all, err)]
    async fn google_login_callback(
        &self,
        request: Request<GoogleLoginCallbackRequest>,
    ) -> Result<Response<TokenResponse>, Status> {
        let deadline = self.deadline(&request);
        let req = request.into_inner();
        let signin = deadline
            .run(self.service.google_login_callback(&req.state, &req.code))
            .await?;
        Ok(Response::new(signin.tokens.into()))
    }
}

/// Serve the RPC surface until `shutdown` resolves.
///
/// # Errors
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(
    service: Arc<AuthService>,
    port: u16,
    request_timeout: Duration,
    shutdown: impl std::future::Future<Output = ()> + Send,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let layer = RpcAuthorizer::new(service.verifier(), request_timeout)
        .with_methods(auth_service_methods())
        .into_layer();

    info!("gRPC listening on {addr}");

    tonic::transport::Server::builder()
        .layer(layer)
        .add_service(AuthServiceServer::new(AuthRpc::new(service, request_timeout)))
        .serve_with_shutdown(addr, shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        IdentityProvider, ManualClock, MemorySessionStore, MemoryUserDirectory, OAuthError,
        PasswordHasher, Profile, ProviderToken, SessionError, SessionStore, TokenCodec, TokenKind,
    };
    use argon2::Params;
    use async_trait::async_trait;
    use authorizer::RpcAuthLayer;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use prost::Message;
    use secrecy::SecretString;
    use tonic::{codegen::http, Code};
    use tower::{Layer, ServiceExt};

    struct NoProvider;

    #[async_trait]
    impl IdentityProvider for NoProvider {
        fn login_url(&self) -> String {
            "https://accounts.example.com/auth".to_string()
        }

        fn check_state(&self, _state: &str) -> bool {
            false
        }

        async fn exchange_code(&self, _code: &str) -> Result<ProviderToken, OAuthError> {
            Err(OAuthError::ExchangeFailed(anyhow::anyhow!("unused")))
        }

        async fn fetch_profile(&self, _token: &ProviderToken) -> Result<Profile, OAuthError> {
            Err(OAuthError::ProfileFetchFailed(anyhow::anyhow!("unused")))
        }
    }

    // Accepts writes, never answers reads.
    struct StalledStore;

    #[async_trait]
    impl SessionStore for StalledStore {
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
            2_592_000
        }
    }

    struct Harness {
        refresh_codec: TokenCodec,
        layer: RpcAuthLayer,
        rpc: AuthRpc,
    }

    fn harness(refresh_sessions: Arc<dyn SessionStore>, request_timeout: Duration) -> Harness {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let secret = SecretString::from("rpc-secret".to_string());
        let refresh_codec = TokenCodec::new("techfeed", &secret, 2_592_000, clock.clone());
        let access = TokenKind::new(
            TokenCodec::new("techfeed", &secret, 3600, clock.clone()),
            Arc::new(MemorySessionStore::new(3600, clock.clone())),
        );
        let refresh = TokenKind::new(refresh_codec.clone(), refresh_sessions);
        let service = Arc::new(
            AuthService::new(
                Arc::new(MemoryUserDirectory::new(clock)),
                Arc::new(NoProvider),
                access,
                refresh,
            )
            .with_hasher(PasswordHasher::new(
                Params::new(8, 1, 1, None).expect("params"),
            )),
        );
        let layer = RpcAuthorizer::new(service.verifier(), request_timeout)
            .with_methods(auth_service_methods())
            .into_layer();
        Harness {
            refresh_codec,
            layer,
            rpc: AuthRpc::new(service, request_timeout),
        }
    }

    fn grpc_code(headers: &http::HeaderMap) -> Option<Code> {
        headers
            .get("grpc-status")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<i32>().ok())
            .map(Code::from_i32)
    }

    // Length-prefixed message frame.
    fn frame(message: &impl Message) -> Vec<u8> {
        let payload = message.encode_to_vec();
        let length = u32::try_from(payload.len()).expect("length");
        let mut frame = vec![0];
        frame.extend_from_slice(&length.to_be_bytes());
        frame.extend_from_slice(&payload);
        frame
    }

    impl Harness {
        async fn call<T: Message + Default>(
            &self,
            method: &str,
            message: &impl Message,
            metadata: &[(&'static str, String)],
        ) -> (Code, Option<T>) {
            let mut builder = http::Request::builder()
                .method("POST")
                .uri(format!("http://localhost/techfeed.v1.AuthService/{method}"))
                .header("content-type", "application/grpc")
                .header("te", "trailers");
            for (name, value) in metadata {
                builder = builder.header(*name, value.as_str());
            }
            let request = builder.body(Body::from(frame(message))).expect("request");

            let response = self
                .layer
                .layer(AuthServiceServer::new(self.rpc.clone()))
                .oneshot(request)
                .await
                .expect("response");

            // Trailers-only responses carry the status in the headers.
            if let Some(code) = grpc_code(response.headers()) {
                return (code, None);
            }
            let collected = response.into_body().collect().await.expect("body");
            let code = collected.trailers().and_then(grpc_code).unwrap_or(Code::Ok);
            let bytes = collected.to_bytes();
            let reply = (bytes.len() > 5).then(|| T::decode(&bytes[5..]).expect("decode"));
            (code, reply)
        }
    }

    fn bearer(token: &str) -> Vec<(&'static str, String)> {
        vec![("authorization", format!("Bearer {token}"))]
    }

    #[tokio::test]
    async fn principal_reaches_handlers_until_signout() {
        let h = harness(
            Arc::new(MemorySessionStore::new(
                2_592_000,
                Arc::new(ManualClock::new(1_700_000_000)),
            )),
            Duration::from_secs(5),
        );

        let (code, reply) = h
            .call::<SignupResponse>(
                "Signup",
                &SignupRequest {
                    name: "Ada".to_string(),
                    email: "ada@example.com".to_string(),
                    password: "hunter2".to_string(),
                },
                &[],
            )
            .await;
        assert_eq!(code, Code::Ok);
        let user_id = reply.and_then(|reply| reply.user).expect("user").id;

        let (code, tokens) = h
            .call::<TokenResponse>(
                "Signin",
                &SigninRequest {
                    email: "ada@example.com".to_string(),
                    password: "hunter2".to_string(),
                },
                &[],
            )
            .await;
        assert_eq!(code, Code::Ok);
        let tokens = tokens.expect("tokens");
        assert_eq!(tokens.token_type, "Bearer");

        let (code, user) = h
            .call::<User>("GetSigninUser", &Empty {}, &bearer(&tokens.access_token))
            .await;
        assert_eq!(code, Code::Ok);
        let user = user.expect("user");
        assert_eq!(user.id, user_id);
        assert_eq!(user.email, "ada@example.com");

        let (code, _) = h
            .call::<Empty>("Signout", &Empty {}, &bearer(&tokens.access_token))
            .await;
        assert_eq!(code, Code::Ok);

        let (code, _) = h
            .call::<User>("GetSigninUser", &Empty {}, &bearer(&tokens.access_token))
            .await;
        assert_eq!(code, Code::Unauthenticated);

        let (code, _) = h
            .call::<AccessTokenResponse>(
                "RefreshToken",
                &RefreshTokenRequest {
                    refresh_token: tokens.refresh_token,
                },
                &[],
            )
            .await;
        assert_eq!(code, Code::Unauthenticated);
    }

    #[tokio::test]
    async fn client_timeout_shortens_handler_deadline() {
        let h = harness(Arc::new(StalledStore), Duration::from_secs(30));
        let refresh = h.refresh_codec.generate(1).expect("generate");

        let (code, _) = tokio::time::timeout(
            Duration::from_secs(5),
            h.call::<AccessTokenResponse>(
                "RefreshToken",
                &RefreshTokenRequest {
                    refresh_token: refresh.token,
                },
                &[("grpc-timeout", "100m".to_string())],
            ),
        )
        .await
        .expect("answered within the client timeout");
        assert_eq!(code, Code::DeadlineExceeded);
    }

    #[test]
    fn grpc_timeout_units() {
        assert_eq!(parse_grpc_timeout("2H"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_grpc_timeout("3M"), Some(Duration::from_secs(180)));
        assert_eq!(parse_grpc_timeout("10S"), Some(Duration::from_secs(10)));
        assert_eq!(parse_grpc_timeout("250m"), Some(Duration::from_millis(250)));
        assert_eq!(parse_grpc_timeout("7u"), Some(Duration::from_micros(7)));
        assert_eq!(parse_grpc_timeout("99999999n"), Some(Duration::from_nanos(99_999_999)));
    }

    #[test]
    fn grpc_timeout_rejects_malformed() {
        for value in ["", "S", "10", "10x", "-1S", "123456789S", "1.5S"] {
            assert_eq!(parse_grpc_timeout(value), None, "{value}");
        }
    }

    #[test]
    fn status_mapping() {
        let cases = [
            (AuthError::invalid_argument("name is required"), Code::InvalidArgument),
            (AuthError::AuthenticationFailed, Code::Unauthenticated),
            (AuthError::Unauthenticated(INVALID_TOKEN), Code::Unauthenticated),
            (AuthError::InvalidToken, Code::Unauthenticated),
            (AuthError::InvalidState, Code::InvalidArgument),
            (AuthError::DuplicateEmail, Code::AlreadyExists),
            (AuthError::NotFound, Code::NotFound),
            (AuthError::ExchangeFailed, Code::Unavailable),
            (AuthError::ProfileFetchFailed, Code::Unavailable),
            (AuthError::DeadlineExceeded, Code::DeadlineExceeded),
            (
                AuthError::internal(anyhow::anyhow!("redis down")),
                Code::Internal,
            ),
        ];
        for (err, code) in cases {
            let status = Status::from(err);
            assert_eq!(status.code(), code);
        }
    }

    #[test]
    fn internal_status_is_opaque() {
        let status = Status::from(AuthError::internal(anyhow::anyhow!("10.0.0.7:6379 refused")));
        assert_eq!(status.message(), "internal error");
    }

    #[test]
    fn missing_principal_is_unauthenticated() {
        let request = Request::new(Empty {});
        let status = principal(&request).expect_err("no principal");
        assert_eq!(status.code(), Code::Unauthenticated);

        let mut request = Request::new(Empty {});
        request.extensions_mut().insert(PrincipalId(5));
        assert_eq!(principal(&request).expect("principal"), PrincipalId(5));
    }
}
