//! Bearer token check shared by the RPC and HTTP authorizers.

use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

use super::{AuthError, SessionError, SessionStore, TokenCodec};

pub const INVALID_TOKEN: &str = "invalid token";

/// Authenticated principal attached to a request once the verifier accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrincipalId(pub u64);

/// Validates access tokens and checks them against the access session store.
#[derive(Clone)]
pub struct TokenVerifier {
    codec: TokenCodec,
    sessions: Arc<dyn SessionStore>,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(codec: TokenCodec, sessions: Arc<dyn SessionStore>) -> Self {
        Self { codec, sessions }
    }

    /// Every failure is `Unauthenticated("invalid token")`; a session store
    /// outage is logged but reported the same way.
    ///
    /// # Errors
    /// Returns `Unauthenticated` when the token is not the live access token.
    pub async fn verify(&self, token: &str) -> Result<PrincipalId, AuthError> {
        let claims = self.codec.validate(token).map_err(|_| invalid())?;
        let id = claims.principal_id().ok_or_else(invalid)?;

        let live = match self.sessions.get(&claims.sub).await {
            Ok(live) => live,
            Err(SessionError::NotFound) => {
                debug!(principal = id, "no live access session");
                return Err(invalid());
            }
            Err(err) => {
                tracing::error!("Failed to read access session: {err}");
                return Err(invalid());
            }
        };

        if bool::from(live.as_bytes().ct_eq(claims.jti.as_bytes())) {
            Ok(PrincipalId(id))
        } else {
            debug!(principal = id, "access token superseded");
            Err(invalid())
        }
    }
}

fn invalid() -> AuthError {
    AuthError::Unauthenticated(INVALID_TOKEN)
}

/// Extract the token from an `Authorization: Bearer <token>` value.
#[must_use]
pub fn extract_bearer_token(value: &str) -> Option<&str> {
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
