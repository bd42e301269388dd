use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::Clock;

/// `nbf` is backdated by this many seconds to absorb small issuer clock skew.
pub const CLOCK_SKEW_SECONDS: i64 = 5;

#[derive(Debug, Error)]
pub enum TokenError {
    /// Parse, signature, claim and time-window failures are indistinguishable.
    #[error("invalid token")]
    Invalid,
    #[error("token encoding failed: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    /// Principal id carried in `sub`. Always valid after [`TokenCodec::validate`].
    #[must_use]
    pub fn principal_id(&self) -> Option<u64> {
        self.sub.parse().ok()
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Token identity (`jti`), recorded in the session store.
    pub id: String,
}

/// HS256 signer/validator bound to one issuer, secret and lifetime.
#[derive(Clone)]
pub struct TokenCodec {
    issuer: String,
    lifetime_seconds: i64,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        secret: &SecretString,
        lifetime_seconds: i64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let issuer = issuer.into();
        let key = secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_audience(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["iss", "sub", "aud", "iat", "nbf", "exp"]);
        // Time window is checked against the injected clock.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;

        Self {
            issuer,
            lifetime_seconds,
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            validation,
            clock,
        }
    }

    #[must_use]
    pub fn lifetime_seconds(&self) -> i64 {
        self.lifetime_seconds
    }

    /// # Errors
    /// Returns `Encode` if signing fails.
    pub fn generate(&self, principal_id: u64) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now();
        let id = Uuid::new_v4().to_string();
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: principal_id.to_string(),
            aud: self.issuer.clone(),
            iat: now,
            nbf: now - CLOCK_SKEW_SECONDS,
            exp: now + self.lifetime_seconds,
            jti: id.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(TokenError::Encode)?;

        Ok(IssuedToken { token, id })
    }

    /// Accepts a token iff the signature is HS256 over our secret, issuer and
    /// audience match, `nbf <= now < exp`, and `sub` is a non-negative integer.
    ///
    /// # Errors
    /// Returns `Invalid` on any failure.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| TokenError::Invalid)?
            .claims;

        let now = self.clock.now();
        if now < claims.nbf || now >= claims.exp {
            return Err(TokenError::Invalid);
        }
        if claims.principal_id().is_none() || claims.jti.is_empty() {
            return Err(TokenError::Invalid);
        }

        Ok(claims)
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("lifetime_seconds", &self.lifetime_seconds)
            .finish_non_exhaustive()
    }
}
