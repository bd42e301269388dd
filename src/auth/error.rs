//! Externally observable error taxonomy for the auth core.
//!
//! Component errors convert into [`AuthError`]; transports map it to gRPC status
//! codes (`rpc`) or HTTP responses (`api`). Messages are safe to return to
//! clients: `Internal` always renders as "internal error" and the operator
//! detail stays in the wrapped source.

use thiserror::Error;

use super::{
    federated::OAuthError, password::PasswordError, session::SessionError, token::TokenError,
    users::DirectoryError,
};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidArgument(String),
    /// Shared by wrong-password and unknown-email sign-ins.
    #[error("email or password is incorrect")]
    AuthenticationFailed,
    #[error("{0}")]
    Unauthenticated(&'static str),
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid state")]
    InvalidState,
    #[error("email already registered")]
    DuplicateEmail,
    #[error("user not found")]
    NotFound,
    #[error("identity provider error")]
    ExchangeFailed,
    #[error("identity provider error")]
    ProfileFetchFailed,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl AuthError {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Mismatch => Self::AuthenticationFailed,
            PasswordError::HashingFailed(_) => Self::internal(err),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => Self::InvalidToken,
            TokenError::Encode(_) => Self::internal(err),
        }
    }
}

impl From<SessionError> for AuthError {
    fn from(err: SessionError) -> Self {
        Self::internal(err)
    }
}

impl From<DirectoryError> for AuthError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound => Self::NotFound,
            DirectoryError::DuplicateEmail => Self::DuplicateEmail,
            DirectoryError::Backend(_) => Self::internal(err),
        }
    }
}

impl From<OAuthError> for AuthError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::ExchangeFailed(_) => Self::ExchangeFailed,
            OAuthError::ProfileFetchFailed(_) => Self::ProfileFetchFailed,
        }
    }
}
