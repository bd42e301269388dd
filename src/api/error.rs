use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

use crate::auth::AuthError;

#[must_use]
pub fn status_code(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidArgument(_) | AuthError::InvalidState => StatusCode::BAD_REQUEST,
        AuthError::AuthenticationFailed | AuthError::Unauthenticated(_) | AuthError::InvalidToken => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::DuplicateEmail => StatusCode::CONFLICT,
        AuthError::NotFound => StatusCode::NOT_FOUND,
        AuthError::ExchangeFailed | AuthError::ProfileFetchFailed => StatusCode::BAD_GATEWAY,
        AuthError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Internal(source) = &self {
            error!("Internal error: {source:#}");
        }
        let status = status_code(&self);
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
