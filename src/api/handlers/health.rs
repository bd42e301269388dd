use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{api::ApiState, GIT_COMMIT_HASH};

#[derive(Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
    session_store: String,
}

const fn status_str(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

// axum handler for health
pub async fn health(Extension(state): Extension<ApiState>) -> impl IntoResponse {
    let status = state.service.dependency_status().await;

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: status_str(status.database).to_string(),
        session_store: status_str(status.session_store).to_string(),
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            debug!("X-App header: {:?}", x_app_header_value);

            let mut headers = HeaderMap::new();

            headers.insert("X-App", x_app_header_value);

            headers
        })
        .map_err(|err| {
            error!("Failed to parse X-App header: {}", err);
        });

    // Empty headers if the value could not be built
    let headers = headers.unwrap_or_else(|()| HeaderMap::new());

    if status.is_healthy() {
        (StatusCode::OK, headers, Json(health))
    } else {
        debug!(
            database = status.database,
            session_store = status.session_store,
            "Dependency check failed"
        );
        (StatusCode::SERVICE_UNAVAILABLE, headers, Json(health))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings() {
        assert_eq!(status_str(true), "ok");
        assert_eq!(status_str(false), "error");
    }
}
