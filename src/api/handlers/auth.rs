//! Auth routes of the gateway. Bodies mirror the RPC messages as JSON.

use axum::{
    extract::{rejection::JsonRejection, Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::{
    api::ApiState,
    auth::{AccessToken, AuthError, PrincipalId, TokenPair, UserSnapshot, INVALID_TOKEN},
};

#[derive(Debug, Deserialize)]
pub struct SignupBody {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct SigninBody {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenBody {
    #[serde(default)]
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    state: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Serialize)]
pub struct UserBody {
    id: u64,
    name: String,
    email: String,
    created_at: i64,
    updated_at: i64,
}

impl From<UserSnapshot> for UserBody {
    fn from(user: UserSnapshot) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenBody {
    access_token: String,
    refresh_token: String,
    token_type: &'static str,
    expires_in: i64,
}

impl From<TokenPair> for TokenBody {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: pair.token_type,
            expires_in: pair.expires_in,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccessTokenBody {
    access_token: String,
    token_type: &'static str,
    expires_in: i64,
}

impl From<AccessToken> for AccessTokenBody {
    fn from(token: AccessToken) -> Self {
        Self {
            access_token: token.access_token,
            token_type: token.token_type,
            expires_in: token.expires_in,
        }
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        debug!("Rejected request body: {rejection}");
        AuthError::invalid_argument(rejection.body_text())
    })
}

// Set by the authorizer middleware on protected routes.
fn principal(extension: Option<Extension<PrincipalId>>) -> Result<PrincipalId, AuthError> {
    extension
        .map(|Extension(principal)| principal)
        .ok_or(AuthError::Unauthenticated(INVALID_TOKEN))
}

pub async fn signup(
    Extension(state): Extension<ApiState>,
    payload: Result<Json<SignupBody>, JsonRejection>,
) -> Result<impl IntoResponse, AuthError> {
    let req = body(payload)?;
    let user = state
        .deadline()
        .run(state.service.signup(&req.name, &req.email, &req.password))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "user": UserBody::from(user) })),
    ))
}

pub async fn signin(
    Extension(state): Extension<ApiState>,
    payload: Result<Json<SigninBody>, JsonRejection>,
) -> Result<Json<TokenBody>, AuthError> {
    let req = body(payload)?;
    let tokens = state
        .deadline()
        .run(state.service.signin(&req.email, &req.password))
        .await?;
    Ok(Json(tokens.into()))
}

pub async fn signout(
    Extension(state): Extension<ApiState>,
    principal_id: Option<Extension<PrincipalId>>,
) -> Result<StatusCode, AuthError> {
    let principal_id = principal(principal_id)?;
    state
        .deadline()
        .run(state.service.signout(principal_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn refresh_token(
    Extension(state): Extension<ApiState>,
    payload: Result<Json<RefreshTokenBody>, JsonRejection>,
) -> Result<Json<AccessTokenBody>, AuthError> {
    let req = body(payload)?;
    let token = state
        .deadline()
        .run(state.service.refresh_token(&req.refresh_token))
        .await?;
    Ok(Json(token.into()))
}

pub async fn signin_user(
    Extension(state): Extension<ApiState>,
    principal_id: Option<Extension<PrincipalId>>,
) -> Result<Json<UserBody>, AuthError> {
    let principal_id = principal(principal_id)?;
    let user = state
        .deadline()
        .run(state.service.get_signin_user(principal_id))
        .await?;
    Ok(Json(user.into()))
}

pub async fn google_login(Extension(state): Extension<ApiState>) -> impl IntoResponse {
    Json(json!({ "url": state.service.google_login_url() }))
}

pub async fn google_callback(
    Extension(state): Extension<ApiState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<TokenBody>, AuthError> {
    let signin = state
        .deadline()
        .run(
            state
                .service
                .google_login_callback(&params.state, &params.code),
        )
        .await?;
    debug!(origin = ?signin.origin, "Federated sign-in");
    Ok(Json(signin.tokens.into()))
}
