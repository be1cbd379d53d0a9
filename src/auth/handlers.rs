use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    extractors::{AuthUser, MaybeAuthUser},
    jwt::JwtKeys,
};
use crate::{
    error::AppResult,
    extract::JsonBody,
    state::AppState,
    users::{
        dto::{LoginRequest, LoginResponse, PublicUser, RegisterRequest},
        services,
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    MaybeAuthUser(caller): MaybeAuthUser,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    let user = services::register(
        state.store.as_ref(),
        caller.as_ref(),
        state.config.default_role,
        payload,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let resp = services::login(state.store.as_ref(), &keys, payload).await?;
    Ok(Json(resp))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> AppResult<Json<PublicUser>> {
    let user = services::get_user(state.store.as_ref(), &caller, caller.id).await?;
    Ok(Json(user.into()))
}
