use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{PublicUser, UpdateUserRequest, UserFilter},
    services,
};
use crate::{
    auth::extractors::AuthUser,
    error::AppResult,
    extract::{JsonBody, PathParam, QueryParams},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    QueryParams(filter): QueryParams<UserFilter>,
) -> AppResult<Json<Vec<PublicUser>>> {
    let users = services::list_users(state.store.as_ref(), &caller, filter.role).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    PathParam(id): PathParam<i64>,
) -> AppResult<Json<PublicUser>> {
    let user = services::get_user(state.store.as_ref(), &caller, id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    PathParam(id): PathParam<i64>,
    JsonBody(payload): JsonBody<UpdateUserRequest>,
) -> AppResult<Json<PublicUser>> {
    let user = services::update_user(state.store.as_ref(), &caller, id, payload).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    PathParam(id): PathParam<i64>,
) -> AppResult<StatusCode> {
    services::delete_user(state.store.as_ref(), &caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
