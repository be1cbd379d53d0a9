use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{CreateListingRequest, ListingFilter, ReviewRequest, UpdateListingRequest},
    model::Listing,
    services,
};
use crate::{
    auth::extractors::{AuthUser, MaybeAuthUser},
    error::AppResult,
    extract::{JsonBody, PathParam, QueryParams},
    state::AppState,
};

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/listings", get(list_listings))
        .route("/listings/:id", get(get_listing))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/listings", post(create_listing))
        .route(
            "/listings/:id",
            axum::routing::patch(edit_listing).delete(delete_listing),
        )
        .route("/listings/:id/submit", post(submit_listing))
        .route("/listings/:id/validate", post(validate_listing))
        .route("/listings/:id/refuse", post(refuse_listing))
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn list_listings(
    State(state): State<AppState>,
    MaybeAuthUser(caller): MaybeAuthUser,
    QueryParams(filter): QueryParams<ListingFilter>,
) -> AppResult<Json<Vec<Listing>>> {
    let rows = services::list_listings(state.store.as_ref(), caller.as_ref(), filter.status).await?;
    Ok(Json(rows))
}

#[instrument(skip(state))]
pub async fn get_listing(
    State(state): State<AppState>,
    MaybeAuthUser(caller): MaybeAuthUser,
    PathParam(id): PathParam<i64>,
) -> AppResult<Json<Listing>> {
    let listing = services::get_listing(state.store.as_ref(), caller.as_ref(), id).await?;
    Ok(Json(listing))
}

#[instrument(skip(state, payload))]
pub async fn create_listing(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    JsonBody(payload): JsonBody<CreateListingRequest>,
) -> AppResult<(StatusCode, HeaderMap, Json<Listing>)> {
    let listing = services::create_listing(state.store.as_ref(), &caller, payload).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/api/v1/listings/{}", listing.id)) {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(listing)))
}

#[instrument(skip(state, payload))]
pub async fn edit_listing(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    PathParam(id): PathParam<i64>,
    JsonBody(payload): JsonBody<UpdateListingRequest>,
) -> AppResult<Json<Listing>> {
    let listing = services::edit_listing(state.store.as_ref(), &caller, id, payload).await?;
    Ok(Json(listing))
}

#[instrument(skip(state))]
pub async fn delete_listing(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    PathParam(id): PathParam<i64>,
) -> AppResult<StatusCode> {
    services::delete_listing(state.store.as_ref(), &caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn submit_listing(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    PathParam(id): PathParam<i64>,
) -> AppResult<Json<Listing>> {
    let listing = services::submit_listing(state.store.as_ref(), &caller, id).await?;
    Ok(Json(listing))
}

/// Body is optional: `{ "admin_notes": "..." }`.
#[instrument(skip(state, body))]
pub async fn validate_listing(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    PathParam(id): PathParam<i64>,
    body: Option<JsonBody<ReviewRequest>>,
) -> AppResult<Json<Listing>> {
    let notes = body.and_then(|JsonBody(b)| b.notes());
    let listing = services::validate_listing(state.store.as_ref(), &caller, id, notes).await?;
    Ok(Json(listing))
}

#[instrument(skip(state, body))]
pub async fn refuse_listing(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    PathParam(id): PathParam<i64>,
    body: Option<JsonBody<ReviewRequest>>,
) -> AppResult<Json<Listing>> {
    let notes = body.and_then(|JsonBody(b)| b.notes());
    let listing = services::refuse_listing(state.store.as_ref(), &caller, id, notes).await?;
    Ok(Json(listing))
}
