mod dto;
pub mod handlers;
pub mod lifecycle;
pub mod model;
pub mod services;

pub use dto::{CreateListingRequest, ListingFilter, ReviewRequest, UpdateListingRequest};

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
}
