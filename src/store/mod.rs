//! Persistence contract used by the services.
//!
//! Services only ever see `&dyn Store`; the concrete backend is picked at
//! startup (`PgStore`) or in tests (`MemoryStore`).

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    listings::model::{Listing, ListingStatus},
    users::model::{Role, User},
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated on {0}")]
    UniqueViolation(&'static str),

    #[error("referenced {0} does not exist")]
    ForeignKeyViolation(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Conditional update matched no row: the id is gone or the status moved.
    #[error("precondition failed")]
    PreconditionFailed,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewListing {
    pub seller_id: i64,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub image_url: Option<String>,
}

/// Fields written by an edit or a transition. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ListingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub image_url: Option<String>,
    pub admin_notes: Option<String>,
    pub status: Option<ListingStatus>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn get_user_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>>;
    async fn update_user(&self, id: i64, patch: UserPatch) -> StoreResult<User>;
    /// Removes the user and, by cascade, every listing they own.
    async fn delete_user(&self, id: i64) -> StoreResult<bool>;

    async fn create_listing(&self, listing: NewListing) -> StoreResult<Listing>;
    async fn get_listing_by_id(&self, id: i64) -> StoreResult<Option<Listing>>;
    async fn list_listings(&self, status: Option<ListingStatus>) -> StoreResult<Vec<Listing>>;
    /// Applies `patch` only if the listing is still in `expected`, as one
    /// atomic step. Otherwise returns `StoreError::PreconditionFailed`.
    async fn update_listing(
        &self,
        id: i64,
        expected: ListingStatus,
        patch: ListingPatch,
    ) -> StoreResult<Listing>;
    async fn delete_listing(&self, id: i64) -> StoreResult<bool>;

    /// Releases backend resources on shutdown.
    async fn close(&self) {}
}
