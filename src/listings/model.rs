use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Lifecycle status of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "listing_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ListingStatus {
    #[serde(alias = "draft")]
    Draft,
    #[serde(alias = "pending")]
    Pending,
    #[serde(alias = "approved")]
    Approved,
    #[serde(alias = "rejected")]
    Rejected,
    #[serde(alias = "sold")]
    Sold,
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ListingStatus::Draft => "DRAFT",
            ListingStatus::Pending => "PENDING",
            ListingStatus::Approved => "APPROVED",
            ListingStatus::Rejected => "REJECTED",
            ListingStatus::Sold => "SOLD",
        };
        f.write_str(s)
    }
}

/// Furniture item offered by a seller.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Listing {
    pub id: i64,
    pub seller_id: i64,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub image_url: Option<String>,
    pub admin_notes: Option<String>,
    pub status: ListingStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
