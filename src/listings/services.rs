//! Listing orchestration: validate, authorize, check the lifecycle, persist.

use tracing::{info, warn};

use super::{
    dto::{CreateListingRequest, UpdateListingRequest},
    lifecycle::{transition, ListingAction, TransitionError},
    model::{Listing, ListingStatus},
};
use crate::{
    error::{AppError, AppResult},
    policy::{authorize, can_view, Action, Caller},
    store::{ListingPatch, Store, StoreError},
};

async fn load(store: &dyn Store, id: i64) -> AppResult<Listing> {
    store
        .get_listing_by_id(id)
        .await?
        .ok_or(AppError::NotFound("listing"))
}

pub async fn create_listing(
    store: &dyn Store,
    caller: &Caller,
    req: CreateListingRequest,
) -> AppResult<Listing> {
    authorize(Some(caller), Action::CreateListing, None)?;
    let new = req.validate(caller.id)?;
    let listing = store.create_listing(new).await.map_err(|e| match e {
        // the caller's account was deleted after the token was issued
        StoreError::ForeignKeyViolation(_) => AppError::Unauthenticated,
        other => AppError::Store(other),
    })?;
    info!(listing_id = listing.id, seller_id = listing.seller_id, "listing created");
    Ok(listing)
}

/// Unknown ids are reported as not found before any visibility check.
pub async fn get_listing(store: &dyn Store, caller: Option<&Caller>, id: i64) -> AppResult<Listing> {
    let listing = load(store, id).await?;
    authorize(caller, Action::ReadListing(listing.status), Some(listing.seller_id))?;
    Ok(listing)
}

/// Listings the caller may see, optionally narrowed to one status.
pub async fn list_listings(
    store: &dyn Store,
    caller: Option<&Caller>,
    status: Option<ListingStatus>,
) -> AppResult<Vec<Listing>> {
    let rows = store.list_listings(status).await?;
    Ok(rows
        .into_iter()
        .filter(|l| can_view(caller, l.status, l.seller_id))
        .collect())
}

/// Applies `action` to listing `id` with the matching permission check.
///
/// The status guard is checked against the loaded row and then enforced again
/// by the store's conditional update, so a concurrent transition that got there
/// first surfaces as a conflict instead of a second write.
async fn apply(
    store: &dyn Store,
    caller: &Caller,
    id: i64,
    action: ListingAction,
    permission: Action,
    mut patch: ListingPatch,
) -> AppResult<Listing> {
    let current = load(store, id).await?;
    authorize(Some(caller), permission, Some(current.seller_id))?;

    let next = transition(current.status, action).map_err(|e| {
        warn!(listing_id = id, from = %e.from, action = %e.action, "transition refused");
        e
    })?;
    if next != current.status {
        patch.status = Some(next);
    }

    match store.update_listing(id, current.status, patch).await {
        Ok(listing) => {
            info!(listing_id = id, by = caller.id, %action, from = %current.status, to = %listing.status, "listing updated");
            Ok(listing)
        }
        Err(StoreError::PreconditionFailed) => {
            let Some(now) = store.get_listing_by_id(id).await? else {
                return Err(AppError::NotFound("listing"));
            };
            warn!(listing_id = id, %action, status = %now.status, "lost transition race");
            Err(TransitionError {
                from: now.status,
                action,
            }
            .into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Edits a DRAFT listing.
pub async fn edit_listing(
    store: &dyn Store,
    caller: &Caller,
    id: i64,
    req: UpdateListingRequest,
) -> AppResult<Listing> {
    let patch = req.validate()?;
    apply(store, caller, id, ListingAction::Edit, Action::EditListing, patch).await
}

/// DRAFT -> PENDING.
pub async fn submit_listing(store: &dyn Store, caller: &Caller, id: i64) -> AppResult<Listing> {
    apply(
        store,
        caller,
        id,
        ListingAction::Submit,
        Action::SubmitListing,
        ListingPatch::default(),
    )
    .await
}

/// PENDING -> APPROVED.
pub async fn validate_listing(
    store: &dyn Store,
    caller: &Caller,
    id: i64,
    admin_notes: Option<String>,
) -> AppResult<Listing> {
    let patch = ListingPatch {
        admin_notes,
        ..ListingPatch::default()
    };
    apply(store, caller, id, ListingAction::Validate, Action::ValidateListing, patch).await
}

/// PENDING -> REJECTED.
pub async fn refuse_listing(
    store: &dyn Store,
    caller: &Caller,
    id: i64,
    admin_notes: Option<String>,
) -> AppResult<Listing> {
    let patch = ListingPatch {
        admin_notes,
        ..ListingPatch::default()
    };
    apply(store, caller, id, ListingAction::Refuse, Action::RefuseListing, patch).await
}

/// Deletes a listing in any status.
pub async fn delete_listing(store: &dyn Store, caller: &Caller, id: i64) -> AppResult<()> {
    let current = load(store, id).await?;
    authorize(Some(caller), Action::DeleteListing, Some(current.seller_id))?;
    if !store.delete_listing(id).await? {
        return Err(AppError::NotFound("listing"));
    }
    info!(listing_id = id, by = caller.id, status = %current.status, "listing deleted");
    Ok(())
}
