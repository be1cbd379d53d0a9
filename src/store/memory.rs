use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::{
    ListingPatch, NewListing, NewUser, Store, StoreError, StoreResult, UserPatch,
};
use crate::{
    listings::model::{Listing, ListingStatus},
    users::model::{Role, User},
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    listings: BTreeMap<i64, Listing>,
    next_user_id: i64,
    next_listing_id: i64,
}

/// In-process store with the same constraints as the SQL schema.
/// Every operation holds the table lock, so conditional updates are atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut t = self.tables.lock().await;
        if t.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation("users.email"));
        }
        t.next_user_id += 1;
        let now = OffsetDateTime::now_utc();
        let row = User {
            id: t.next_user_id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password_hash: user.password_hash,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn get_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.get(&id).cloned())
    }

    async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>> {
        let t = self.tables.lock().await;
        Ok(t.users
            .values()
            .filter(|u| role.map_or(true, |r| u.role == r))
            .cloned()
            .collect())
    }

    async fn update_user(&self, id: i64, patch: UserPatch) -> StoreResult<User> {
        let mut t = self.tables.lock().await;
        if let Some(email) = &patch.email {
            if t.users.values().any(|u| u.id != id && &u.email == email) {
                return Err(StoreError::UniqueViolation("users.email"));
            }
        }
        let user = t.users.get_mut(&id).ok_or(StoreError::NotFound("user"))?;
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(first_name) = patch.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = patch.last_name {
            user.last_name = last_name;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn delete_user(&self, id: i64) -> StoreResult<bool> {
        let mut t = self.tables.lock().await;
        let removed = t.users.remove(&id).is_some();
        if removed {
            t.listings.retain(|_, l| l.seller_id != id);
        }
        Ok(removed)
    }

    async fn create_listing(&self, listing: NewListing) -> StoreResult<Listing> {
        let mut t = self.tables.lock().await;
        if !t.users.contains_key(&listing.seller_id) {
            return Err(StoreError::ForeignKeyViolation("user"));
        }
        t.next_listing_id += 1;
        let now = OffsetDateTime::now_utc();
        let row = Listing {
            id: t.next_listing_id,
            seller_id: listing.seller_id,
            title: listing.title,
            description: listing.description,
            price: listing.price,
            image_url: listing.image_url,
            admin_notes: None,
            status: ListingStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        t.listings.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_listing_by_id(&self, id: i64) -> StoreResult<Option<Listing>> {
        let t = self.tables.lock().await;
        Ok(t.listings.get(&id).cloned())
    }

    async fn list_listings(&self, status: Option<ListingStatus>) -> StoreResult<Vec<Listing>> {
        let t = self.tables.lock().await;
        // newest first, like the SQL backend
        Ok(t.listings
            .values()
            .rev()
            .filter(|l| status.map_or(true, |s| l.status == s))
            .cloned()
            .collect())
    }

    async fn update_listing(
        &self,
        id: i64,
        expected: ListingStatus,
        patch: ListingPatch,
    ) -> StoreResult<Listing> {
        let mut t = self.tables.lock().await;
        let listing = match t.listings.get_mut(&id) {
            Some(l) if l.status == expected => l,
            _ => return Err(StoreError::PreconditionFailed),
        };
        if let Some(title) = patch.title {
            listing.title = title;
        }
        if let Some(description) = patch.description {
            listing.description = description;
        }
        if let Some(price) = patch.price {
            listing.price = price;
        }
        if let Some(image_url) = patch.image_url {
            listing.image_url = Some(image_url);
        }
        if let Some(notes) = patch.admin_notes {
            listing.admin_notes = Some(notes);
        }
        if let Some(status) = patch.status {
            listing.status = status;
        }
        listing.updated_at = OffsetDateTime::now_utc();
        Ok(listing.clone())
    }

    async fn delete_listing(&self, id: i64) -> StoreResult<bool> {
        let mut t = self.tables.lock().await;
        Ok(t.listings.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, role: Role) -> NewUser {
        NewUser {
            email: email.into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            password_hash: "hash".into(),
            role,
        }
    }

    fn new_listing(seller_id: i64) -> NewListing {
        NewListing {
            seller_id,
            title: "Oak table".into(),
            description: "Solid oak, 1920s".into(),
            price: 250.0,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@example.com", Role::Seller)).await.unwrap();
        let err = store
            .create_user(new_user("a@example.com", Role::Consumer))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn listing_requires_existing_seller() {
        let store = MemoryStore::new();
        let err = store.create_listing(new_listing(42)).await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation(_)));
    }

    fn moving_to(status: ListingStatus) -> ListingPatch {
        ListingPatch {
            status: Some(status),
            ..ListingPatch::default()
        }
    }

    #[tokio::test]
    async fn conditional_update_checks_expected_status() {
        let store = MemoryStore::new();
        let seller = store.create_user(new_user("s@example.com", Role::Seller)).await.unwrap();
        let listing = store.create_listing(new_listing(seller.id)).await.unwrap();
        assert_eq!(listing.status, ListingStatus::Draft);

        let err = store
            .update_listing(listing.id, ListingStatus::Pending, moving_to(ListingStatus::Approved))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed));

        let updated = store
            .update_listing(listing.id, ListingStatus::Draft, moving_to(ListingStatus::Pending))
            .await
            .unwrap();
        assert_eq!(updated.status, ListingStatus::Pending);
    }

    #[tokio::test]
    async fn deleting_user_cascades_to_listings() {
        let store = MemoryStore::new();
        let seller = store.create_user(new_user("s@example.com", Role::Seller)).await.unwrap();
        let listing = store.create_listing(new_listing(seller.id)).await.unwrap();

        assert!(store.delete_user(seller.id).await.unwrap());
        assert!(store.get_listing_by_id(listing.id).await.unwrap().is_none());
        assert!(!store.delete_user(seller.id).await.unwrap());
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let store = MemoryStore::new();
        let seller = store.create_user(new_user("s@example.com", Role::Seller)).await.unwrap();
        let first = store.create_listing(new_listing(seller.id)).await.unwrap();
        store.create_listing(new_listing(seller.id)).await.unwrap();
        store
            .update_listing(first.id, ListingStatus::Draft, moving_to(ListingStatus::Pending))
            .await
            .unwrap();

        let pending = store.list_listings(Some(ListingStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first.id);
        assert_eq!(store.list_listings(None).await.unwrap().len(), 2);
    }
}
