use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use super::{
    ListingPatch, NewListing, NewUser, Store, StoreError, StoreResult, UserPatch,
};
use crate::{
    config::AppConfig,
    listings::model::{Listing, ListingStatus},
    users::model::{Role, User},
};

const USER_COLUMNS: &str =
    "id, email, first_name, last_name, password_hash, role, created_at, updated_at";
const LISTING_COLUMNS: &str = "id, seller_id, title, description, price, image_url, \
     admin_notes, status, created_at, updated_at";

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub fn from_pool(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run migrations")?;
        Ok(())
    }
}

fn classify(err: sqlx::Error, what: &'static str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::UniqueViolation(what);
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::ForeignKeyViolation("user");
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users (email, first_name, last_name, password_hash, role)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.password_hash)
            .bind(user.role)
            .fetch_one(&self.db)
            .await
            .map_err(|e| classify(e, "users.email"))
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn get_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE ($1::user_role IS NULL OR role = $1)
             ORDER BY id"
        );
        let rows = sqlx::query_as::<_, User>(&sql)
            .bind(role)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn update_user(&self, id: i64, patch: UserPatch) -> StoreResult<User> {
        let sql = format!(
            "UPDATE users
                SET email = COALESCE($2, email),
                    first_name = COALESCE($3, first_name),
                    last_name = COALESCE($4, last_name),
                    updated_at = now()
              WHERE id = $1
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(patch.email)
            .bind(patch.first_name)
            .bind(patch.last_name)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| classify(e, "users.email"))?
            .ok_or(StoreError::NotFound("user"))
    }

    async fn delete_user(&self, id: i64) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn create_listing(&self, listing: NewListing) -> StoreResult<Listing> {
        let sql = format!(
            "INSERT INTO listings (seller_id, title, description, price, image_url, status)
             VALUES ($1, $2, $3, $4, $5, 'DRAFT')
             RETURNING {LISTING_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Listing>(&sql)
            .bind(listing.seller_id)
            .bind(&listing.title)
            .bind(&listing.description)
            .bind(listing.price)
            .bind(&listing.image_url)
            .fetch_one(&self.db)
            .await
            .map_err(|e| classify(e, "listings"))?;
        info!(listing_id = row.id, seller_id = row.seller_id, "listing row inserted");
        Ok(row)
    }

    async fn get_listing_by_id(&self, id: i64) -> StoreResult<Option<Listing>> {
        let sql = format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1");
        let row = sqlx::query_as::<_, Listing>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn list_listings(&self, status: Option<ListingStatus>) -> StoreResult<Vec<Listing>> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM listings
             WHERE ($1::listing_status IS NULL OR status = $1)
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, Listing>(&sql)
            .bind(status)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn update_listing(
        &self,
        id: i64,
        expected: ListingStatus,
        patch: ListingPatch,
    ) -> StoreResult<Listing> {
        // Guard and write in one statement so concurrent transitions serialize on the row.
        let sql = format!(
            "UPDATE listings
                SET title = COALESCE($3, title),
                    description = COALESCE($4, description),
                    price = COALESCE($5, price),
                    image_url = COALESCE($6, image_url),
                    admin_notes = COALESCE($7, admin_notes),
                    status = COALESCE($8, status),
                    updated_at = now()
              WHERE id = $1 AND status = $2
             RETURNING {LISTING_COLUMNS}"
        );
        sqlx::query_as::<_, Listing>(&sql)
            .bind(id)
            .bind(expected)
            .bind(patch.title)
            .bind(patch.description)
            .bind(patch.price)
            .bind(patch.image_url)
            .bind(patch.admin_notes)
            .bind(patch.status)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::PreconditionFailed)
    }

    async fn delete_listing(&self, id: i64) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM listings WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn close(&self) {
        self.db.close().await;
        info!("database pool closed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{error::AppError, listings::services::submit_listing, policy::Caller};

    async fn seeded(pool: PgPool) -> (Arc<PgStore>, Caller, i64) {
        let store = Arc::new(PgStore::from_pool(pool));
        let seller = store
            .create_user(NewUser {
                email: "seller@example.com".into(),
                first_name: "Sam".into(),
                last_name: "Seller".into(),
                password_hash: "not-a-real-hash".into(),
                role: Role::Seller,
            })
            .await
            .unwrap();
        let listing = store
            .create_listing(NewListing {
                seller_id: seller.id,
                title: "Oak chair".into(),
                description: "Solid oak".into(),
                price: 40.0,
                image_url: None,
            })
            .await
            .unwrap();
        let caller = Caller {
            id: seller.id,
            role: Role::Seller,
        };
        (store, caller, listing.id)
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn concurrent_submits_apply_once(pool: PgPool) {
        let (store, seller, id) = seeded(pool).await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                submit_listing(store.as_ref(), &seller, id).await
            }));
        }
        let (mut applied, mut conflicts) = (0, 0);
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => applied += 1,
                Err(AppError::StateConflict(_)) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((applied, conflicts), (1, 7));

        let row = store.get_listing_by_id(id).await.unwrap().unwrap();
        assert_eq!(row.status, ListingStatus::Pending);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn constraint_violations_are_classified(pool: PgPool) {
        let (store, _, _) = seeded(pool).await;

        let err = store
            .create_user(NewUser {
                email: "seller@example.com".into(),
                first_name: "Dup".into(),
                last_name: "Dup".into(),
                password_hash: "x".into(),
                role: Role::Consumer,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));

        let err = store
            .create_listing(NewListing {
                seller_id: 9999,
                title: "Lamp".into(),
                description: "Brass".into(),
                price: 10.0,
                image_url: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation(_)));
    }
}
