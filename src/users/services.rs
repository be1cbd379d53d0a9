use tracing::{info, warn};

use super::{
    dto::{LoginRequest, LoginResponse, RegisterRequest, UpdateUserRequest},
    model::{Role, User},
};
use crate::{
    auth::{
        jwt::JwtKeys,
        password::{hash_password, normalize_email, verify_password, DUMMY_PASSWORD_HASH},
    },
    error::{AppError, AppResult},
    policy::{authorize, Action, Caller},
    store::{NewUser, Store, StoreError},
};

fn map_unique(err: StoreError) -> AppError {
    match err {
        StoreError::UniqueViolation(_) => AppError::EmailTaken,
        other => AppError::Store(other),
    }
}

/// Creates an account. Asking for ADMIN requires an authenticated ADMIN caller.
pub async fn register(
    store: &dyn Store,
    caller: Option<&Caller>,
    default_role: Role,
    req: RegisterRequest,
) -> AppResult<User> {
    let reg = req.validate(default_role)?;
    if reg.role == Role::Admin {
        authorize(caller, Action::GrantAdmin, None)?;
    }

    if store.get_user_by_email(&reg.email).await?.is_some() {
        warn!(email = %reg.email, "email already registered");
        return Err(AppError::EmailTaken);
    }

    let password_hash = hash_password(&reg.password)?;
    let user = store
        .create_user(NewUser {
            email: reg.email,
            first_name: reg.first_name,
            last_name: reg.last_name,
            password_hash,
            role: reg.role,
        })
        .await
        .map_err(map_unique)?;

    info!(user_id = user.id, role = %user.role, "user registered");
    Ok(user)
}

/// Verifies credentials and issues a bearer token.
///
/// Unknown email and wrong password produce the same error.
pub async fn login(store: &dyn Store, keys: &JwtKeys, req: LoginRequest) -> AppResult<LoginResponse> {
    let (Some(email), Some(password)) = (req.email, req.password) else {
        return Err(AppError::invalid("credentials", "email and password are required"));
    };
    let email = normalize_email(&email);

    let Some(user) = store.get_user_by_email(&email).await? else {
        // same Argon2 cost as a wrong password; the result is irrelevant
        let _ = verify_password(&password, DUMMY_PASSWORD_HASH);
        warn!("login unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(&password, &user.password_hash)? {
        warn!(user_id = user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let token = keys.sign(Caller {
        id: user.id,
        role: user.role,
    })?;

    info!(user_id = user.id, "user logged in");
    Ok(LoginResponse {
        token,
        token_type: "Bearer",
        expires_in: keys.ttl.whole_seconds(),
        user: user.into(),
    })
}

pub async fn get_user(store: &dyn Store, caller: &Caller, id: i64) -> AppResult<User> {
    let user = store
        .get_user_by_id(id)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    authorize(Some(caller), Action::ReadUser, Some(user.id))?;
    Ok(user)
}

pub async fn list_users(store: &dyn Store, caller: &Caller, role: Option<Role>) -> AppResult<Vec<User>> {
    authorize(Some(caller), Action::ListUsers, None)?;
    Ok(store.list_users(role).await?)
}

pub async fn update_user(
    store: &dyn Store,
    caller: &Caller,
    id: i64,
    req: UpdateUserRequest,
) -> AppResult<User> {
    let patch = req.validate()?;
    let current = store
        .get_user_by_id(id)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    authorize(Some(caller), Action::UpdateUser, Some(current.id))?;

    if let Some(email) = &patch.email {
        if email != &current.email && store.get_user_by_email(email).await?.is_some() {
            return Err(AppError::EmailTaken);
        }
    }

    let user = store.update_user(id, patch).await.map_err(|e| match e {
        StoreError::NotFound(what) => AppError::NotFound(what),
        other => map_unique(other),
    })?;
    info!(user_id = user.id, by = caller.id, "user updated");
    Ok(user)
}

/// Deletes an account and, by cascade, all of its listings.
pub async fn delete_user(store: &dyn Store, caller: &Caller, id: i64) -> AppResult<()> {
    authorize(Some(caller), Action::DeleteUser, Some(id))?;
    if !store.delete_user(id).await? {
        return Err(AppError::NotFound("user"));
    }
    info!(user_id = id, by = caller.id, "user deleted");
    Ok(())
}

/// Creates the configured ADMIN account at startup unless the email is already taken.
pub async fn ensure_admin(store: &dyn Store, email: &str, password: &str) -> anyhow::Result<()> {
    let email = normalize_email(email);
    if store.get_user_by_email(&email).await?.is_some() {
        return Ok(());
    }
    let req = RegisterRequest {
        email: Some(email),
        password: Some(password.to_string()),
        first_name: Some("Admin".into()),
        last_name: Some("Admin".into()),
        role: Some(Role::Admin),
    };
    let reg = req
        .validate(Role::Admin)
        .map_err(|e| anyhow::anyhow!("bootstrap admin rejected: {e:?}"))?;
    let user = store
        .create_user(NewUser {
            email: reg.email,
            first_name: reg.first_name,
            last_name: reg.last_name,
            password_hash: hash_password(&reg.password)?,
            role: Role::Admin,
        })
        .await?;
    info!(user_id = user.id, "bootstrap admin created");
    Ok(())
}
