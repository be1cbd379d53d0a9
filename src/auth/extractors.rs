use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::jwt::JwtKeys;
use crate::{error::AppError, policy::Caller};

/// Authenticated caller. Rejects the request without a valid bearer token.
pub struct AuthUser(pub Caller);

/// Optional caller for public routes. A token that is present but invalid
/// still rejects the request.
pub struct MaybeAuthUser(pub Option<Caller>);

fn bearer_caller(parts: &Parts, keys: &JwtKeys) -> Result<Option<Caller>, AppError> {
    let Some(header) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let token = header
        .to_str()
        .ok()
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        .ok_or(AppError::Unauthenticated)?;

    match keys.authenticate(token.trim()) {
        Ok(caller) => Ok(Some(caller)),
        Err(e) => {
            warn!(error = %e, "invalid or expired token");
            Err(AppError::Unauthenticated)
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        bearer_caller(parts, &keys)?
            .map(AuthUser)
            .ok_or(AppError::Unauthenticated)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        Ok(MaybeAuthUser(bearer_caller(parts, &keys)?))
    }
}
