//! Who may do what.
//!
//! Evaluation order: public actions first, then authentication, then role,
//! then ownership with ADMIN as the override.

use thiserror::Error;

use crate::{listings::model::ListingStatus, users::model::Role};

/// Verified identity of the caller, taken from a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: i64,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ReadListing(ListingStatus),
    CreateListing,
    EditListing,
    SubmitListing,
    DeleteListing,
    ValidateListing,
    RefuseListing,
    ListUsers,
    ReadUser,
    UpdateUser,
    DeleteUser,
    /// Register an account with the ADMIN role.
    GrantAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("forbidden")]
    Forbidden,
}

enum Rule {
    Public,
    /// Visible to everyone when approved, otherwise owner or ADMIN.
    Visibility,
    Roles(&'static [Role]),
    OwnerOrAdmin,
}

fn rule(action: Action) -> Rule {
    match action {
        Action::ReadListing(ListingStatus::Approved) => Rule::Public,
        Action::ReadListing(_) => Rule::Visibility,
        Action::CreateListing => Rule::Roles(&[Role::Seller, Role::Admin]),
        Action::ValidateListing
        | Action::RefuseListing
        | Action::ListUsers
        | Action::DeleteUser
        | Action::GrantAdmin => Rule::Roles(&[Role::Admin]),
        Action::EditListing
        | Action::SubmitListing
        | Action::DeleteListing
        | Action::ReadUser
        | Action::UpdateUser => Rule::OwnerOrAdmin,
    }
}

/// Decides whether `caller` may perform `action`.
///
/// `owner` is the owning user id of the target resource (the seller for a
/// listing, the account itself for a user) and is ignored by role-only rules.
pub fn authorize(caller: Option<&Caller>, action: Action, owner: Option<i64>) -> Result<(), PolicyError> {
    let owns = |c: &Caller| c.is_admin() || owner == Some(c.id);
    match rule(action) {
        Rule::Public => Ok(()),
        // Anonymous readers of a private listing get the same answer as any stranger.
        Rule::Visibility => match caller {
            Some(c) if owns(c) => Ok(()),
            _ => Err(PolicyError::Forbidden),
        },
        Rule::Roles(roles) => {
            let c = caller.ok_or(PolicyError::Unauthenticated)?;
            if roles.contains(&c.role) {
                Ok(())
            } else {
                Err(PolicyError::Forbidden)
            }
        }
        Rule::OwnerOrAdmin => {
            let c = caller.ok_or(PolicyError::Unauthenticated)?;
            if owns(c) {
                Ok(())
            } else {
                Err(PolicyError::Forbidden)
            }
        }
    }
}

/// Whether `caller` may see a listing in `status` owned by `seller_id`.
pub fn can_view(caller: Option<&Caller>, status: ListingStatus, seller_id: i64) -> bool {
    authorize(caller, Action::ReadListing(status), Some(seller_id)).is_ok()
}
