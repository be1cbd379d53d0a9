use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::model::{Role, User};
use crate::{
    auth::password::{is_valid_email, is_valid_password, normalize_email, MIN_PASSWORD_LEN},
    error::{AppError, FieldError},
    store::UserPatch,
};

/// Request body for registration. Every field is optional on the wire and
/// checked in [`RegisterRequest::validate`].
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
}

/// Registration input after validation.
#[derive(Debug)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: PublicUser,
}

/// Name and email changes. Role and password are not updatable here.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            role: u.role,
            created_at: u.created_at,
        }
    }
}

/// Trimmed value of a required text field, recording an error when blank.
pub(crate) fn required(
    field: &'static str,
    value: Option<String>,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            errors.push(FieldError::new(field, "is required"));
            None
        }
    }
}

/// Like [`required`] but an absent value is fine; only a blank one is an error.
pub(crate) fn non_blank(
    field: &'static str,
    value: Option<String>,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let v = value?.trim().to_string();
    if v.is_empty() {
        errors.push(FieldError::new(field, "must not be blank"));
        None
    } else {
        Some(v)
    }
}

fn checked_email(raw: String, errors: &mut Vec<FieldError>) -> Option<String> {
    let email = normalize_email(&raw);
    if is_valid_email(&email) {
        Some(email)
    } else {
        errors.push(FieldError::new("email", "is not a valid email address"));
        None
    }
}

impl RegisterRequest {
    pub fn validate(self, default_role: Role) -> Result<Registration, AppError> {
        let mut errors = Vec::new();

        let email = required("email", self.email, &mut errors)
            .and_then(|e| checked_email(e, &mut errors));
        let password = match self.password {
            Some(p) if is_valid_password(&p) => Some(p),
            Some(_) => {
                errors.push(FieldError::new(
                    "password",
                    format!(
                        "must be at least {MIN_PASSWORD_LEN} characters with a lowercase letter, \
                         an uppercase letter and a digit"
                    ),
                ));
                None
            }
            None => {
                errors.push(FieldError::new("password", "is required"));
                None
            }
        };
        let first_name = required("first_name", self.first_name, &mut errors);
        let last_name = required("last_name", self.last_name, &mut errors);

        match (email, password, first_name, last_name) {
            (Some(email), Some(password), Some(first_name), Some(last_name)) if errors.is_empty() => {
                Ok(Registration {
                    email,
                    password,
                    first_name,
                    last_name,
                    role: self.role.unwrap_or(default_role),
                })
            }
            _ => Err(AppError::Validation(errors)),
        }
    }
}

impl UpdateUserRequest {
    pub fn validate(self) -> Result<UserPatch, AppError> {
        let mut errors = Vec::new();
        let email = non_blank("email", self.email, &mut errors)
            .and_then(|e| checked_email(e, &mut errors));
        let first_name = non_blank("first_name", self.first_name, &mut errors);
        let last_name = non_blank("last_name", self.last_name, &mut errors);

        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }
        if email.is_none() && first_name.is_none() && last_name.is_none() {
            return Err(AppError::invalid("body", "no updatable field provided"));
        }
        Ok(UserPatch {
            email,
            first_name,
            last_name,
        })
    }
}
