use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::{
    listings::lifecycle::TransitionError, policy::PolicyError, store::StoreError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    /// Bad login. Unknown email and wrong password share this variant.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("authentication required")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    StateConflict(#[from] TransitionError),

    #[error("email already registered")]
    EmailTaken,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StateConflict(_) | AppError::EmailTaken => StatusCode::CONFLICT,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PolicyError> for AppError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Unauthenticated => AppError::Unauthenticated,
            PolicyError::Forbidden => AppError::Forbidden,
        }
    }
}

/// Request body fields clients may send.
const BODY_FIELDS: &[&str] = &[
    "email",
    "password",
    "first_name",
    "last_name",
    "role",
    "title",
    "description",
    "price",
    "image_url",
    "admin_notes",
];

/// Field named by a serde data error, if it is one of `BODY_FIELDS`.
fn rejected_field(body_text: &str) -> Option<&'static str> {
    lazy_static! {
        static ref FIELD_RE: Regex = Regex::new(r"target type: ([A-Za-z_][A-Za-z0-9_]*): ").unwrap();
    }
    let caps = FIELD_RE.captures(body_text)?;
    BODY_FIELDS.iter().copied().find(|f| *f == &caps[1])
}

// Serde's rejection text names Rust types and enum variants. Clients only get
// the field and a fixed message; the full text is logged at debug.

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let detail = rejection.body_text();
        debug!(error = %detail, "json body rejected");
        match rejection {
            JsonRejection::JsonDataError(_) => match rejected_field(&detail) {
                Some(field) => AppError::invalid(field, "has an invalid type or value"),
                None => AppError::invalid("body", "unknown or invalid fields"),
            },
            JsonRejection::JsonSyntaxError(_) => AppError::invalid("body", "malformed JSON"),
            JsonRejection::MissingJsonContentType(_) => {
                AppError::invalid("body", "expected Content-Type: application/json")
            }
            _ => AppError::invalid("body", "could not read request body"),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        debug!(error = %rejection.body_text(), "path rejected");
        AppError::invalid("id", "must be an integer")
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        debug!(error = %rejection.body_text(), "query rejected");
        AppError::invalid("query", "unknown or invalid filter value")
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a [FieldError]>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Validation(fields) => ErrorBody {
                error: self.to_string(),
                fields: Some(fields.as_slice()),
            },
            AppError::Store(_) | AppError::Internal(_) => {
                error!(error = %self, "request failed");
                ErrorBody {
                    error: "internal server error".into(),
                    fields: None,
                }
            }
            _ => ErrorBody {
                error: self.to_string(),
                fields: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
