use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::model::Role;

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,    // user ID
    pub role: Role,     // role at issue time
    pub iat: usize,     // issued at (unix timestamp)
    pub exp: usize,     // expires at (unix timestamp)
    pub iss: String,    // issuer
    pub aud: String,    // audience
    pub jti: Uuid,      // token ID
}
