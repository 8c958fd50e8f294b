use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::Json,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    api::{ApiResponse, AppState},
    errors::{ApiError, ErrorContext},
    models::User,
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Salted sha256 password digest stored as "salt$hex". Token-based session
/// auth is deliberately simple here; real deployments front this service with
/// an identity provider.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{}${}", salt, digest(&salt, password))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, expected)) => digest(salt, password) == expected,
        None => false,
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Opaque bearer token; looked up in the database on every request
pub fn generate_token() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

/// Extractor for endpoints that require an authenticated user. Reads
/// `Authorization: Bearer <token>` and resolves it against stored tokens.
#[derive(Debug, Clone)]
pub struct AuthedUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthedUser {
    type Rejection = (StatusCode, Json<ApiResponse<()>>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let Some(token) = token else {
            let error = ApiError::Unauthorized("missing bearer token".to_string());
            return Err(error.to_response_with_context(ErrorContext::new("authenticate", "user")));
        };

        match state.db.get_user_by_token(token).await {
            Ok(Some(user)) => Ok(AuthedUser(user)),
            Ok(None) => {
                let error = ApiError::Unauthorized("invalid or expired token".to_string());
                Err(error.to_response_with_context(ErrorContext::new("authenticate", "user")))
            }
            Err(e) => {
                let error = ApiError::DatabaseError(e);
                Err(error.to_response_with_context(ErrorContext::new("authenticate", "user")))
            }
        }
    }
}
