use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
    Json,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::db::{
    find_user_by_email, find_user_by_token_hash, insert_session, insert_user, touch_last_login,
    validate_email, DbPool, LoginRequest, LoginResponse, NewUser, User, UserError, UserResponse,
};
use crate::AppState;

use super::error::ApiError;
use super::validation::validate_password;

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt_bytes: [u8; 16] = rand::rng().random();
    let salt = SaltString::encode_b64(&salt_bytes)?;
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
pub(crate) fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract the token from an `Authorization: Bearer <token>` or
/// `Authorization: Token <token>` header
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get("Authorization")?.to_str().ok()?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("Token "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Create a regular user with a normalized email and hashed password
pub async fn create_user(
    pool: &DbPool,
    email: &str,
    password: &str,
    name: &str,
) -> Result<User, UserError> {
    insert_new_user(pool, email, password, name, false).await
}

/// Create a user that is both staff and superuser
pub async fn create_superuser(
    pool: &DbPool,
    email: &str,
    password: &str,
    name: &str,
) -> Result<User, UserError> {
    insert_new_user(pool, email, password, name, true).await
}

async fn insert_new_user(
    pool: &DbPool,
    email: &str,
    password: &str,
    name: &str,
    superuser: bool,
) -> Result<User, UserError> {
    let email = validate_email(email)?;
    validate_password(password).map_err(UserError::InvalidPassword)?;
    let password_hash =
        hash_password(password).map_err(|e| UserError::PasswordHash(e.to_string()))?;

    insert_user(
        pool,
        &NewUser {
            email,
            password_hash,
            name: name.to_string(),
            is_staff: superuser,
            is_superuser: superuser,
        },
    )
    .await
}

/// Create the configured admin account if it does not exist yet
pub async fn ensure_admin_user(pool: &DbPool, auth: &AuthConfig) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (&auth.admin_email, &auth.admin_password) else {
        return Ok(());
    };

    if find_user_by_email(pool, email).await?.is_some() {
        return Ok(());
    }

    let user = create_superuser(pool, email, password, "Administrator").await?;
    tracing::info!(user_id = user.id, email = %user.email, "Created admin user");
    Ok(())
}

/// Issue a token for valid credentials
///
/// POST /api/user/token/
pub async fn login(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(request), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<Json<LoginResponse>, ApiError> {
    if let Err(e) = validate_password(&request.password) {
        tracing::debug!("Rejected login with malformed password: {}", e);
        return Err(invalid_credentials());
    }

    let user = find_user_by_email(&state.db, &request.email)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(invalid_credentials)?;

    if !verify_password(&request.password, &user.password_hash) {
        return Err(invalid_credentials());
    }

    let token = generate_token();
    let expires_at = Utc::now() + chrono::Duration::hours(state.config.auth.token_ttl_hours);
    insert_session(&state.db, user.id, &hash_token(&token), expires_at).await?;
    touch_last_login(&state.db, user.id).await?;

    tracing::info!(user_id = user.id, "Issued API token");

    Ok(Json(LoginResponse {
        token,
        user: UserResponse::from(user),
    }))
}

fn invalid_credentials() -> ApiError {
    ApiError::bad_request("Unable to authenticate with provided credentials")
}

/// The authenticated user
///
/// GET /api/user/me/
pub async fn me(user: User) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// Auth middleware that resolves the principal from the request token and
/// hands it to handlers through request extensions
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided"))?;

    let user = find_user_by_token_hash(&state.db, &hash_token(token))
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid token"))?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Extractor for the user resolved by `auth_middleware`
#[async_trait]
impl<S> FromRequestParts<S> for User
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided"))
    }
}
