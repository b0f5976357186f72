use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use rhyme_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::state::{AppState, blocking, parse_user_id};

const MAX_NAME_LEN: usize = 100;

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_username(&req.username)?;
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("Password must be at least 8 characters".into()));
    }
    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if name.as_ref().is_some_and(|n| n.chars().count() > MAX_NAME_LEN) {
        return Err(ApiError::BadRequest("Name is too long".into()));
    }

    // Check if username is taken
    let username = req.username.clone();
    if blocking(&state, move |db| db.get_user_by_username(&username))
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("Username already taken".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?
        .to_string();

    let user_id = Uuid::new_v4();
    let now = state.clock.now();
    let username = req.username.clone();
    // A concurrent registration may have claimed the name during hashing.
    let created = blocking(&state, move |db| {
        db.create_user(&user_id, &username, name.as_deref(), &password_hash, now)
    })
    .await?;
    if !created {
        return Err(ApiError::Conflict("Username already taken".into()));
    }

    let token = create_token(&state, user_id, &req.username)?;
    info!("Registered user {}", req.username);

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid username or password".into());

    let username = req.username.clone();
    let user = blocking(&state, move |db| db.get_user_by_username(&username))
        .await?
        .ok_or_else(invalid)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash unreadable: {}", e)))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| invalid())?;

    let user_id = parse_user_id(&user.id)?;
    let token = create_token(&state, user_id, &user.username)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if username.len() < 3 || username.len() > 32 || !valid_chars {
        return Err(ApiError::BadRequest(
            "Username must be 3-32 characters of letters, digits, '_', '.' or '-'".into(),
        ));
    }
    Ok(())
}

pub fn create_token(state: &AppState, user_id: Uuid, username: &str) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (state.clock.now() + state.token_ttl).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(e.into()))
}
