use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use rhyme_types::api::Claims;

use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// Extract and validate JWT from Authorization header, and check that its
/// subject is still a registered user.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".into()))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized("Could not validate credentials".into()))?;

    // A signed token can outlive its account.
    let mut claims = token_data.claims;
    let user_id = claims.sub;
    let user = blocking(&state, move |db| db.get_user_by_id(&user_id))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Could not validate credentials".into()))?;
    claims.username = user.username;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
