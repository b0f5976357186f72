use std::sync::Arc;

use tracing::error;
use uuid::Uuid;

use rhyme_daily::DailyPoemCache;
use rhyme_db::Database;
use rhyme_db::models::UserRow;
use rhyme_types::clock::Clock;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub daily: Arc<DailyPoemCache>,
    pub clock: Arc<dyn Clock>,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
}

/// Run a store call off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
        .map_err(ApiError::Internal)
}

/// Look up a user by username; unknown names are a 404.
pub async fn resolve_user(state: &AppState, username: &str) -> Result<(Uuid, UserRow), ApiError> {
    let name = username.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("username required".into()));
    }

    let user = blocking(state, move |db| db.get_user_by_username(&name))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    let id = parse_user_id(&user.id)?;
    Ok((id, user))
}

pub fn parse_user_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Corrupt user id '{}': {}", raw, e)))
}
