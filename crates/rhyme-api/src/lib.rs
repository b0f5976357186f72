pub mod auth;
pub mod chat;
pub mod daily;
pub mod error;
pub mod extract;
pub mod friends;
pub mod middleware;
pub mod state;

use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use serde_json::{Value, json};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// All HTTP routes. Daily poems and auth are public; everything touching
/// the friendship graph requires a bearer token.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/daily/{date}", get(daily::get_daily_poem))
        .route("/api/daily/theme/{date}", get(daily::get_daily_theme));

    let protected_routes = Router::new()
        .route("/api/friends/follow", post(friends::follow))
        .route("/api/friends/list", get(friends::list_friends))
        .route("/api/friends/requests", get(friends::incoming_requests))
        .route("/api/friends/respond", post(friends::respond))
        .route("/api/friends/status/{username}", get(friends::status))
        .route("/api/friends/remove", delete(friends::remove))
        .route("/api/friends/search", get(friends::search))
        .route("/api/friends/chat/{username}", get(chat::history).post(chat::send))
        .route("/api/daily/{date}/regenerate", post(daily::regenerate))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
