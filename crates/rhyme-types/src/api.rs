use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Direction;

// -- JWT Claims --

/// JWT claims issued at login and checked by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Friends --

/// Body shared by `follow` and `remove`.
#[derive(Debug, Deserialize)]
pub struct UsernameRequest {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct FollowResponse {
    pub status: &'static str,
    pub detail: &'static str,
}

#[derive(Debug, Serialize)]
pub struct FriendSummary {
    pub user_id: Uuid,
    pub username: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IncomingRequest {
    pub user_id: Uuid,
    pub username: String,
    pub name: Option<String>,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub username: String,
    /// `accept` or `decline`; anything else is a 400.
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct RespondResponse {
    pub status: &'static str,
    pub friend: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    pub status: &'static str,
    pub friend: String,
}

// -- Chat --

#[derive(Debug, Deserialize)]
pub struct SendChatRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatMessageResponse {
    pub id: Uuid,
    pub sender: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// -- Daily poem --

/// `available == false` means generation failed and only the theme is known.
#[derive(Debug, Serialize)]
pub struct DailyPoemResponse {
    pub date: String,
    pub theme: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct ThemeResponse {
    pub date: String,
    pub theme: String,
}
