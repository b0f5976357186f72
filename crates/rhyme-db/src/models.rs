//! Database row types. These map directly to SQLite rows and are kept apart
//! from the rhyme-types API models so the DB layer stays independent.

use chrono::{DateTime, Utc};
use rhyme_types::models::LinkStatus;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub password: String,
    pub created_at: String,
}

/// One directed `from -> to` row of the friendship graph.
#[derive(Debug, Clone)]
pub struct FriendLinkRow {
    pub status: LinkStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct IncomingRequestRow {
    pub user_id: String,
    pub username: String,
    pub name: Option<String>,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyPoemRow {
    pub date: String,
    pub theme: String,
    pub title: String,
    pub content: String,
    pub generated_by: String,
}

#[derive(Debug, Clone)]
pub struct ChatMessageRow {
    pub id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
