//! Ephemeral chat between friends.
//!
//! Messages are never deleted; reads only surface the trailing
//! [`CHAT_WINDOW_HOURS`] relative to the `now` the caller passes in.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::friends::accepted_link_exists;
use crate::models::ChatMessageRow;
use crate::{Database, format_timestamp, parse_timestamp};

pub const CHAT_WINDOW_HOURS: i64 = 24;

/// Outcome of a friendship-gated chat operation.
#[derive(Debug)]
pub enum ChatAccess<T> {
    Granted(T),
    /// The actor has no accepted link toward the counterpart.
    NotFriends,
}

impl Database {
    /// Stores a message from `sender` to `receiver` if `sender -> receiver`
    /// is accepted. The check and the insert share one transaction.
    pub fn send_chat_message(
        &self,
        sender: &Uuid,
        receiver: &Uuid,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatAccess<ChatMessageRow>> {
        self.with_tx(|tx| {
            if !accepted_link_exists(tx, sender, receiver)? {
                return Ok(ChatAccess::NotFriends);
            }

            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO chat_messages (id, sender_id, receiver_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, sender.to_string(), receiver.to_string(), content, format_timestamp(now)],
            )?;

            let sender_username: String = tx.query_row(
                "SELECT username FROM users WHERE id = ?1",
                [sender.to_string()],
                |row| row.get(0),
            )?;

            Ok(ChatAccess::Granted(ChatMessageRow {
                id,
                sender_id: sender.to_string(),
                sender_username,
                receiver_id: receiver.to_string(),
                content: content.to_string(),
                created_at: now,
            }))
        })
    }

    /// Messages between `viewer` and `other` in either direction created at
    /// or after `now - 24h`, oldest first. Requires `viewer -> other` to be
    /// accepted.
    pub fn chat_history(
        &self,
        viewer: &Uuid,
        other: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<ChatAccess<Vec<ChatMessageRow>>> {
        self.with_conn(|conn| {
            if !accepted_link_exists(conn, viewer, other)? {
                return Ok(ChatAccess::NotFriends);
            }
            let since = now - Duration::hours(CHAT_WINDOW_HOURS);
            Ok(ChatAccess::Granted(query_history(conn, viewer, other, since)?))
        })
    }
}

fn query_history(
    conn: &Connection,
    a: &Uuid,
    b: &Uuid,
    since: DateTime<Utc>,
) -> Result<Vec<ChatMessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.sender_id, u.username, m.receiver_id, m.content, m.created_at
         FROM chat_messages m
         LEFT JOIN users u ON u.id = m.sender_id
         WHERE ((m.sender_id = ?1 AND m.receiver_id = ?2)
             OR (m.sender_id = ?2 AND m.receiver_id = ?1))
           AND m.created_at >= ?3
         ORDER BY m.created_at ASC, m.rowid ASC",
    )?;

    let raw = stmt
        .query_map(
            rusqlite::params![a.to_string(), b.to_string(), format_timestamp(since)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(id, sender_id, sender_username, receiver_id, content, created_at)| {
            Ok(ChatMessageRow {
                id,
                sender_id,
                sender_username: sender_username.unwrap_or_else(|| "unknown".to_string()),
                receiver_id,
                content,
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .collect()
}
