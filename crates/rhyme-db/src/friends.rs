//! Friendship graph.
//!
//! Every relationship is stored as directed `friend_links` rows, at most one
//! per ordered `(from, to)` pair. Two users are friends when both directions
//! are `accepted`; acceptance writes both rows in one transaction so the pair
//! is never observed half-accepted. Removal deletes both rows together.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rhyme_types::models::{Direction, FriendshipStatus, LinkStatus, RespondAction};
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{FriendLinkRow, IncomingRequestRow, UserRow};
use crate::queries::{OptionalExt, map_user};
use crate::{Database, format_timestamp, parse_timestamp};

/// Result of `from` asking to follow `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    /// A new pending row was created.
    Requested,
    /// A pending request already existed; nothing changed.
    AlreadyPending,
    /// A declined or blocked row was reset to pending.
    Rerequested,
    /// `from -> to` is already accepted.
    AlreadyFriends,
}

impl Database {
    #[cfg(test)]
    pub(crate) fn get_friend_link(&self, from: &Uuid, to: &Uuid) -> Result<Option<FriendLinkRow>> {
        self.with_conn(|conn| query_link(conn, from, to))
    }

    pub fn request_friend(&self, from: &Uuid, to: &Uuid, now: DateTime<Utc>) -> Result<FollowOutcome> {
        if from == to {
            return Err(anyhow!("A user cannot follow themselves"));
        }

        self.with_tx(|tx| {
            let stamp = format_timestamp(now);
            let outcome = match query_link(tx, from, to)?.map(|link| link.status) {
                None => {
                    tx.execute(
                        "INSERT INTO friend_links (from_id, to_id, status, created_at, updated_at)
                         VALUES (?1, ?2, 'pending', ?3, ?3)",
                        rusqlite::params![from.to_string(), to.to_string(), stamp],
                    )?;
                    FollowOutcome::Requested
                }
                Some(LinkStatus::Pending) => FollowOutcome::AlreadyPending,
                Some(LinkStatus::Accepted) => FollowOutcome::AlreadyFriends,
                Some(LinkStatus::Declined | LinkStatus::Blocked) => {
                    tx.execute(
                        "UPDATE friend_links SET status = 'pending', created_at = ?3, updated_at = ?3
                         WHERE from_id = ?1 AND to_id = ?2",
                        rusqlite::params![from.to_string(), to.to_string(), stamp],
                    )?;
                    FollowOutcome::Rerequested
                }
            };
            debug!("Follow {} -> {}: {:?}", from, to, outcome);
            Ok(outcome)
        })
    }

    /// `responder` answers the pending `requester -> responder` request.
    ///
    /// Accepting sets that row to `accepted` and creates or overwrites the
    /// reciprocal `responder -> requester` row as `accepted` in the same
    /// transaction, whatever state it was in before. Declining touches only
    /// the request row. Returns `None` when there is no pending request.
    pub fn respond_to_request(
        &self,
        requester: &Uuid,
        responder: &Uuid,
        action: RespondAction,
        now: DateTime<Utc>,
    ) -> Result<Option<LinkStatus>> {
        self.with_tx(|tx| {
            let pending = query_link(tx, requester, responder)?
                .filter(|link| link.status == LinkStatus::Pending);
            if pending.is_none() {
                return Ok(None);
            }

            let stamp = format_timestamp(now);
            let status = match action {
                RespondAction::Accept => LinkStatus::Accepted,
                RespondAction::Decline => LinkStatus::Declined,
            };

            tx.execute(
                "UPDATE friend_links SET status = ?3, updated_at = ?4
                 WHERE from_id = ?1 AND to_id = ?2",
                rusqlite::params![requester.to_string(), responder.to_string(), status.as_str(), stamp],
            )?;

            if status == LinkStatus::Accepted {
                tx.execute(
                    "INSERT INTO friend_links (from_id, to_id, status, created_at, updated_at)
                     VALUES (?1, ?2, 'accepted', ?3, ?3)
                     ON CONFLICT (from_id, to_id)
                     DO UPDATE SET status = 'accepted', updated_at = excluded.updated_at",
                    rusqlite::params![responder.to_string(), requester.to_string(), stamp],
                )?;
                info!("Friendship accepted: {} <-> {}", requester, responder);
            }

            Ok(Some(status))
        })
    }

    /// Deletes both directed rows between the pair, whatever their states.
    /// Returns how many rows were removed.
    pub fn remove_friendship(&self, a: &Uuid, b: &Uuid) -> Result<usize> {
        self.with_tx(|tx| {
            let removed = tx.execute(
                "DELETE FROM friend_links
                 WHERE (from_id = ?1 AND to_id = ?2) OR (from_id = ?2 AND to_id = ?1)",
                rusqlite::params![a.to_string(), b.to_string()],
            )?;
            Ok(removed)
        })
    }

    pub fn friendship_status(&self, current: &Uuid, target: &Uuid) -> Result<FriendshipStatus> {
        if current == target {
            return Ok(FriendshipStatus::SelfUser);
        }

        self.with_conn(|conn| {
            let sent = query_link(conn, current, target)?.map(|l| l.status);
            let incoming = query_link(conn, target, current)?.map(|l| l.status);
            Ok(derive_status(sent, incoming))
        })
    }

    /// True when `from -> to` is an accepted link.
    #[cfg(test)]
    pub(crate) fn has_accepted_link(&self, from: &Uuid, to: &Uuid) -> Result<bool> {
        self.with_conn(|conn| accepted_link_exists(conn, from, to))
    }

    /// Everyone reachable over an accepted link in either direction, each
    /// user listed once.
    pub fn list_friends(&self, user: &Uuid) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, name, password, created_at FROM users
                 WHERE id IN (
                     SELECT to_id FROM friend_links WHERE from_id = ?1 AND status = 'accepted'
                     UNION
                     SELECT from_id FROM friend_links WHERE to_id = ?1 AND status = 'accepted'
                 )
                 ORDER BY username",
            )?;
            let rows = stmt
                .query_map([user.to_string()], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Pending requests addressed to `user`, oldest first.
    pub fn incoming_requests(&self, user: &Uuid) -> Result<Vec<IncomingRequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.name, f.created_at
                 FROM friend_links f
                 JOIN users u ON u.id = f.from_id
                 WHERE f.to_id = ?1 AND f.status = 'pending'
                 ORDER BY f.created_at ASC",
            )?;
            let raw = stmt
                .query_map([user.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            raw.into_iter()
                .map(|(user_id, username, name, requested_at)| {
                    Ok(IncomingRequestRow {
                        user_id,
                        username,
                        name,
                        requested_at: parse_timestamp(&requested_at)?,
                    })
                })
                .collect()
        })
    }
}

/// Precedence: friends > pending_sent > pending_incoming > none.
fn derive_status(sent: Option<LinkStatus>, incoming: Option<LinkStatus>) -> FriendshipStatus {
    match (sent, incoming) {
        (Some(LinkStatus::Accepted), _) => FriendshipStatus::Friends(Direction::Outgoing),
        (_, Some(LinkStatus::Accepted)) => FriendshipStatus::Friends(Direction::Incoming),
        (Some(LinkStatus::Pending), _) => FriendshipStatus::PendingSent,
        (_, Some(LinkStatus::Pending)) => FriendshipStatus::PendingIncoming,
        _ => FriendshipStatus::None,
    }
}

pub(crate) fn accepted_link_exists(conn: &Connection, from: &Uuid, to: &Uuid) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM friend_links WHERE from_id = ?1 AND to_id = ?2 AND status = 'accepted'",
            rusqlite::params![from.to_string(), to.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn query_link(conn: &Connection, from: &Uuid, to: &Uuid) -> Result<Option<FriendLinkRow>> {
    let raw = conn
        .query_row(
            "SELECT status, created_at, updated_at
             FROM friend_links WHERE from_id = ?1 AND to_id = ?2",
            rusqlite::params![from.to_string(), to.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    raw.map(|(status, created_at, updated_at)| {
        Ok(FriendLinkRow {
            status: status.parse().map_err(|e: String| anyhow!(e))?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    })
    .transpose()
}
