use crate::models::UserRow;
use crate::{Database, format_timestamp};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

impl Database {
    // -- Users --

    /// Returns `false` when the username is already taken; the existing
    /// row is left untouched.
    pub fn create_user(
        &self,
        id: &Uuid,
        username: &str,
        name: Option<&str>,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, name, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (username) DO NOTHING",
                rusqlite::params![id.to_string(), username, name, password_hash, format_timestamp(now)],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    /// Case-insensitive substring match on username or display name,
    /// excluding `exclude` (the caller).
    pub fn search_users(&self, needle: &str, exclude: &Uuid, limit: u32) -> Result<Vec<UserRow>> {
        let pattern = format!("%{}%", escape_like(needle));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, name, password, created_at FROM users
                 WHERE (username LIKE ?1 ESCAPE '\\' OR name LIKE ?1 ESCAPE '\\')
                   AND id <> ?2
                 ORDER BY username
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![pattern, exclude.to_string(), limit], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT id, username, name, password, created_at FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], map_user).optional()?;
    Ok(row)
}

pub(crate) fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        name: row.get(2)?,
        password: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
