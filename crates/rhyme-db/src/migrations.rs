use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                name        TEXT,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE friend_links (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                from_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                to_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status      TEXT NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'accepted', 'declined', 'blocked')),
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                UNIQUE (from_id, to_id),
                CHECK (from_id <> to_id)
            );

            CREATE INDEX idx_friend_links_to_status
                ON friend_links(to_id, status);

            CREATE TABLE daily_poems (
                date          TEXT PRIMARY KEY,
                theme         TEXT NOT NULL,
                title         TEXT NOT NULL,
                content       TEXT NOT NULL,
                generated_by  TEXT NOT NULL DEFAULT 'ai',
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            );

            CREATE TABLE chat_messages (
                id           TEXT PRIMARY KEY,
                sender_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                receiver_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content      TEXT NOT NULL,
                created_at   TEXT NOT NULL
            );

            CREATE INDEX idx_chat_between
                ON chat_messages(sender_id, receiver_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
