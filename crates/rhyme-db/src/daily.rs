use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::models::DailyPoemRow;
use crate::queries::OptionalExt;
use crate::{Database, format_timestamp};

/// What `store_daily_poem` did to the row for that date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted,
    /// A row already existed (a concurrent writer, or an explicit
    /// regenerate) and was overwritten in place.
    Updated,
}

impl Database {
    pub fn get_daily_poem(&self, date: &str) -> Result<Option<DailyPoemRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT date, theme, title, content, generated_by FROM daily_poems WHERE date = ?1",
                    [date],
                    |row| {
                        Ok(DailyPoemRow {
                            date: row.get(0)?,
                            theme: row.get(1)?,
                            title: row.get(2)?,
                            content: row.get(3)?,
                            generated_by: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Write-once per date, except that a second writer overwrites the
    /// existing row instead of failing on the unique key.
    pub fn store_daily_poem(&self, poem: &DailyPoemRow, now: DateTime<Utc>) -> Result<StoreOutcome> {
        self.with_tx(|tx| {
            let existed: Option<i64> = tx
                .query_row("SELECT 1 FROM daily_poems WHERE date = ?1", [&poem.date], |row| row.get(0))
                .optional()?;

            tx.execute(
                "INSERT INTO daily_poems (date, theme, title, content, generated_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT (date) DO UPDATE SET
                     theme = excluded.theme,
                     title = excluded.title,
                     content = excluded.content,
                     generated_by = excluded.generated_by,
                     updated_at = excluded.updated_at",
                rusqlite::params![
                    poem.date,
                    poem.theme,
                    poem.title,
                    poem.content,
                    poem.generated_by,
                    format_timestamp(now),
                ],
            )?;

            if existed.is_some() {
                warn!("Daily poem for {} already existed, updated in place", poem.date);
                Ok(StoreOutcome::Updated)
            } else {
                info!("Saved daily poem for {}", poem.date);
                Ok(StoreOutcome::Inserted)
            }
        })
    }
}
