use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use tracing::{debug, warn};

use rhyme_db::Database;
use rhyme_db::models::DailyPoemRow;
use rhyme_types::clock::Clock;
use rhyme_types::models::DailyPoem;

use crate::generator::{GenerationError, PoemGenerator};
use crate::themes::ThemeCalendar;

/// What a daily-poem lookup produced. Generation failure is reported
/// separately from success so callers can fall back to the theme.
#[derive(Debug)]
pub enum DailyOutcome {
    Poem(DailyPoem),
    ThemeOnly {
        date: String,
        theme: String,
        error: GenerationError,
    },
}

/// Read-through, write-once store of one poem per calendar date.
///
/// Concurrent first requests for a date inside this process share a single
/// generator call. Across processes the store's upsert keeps the date
/// unique; whichever writer commits last wins.
pub struct DailyPoemCache {
    db: Arc<Database>,
    calendar: Arc<ThemeCalendar>,
    generator: Arc<dyn PoemGenerator>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    inflight: Mutex<HashMap<NaiveDate, Arc<tokio::sync::Mutex<()>>>>,
}

impl DailyPoemCache {
    pub fn new(
        db: Arc<Database>,
        calendar: Arc<ThemeCalendar>,
        generator: Arc<dyn PoemGenerator>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            db,
            calendar,
            generator,
            clock,
            timeout,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn theme_for(&self, date: NaiveDate) -> &str {
        self.calendar.theme_for(date)
    }

    pub async fn get_or_generate(&self, date: NaiveDate) -> Result<DailyOutcome> {
        let key = date_key(date);
        if let Some(row) = self.lookup(&key).await? {
            return Ok(DailyOutcome::Poem(to_poem(row)));
        }

        let lock = self.date_lock(date)?;
        let result: Result<DailyOutcome> = async {
            let _guard = lock.lock().await;
            // Another request may have filled the date while we waited.
            if let Some(row) = self.lookup(&key).await? {
                debug!("Daily poem for {} filled by a concurrent request", key);
                return Ok(DailyOutcome::Poem(to_poem(row)));
            }
            self.generate_and_store(date, key.clone()).await
        }
        .await;

        self.release(date, &lock);
        result
    }

    /// Always calls the generator and overwrites the stored poem. On
    /// generation failure the existing row is left as it was.
    pub async fn regenerate(&self, date: NaiveDate) -> Result<DailyOutcome> {
        let lock = self.date_lock(date)?;
        let result: Result<DailyOutcome> = async {
            let _guard = lock.lock().await;
            self.generate_and_store(date, date_key(date)).await
        }
        .await;

        self.release(date, &lock);
        result
    }

    async fn generate_and_store(&self, date: NaiveDate, key: String) -> Result<DailyOutcome> {
        let theme = self.calendar.theme_for(date).to_string();
        debug!("Generating daily poem for {} (theme '{}')", key, theme);

        let generated = match tokio::time::timeout(self.timeout, self.generator.generate(&theme)).await {
            Ok(Ok(poem)) => poem,
            Ok(Err(error)) => {
                warn!("Daily poem generation failed for {}: {}", key, error);
                return Ok(DailyOutcome::ThemeOnly { date: key, theme, error });
            }
            Err(_) => {
                let error = GenerationError::Timeout(self.timeout);
                warn!("Daily poem generation failed for {}: {}", key, error);
                return Ok(DailyOutcome::ThemeOnly { date: key, theme, error });
            }
        };

        let row = DailyPoemRow {
            date: key,
            theme,
            title: generated.title,
            content: generated.content,
            generated_by: self.generator.source().to_string(),
        };

        let db = self.db.clone();
        let now = self.clock.now();
        let to_store = row.clone();
        tokio::task::spawn_blocking(move || db.store_daily_poem(&to_store, now)).await??;

        Ok(DailyOutcome::Poem(to_poem(row)))
    }

    async fn lookup(&self, key: &str) -> Result<Option<DailyPoemRow>> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || db.get_daily_poem(&key)).await?
    }

    fn date_lock(&self, date: NaiveDate) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut inflight = self
            .inflight
            .lock()
            .map_err(|e| anyhow!("inflight lock poisoned: {}", e))?;
        Ok(inflight.entry(date).or_default().clone())
    }

    fn release(&self, date: NaiveDate, lock: &Arc<tokio::sync::Mutex<()>>) {
        if let Ok(mut inflight) = self.inflight.lock() {
            if inflight.get(&date).is_some_and(|current| Arc::ptr_eq(current, lock)) {
                inflight.remove(&date);
            }
        }
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn to_poem(row: DailyPoemRow) -> DailyPoem {
    DailyPoem {
        date: row.date,
        theme: row.theme,
        title: row.title,
        content: row.content,
        generated_by: row.generated_by,
    }
}
