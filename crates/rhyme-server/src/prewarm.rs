use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use rhyme_daily::{DailyOutcome, DailyPoemCache};
use rhyme_types::clock::Clock;

/// Background task that makes sure today's poem exists before anyone asks.
///
/// Runs on an interval; each tick goes through the same read-through path as
/// the HTTP handlers, so an already-stored poem costs one lookup.
pub async fn run_prewarm_loop(daily: Arc<DailyPoemCache>, clock: Arc<dyn Clock>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let today = clock.now().date_naive();
        match daily.get_or_generate(today).await {
            Ok(DailyOutcome::Poem(poem)) => {
                debug!("Pre-warm: poem for {} is '{}'", today, poem.title);
            }
            Ok(DailyOutcome::ThemeOnly { error, .. }) => {
                warn!("Pre-warm: no poem for {} yet: {}", today, error);
            }
            Err(e) => {
                warn!("Pre-warm error: {}", e);
            }
        }
    }
}

pub fn spawn(daily: Arc<DailyPoemCache>, clock: Arc<dyn Clock>, interval_secs: u64) {
    if interval_secs == 0 {
        return;
    }
    info!("Pre-warming daily poems every {} seconds", interval_secs);
    tokio::spawn(run_prewarm_loop(daily, clock, interval_secs));
}
