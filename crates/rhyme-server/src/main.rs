mod config;
mod prewarm;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use rhyme_api::{AppStateInner, build_router};
use rhyme_daily::{DailyPoemCache, OpenRouterGenerator, ThemeCalendar};
use rhyme_db::Database;
use rhyme_types::clock::{Clock, SystemClock};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rhyme_server=debug,rhyme_api=debug,rhyme_daily=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("FATAL: {:#}", e);
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Check your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Arc::new(Database::open(&config.db_path)?);
    info!("Database ready at {}", config.db_path.display());

    let calendar = match &config.themes_path {
        Some(path) => {
            info!("Loading themes from {}", path.display());
            ThemeCalendar::from_path(path)?
        }
        None => ThemeCalendar::builtin()?,
    };
    if calendar.is_empty() {
        anyhow::bail!("theme calendar has no entries");
    }
    if calendar.len() < 366 {
        warn!("Theme calendar covers only {} days; missing days use the fallback theme", calendar.len());
    }

    let generator = OpenRouterGenerator::new(config.llm.clone())?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let daily = Arc::new(DailyPoemCache::new(
        db.clone(),
        Arc::new(calendar),
        Arc::new(generator),
        clock.clone(),
        config.generation_timeout,
    ));

    prewarm::spawn(daily.clone(), clock.clone(), config.prewarm_interval_secs);

    let state = Arc::new(AppStateInner {
        db,
        daily,
        clock,
        jwt_secret: config.jwt_secret.clone(),
        token_ttl: chrono::Duration::minutes(config.token_ttl_minutes),
    });

    let app = build_router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Rhyme Box listening on {}", addr);
    info!("LLM model: {}", config.llm.model);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
