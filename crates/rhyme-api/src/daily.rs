use axum::{
    Json,
    extract::{Path, State},
};
use chrono::NaiveDate;

use rhyme_daily::{DailyOutcome, parse_day};
use rhyme_types::api::{DailyPoemResponse, ThemeResponse};

use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/daily/{date}: stored poem, generated on first read.
pub async fn get_daily_poem(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<DailyPoemResponse>, ApiError> {
    let day = parse_date(&date)?;
    let outcome = state.daily.get_or_generate(day).await?;
    Ok(Json(to_response(outcome)))
}

/// GET /api/daily/theme/{date}: theme only, never calls the generator.
pub async fn get_daily_theme(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<ThemeResponse>, ApiError> {
    let day = parse_date(&date)?;
    Ok(Json(ThemeResponse {
        theme: state.daily.theme_for(day).to_string(),
        date,
    }))
}

/// POST /api/daily/{date}/regenerate
pub async fn regenerate(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<DailyPoemResponse>, ApiError> {
    let day = parse_date(&date)?;
    let outcome = state.daily.regenerate(day).await?;
    Ok(Json(to_response(outcome)))
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    parse_day(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn to_response(outcome: DailyOutcome) -> DailyPoemResponse {
    match outcome {
        DailyOutcome::Poem(poem) => DailyPoemResponse {
            date: poem.date,
            theme: poem.theme,
            title: Some(poem.title),
            content: Some(poem.content),
            available: true,
        },
        DailyOutcome::ThemeOnly { date, theme, .. } => DailyPoemResponse {
            date,
            theme,
            title: None,
            content: None,
            available: false,
        },
    }
}
