use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Datelike, NaiveDate};
use thiserror::Error;

/// Returned when the table has no entry for a date.
pub const FALLBACK_THEME: &str = "A Day of Reflection";

const BUILTIN_THEMES: &str = include_str!("../data/daily_themes.json");

const MONTHS: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid date '{0}'. Use YYYY-MM-DD")]
pub struct InvalidDate(pub String);

/// Parse a canonical `YYYY-MM-DD` day. Non-padded or otherwise
/// non-canonical spellings are refused so each date has one cache key.
pub fn parse_day(raw: &str) -> Result<NaiveDate, InvalidDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .filter(|date| date.format("%Y-%m-%d").to_string() == raw)
        .ok_or_else(|| InvalidDate(raw.to_string()))
}

/// Fixed month -> themes table, loaded once at startup.
///
/// Day `d` of a month maps to entry `d - 1`. February carries 29 entries,
/// the last of which belongs to leap days only.
#[derive(Debug, Clone)]
pub struct ThemeCalendar {
    months: HashMap<String, Vec<String>>,
}

impl ThemeCalendar {
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_THEMES).context("built-in theme table is malformed")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading theme table {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing theme table {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: HashMap<String, Vec<String>> = serde_json::from_str(raw)?;
        let months: HashMap<String, Vec<String>> =
            parsed.into_iter().map(|(month, themes)| (month.to_lowercase(), themes)).collect();

        if let Some(unknown) = months.keys().find(|m| !MONTHS.contains(&m.as_str())) {
            bail!("unknown month '{}' in theme table", unknown);
        }
        Ok(Self { months })
    }

    /// Total and pure: never fails, falls back to [`FALLBACK_THEME`].
    pub fn theme_for(&self, date: NaiveDate) -> &str {
        let month = MONTHS[date.month0() as usize];
        let index = date.day0() as usize;

        self.months
            .get(month)
            .and_then(|themes| themes.get(index))
            .map_or(FALLBACK_THEME, String::as_str)
    }

    pub fn len(&self) -> usize {
        self.months.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
