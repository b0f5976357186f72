use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;

use rhyme_daily::OpenRouterConfig;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-key-here",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    pub themes_path: Option<PathBuf>,
    pub generation_timeout: Duration,
    /// 0 disables the pre-warm task.
    pub prewarm_interval_secs: u64,
    pub llm: OpenRouterConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = var("RHYME_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("RHYME_JWT_SECRET is unset or still a placeholder");
        }

        let port: u16 = parse_or(&var, "RHYME_PORT", 8000)?;
        let token_ttl_minutes: i64 = parse_or(&var, "RHYME_TOKEN_TTL_MINUTES", 1440)?;
        if token_ttl_minutes <= 0 {
            bail!("RHYME_TOKEN_TTL_MINUTES must be positive");
        }
        let timeout_secs: u64 = parse_or(&var, "RHYME_GENERATION_TIMEOUT_SECS", 60)?;
        if timeout_secs == 0 {
            bail!("RHYME_GENERATION_TIMEOUT_SECS must be positive");
        }
        let generation_timeout = Duration::from_secs(timeout_secs);

        let defaults = OpenRouterConfig::default();
        let llm = OpenRouterConfig {
            api_key: var("OPENROUTER_API_KEY"),
            base_url: var("RHYME_LLM_BASE_URL").unwrap_or(defaults.base_url),
            model: var("RHYME_LLM_MODEL").unwrap_or(defaults.model),
            request_timeout: generation_timeout,
            ..defaults
        };

        Ok(Self {
            host: var("RHYME_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: var("RHYME_DB_PATH").unwrap_or_else(|| "rhyme_box.db".into()).into(),
            jwt_secret,
            token_ttl_minutes,
            themes_path: var("RHYME_THEMES_PATH").map(PathBuf::from),
            generation_timeout,
            prewarm_interval_secs: parse_or(&var, "RHYME_PREWARM_INTERVAL_SECS", 0)?,
            llm,
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {} '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}
