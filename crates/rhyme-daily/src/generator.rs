use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

const SYSTEM_PROMPT: &str = "You are a creative and skilled poetry generator. \
Write original, beautiful poems with vivid imagery, emotional depth, and poetic language. \
Maintain proper poetic form, rhythm, and structure. \
Return only the poem as output, without any explanations or meta-commentary. \
If the first line contains a title in **markdown**, extract it separately. \
Otherwise, create a poetic title based on the theme.";

/// A short unpunctuated first line is read as the title.
const MAX_BARE_TITLE_LEN: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPoem {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("poem generator is not configured (missing API key)")]
    NotConfigured,

    #[error("poem generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("poem generator request failed: {0}")]
    Upstream(String),

    #[error("poem generator returned unusable output: {0}")]
    Malformed(String),
}

/// Black-box text generator: theme in, title and body out.
#[async_trait]
pub trait PoemGenerator: Send + Sync {
    async fn generate(&self, theme: &str) -> Result<GeneratedPoem, GenerationError>;

    /// Stored as `generated_by` on the daily poem row.
    fn source(&self) -> &str {
        "ai"
    }
}

#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1".into(),
            model: "tngtech/deepseek-r1t2-chimera:free".into(),
            temperature: 0.7,
            max_tokens: 1024,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Chat-completion client for OpenRouter (or any OpenAI-compatible API).
/// Built once at bootstrap and shared.
pub struct OpenRouterGenerator {
    client: reqwest::Client,
    config: OpenRouterConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenRouterGenerator {
    pub fn new(config: OpenRouterConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        if config.api_key.is_none() {
            info!("No LLM API key configured; daily poems will fall back to themes");
        }
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PoemGenerator for OpenRouterGenerator {
    async fn generate(&self, theme: &str) -> Result<GeneratedPoem, GenerationError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(GenerationError::NotConfigured)?;

        let prompt = format!("Write a poem about: {theme}");
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: &prompt },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!("Generating poem for theme '{}'", theme);
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.config.request_timeout)
                } else {
                    GenerationError::Upstream(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Upstream(format!("HTTP {status}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        let raw = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::Malformed("no choices in response".into()))?;

        let poem = split_title(theme, &raw)?;
        info!("Poem generated: '{}' ({} characters)", poem.title, poem.content.len());
        Ok(poem)
    }
}

/// Pull a title off the front of raw model output.
///
/// `**Title**` on the first line wins; otherwise a short first line without
/// trailing punctuation is taken as the title when more lines follow;
/// otherwise the theme becomes the title.
pub fn split_title(theme: &str, raw: &str) -> Result<GeneratedPoem, GenerationError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(GenerationError::Malformed("empty poem".into()));
    }

    let (first, rest) = text.split_once('\n').unwrap_or((text, ""));

    if let Some(title) = bold_span(first) {
        return Ok(GeneratedPoem {
            title: title.to_string(),
            content: rest.trim().to_string(),
        });
    }

    let first = first.trim();
    let looks_like_title = !rest.trim().is_empty()
        && first.chars().count() < MAX_BARE_TITLE_LEN
        && !first.ends_with(['.', ',', ';', ':', '!', '?']);

    if looks_like_title {
        Ok(GeneratedPoem {
            title: first.to_string(),
            content: rest.trim().to_string(),
        })
    } else {
        Ok(GeneratedPoem {
            title: theme.to_string(),
            content: text.to_string(),
        })
    }
}

fn bold_span(line: &str) -> Option<&str> {
    let start = line.find("**")? + 2;
    let len = line[start..].find("**")?;
    Some(line[start..start + len].trim()).filter(|title| !title.is_empty())
}
