use crate::types::{CuratorError, FeedSource, Result};
use std::env;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Built-in categorization template, used when no template file is present.
pub const DEFAULT_PROMPT_TEMPLATE: &str = include_str!("../prompts/categorization.md");

/// Runtime settings for one curation run. All fields can be supplied through
/// environment variables; defaults are sane for unattended use.
#[derive(Debug, Clone)]
pub struct CuratorConfig {
    pub api_key: String,
    pub api_base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,

    pub fetch_timeout_seconds: u64,
    pub max_concurrent_fetches: usize,
    pub max_concurrent_analysis: usize,
    pub retry_attempts: u32,
    pub retry_delay_seconds: f64,

    pub filter_clickbait: bool,
    pub deduplicate_articles: bool,
    pub similarity_threshold: f64,
    pub max_articles_per_category: usize,
    pub run_deadline_seconds: Option<u64>,

    pub user_agent: String,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: "https://api.anthropic.com".to_string(),
            model: "claude-3-haiku-20240307".to_string(),
            max_tokens: 1024,
            temperature: 0.3,
            fetch_timeout_seconds: 30,
            max_concurrent_fetches: 20,
            max_concurrent_analysis: 5,
            retry_attempts: 3,
            retry_delay_seconds: 1.0,
            filter_clickbait: true,
            deduplicate_articles: true,
            similarity_threshold: 0.6,
            max_articles_per_category: 50,
            run_deadline_seconds: None,
            user_agent: "news-curator/0.1".to_string(),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl CuratorConfig {
    /// Build a configuration from environment variables, keeping defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(key) = env::var("ANTHROPIC_API_KEY") {
            config.api_key = key;
        }
        if let Ok(url) = env::var("ANTHROPIC_BASE_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Ok(model) = env::var("CLAUDE_MODEL") {
            config.model = model;
        }
        if let Some(v) = env_parse("MAX_TOKENS") {
            config.max_tokens = v;
        }
        if let Some(v) = env_parse("TEMPERATURE") {
            config.temperature = v;
        }
        if let Some(v) = env_parse("FETCH_TIMEOUT") {
            config.fetch_timeout_seconds = v;
        }
        if let Some(v) = env_parse("MAX_CONCURRENT_FEEDS") {
            config.max_concurrent_fetches = v;
        }
        if let Some(v) = env_parse("MAX_CONCURRENT_API_CALLS") {
            config.max_concurrent_analysis = v;
        }
        if let Some(v) = env_parse("RETRY_ATTEMPTS") {
            config.retry_attempts = v;
        }
        if let Some(v) = env_parse("RETRY_DELAY") {
            config.retry_delay_seconds = v;
        }
        if let Some(v) = env_parse("FILTER_CLICKBAIT") {
            config.filter_clickbait = v;
        }
        if let Some(v) = env_parse("DEDUPLICATE_ARTICLES") {
            config.deduplicate_articles = v;
        }
        if let Some(v) = env_parse("SIMILARITY_THRESHOLD") {
            config.similarity_threshold = v;
        }
        if let Some(v) = env_parse("MAX_ARTICLES_PER_CATEGORY") {
            config.max_articles_per_category = v;
        }
        if let Some(v) = env_parse("RUN_DEADLINE_SECS") {
            config.run_deadline_seconds = Some(v);
        }

        config
    }

    /// Reject configurations that would make the whole run pointless. Called
    /// before any fetch work is spent.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(CuratorError::Config(
                "ANTHROPIC_API_KEY is not set".to_string(),
            ));
        }
        if self.max_concurrent_fetches == 0 || self.max_concurrent_analysis == 0 {
            return Err(CuratorError::Config(
                "concurrency limits must be at least 1".to_string(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(CuratorError::Config(
                "retry_attempts must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(CuratorError::Config(format!(
                "similarity_threshold {} outside [0, 1]",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

/// Load the source registry from a JSON file.
pub fn load_feeds(path: &Path) -> Result<Vec<FeedSource>> {
    let raw = std::fs::read_to_string(path)?;
    let feeds: Vec<FeedSource> = serde_json::from_str(&raw)?;
    info!("Loaded {} sources from {}", feeds.len(), path.display());
    Ok(feeds)
}

/// Load the prompt template, falling back to the built-in default when the
/// file does not exist. The template is user-editable; placeholders are
/// `{title}`, `{source}` and `{summary}`.
pub fn load_prompt_template(path: &Path) -> Result<String> {
    if path.exists() {
        let template = std::fs::read_to_string(path)?;
        info!("Loaded prompt template from {}", path.display());
        Ok(template)
    } else {
        debug!(
            "Prompt template {} not found, using built-in default",
            path.display()
        );
        Ok(DEFAULT_PROMPT_TEMPLATE.to_string())
    }
}
