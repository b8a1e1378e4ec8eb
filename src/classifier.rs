use crate::config::CuratorConfig;
use crate::types::{AnalyzedArticle, CanonicalArticle, Category, Classification, RawArticle};
use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Failure kinds for a single analysis call. Captured per call and carried
/// as data; never raised across the batch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassificationError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited by the analysis service")]
    RateLimit,

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Seam for the text-analysis service: one prompt in, raw response text out.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, ClassificationError>;
}

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

/// Live backend calling an Anthropic-style messages endpoint.
pub struct ClaudeBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ClaudeBackend {
    pub fn new(client: Client, config: &CuratorConfig) -> Self {
        Self {
            client,
            base_url: config.api_base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl AnalysisBackend for ClaudeBackend {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, ClassificationError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| ClassificationError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ClassificationError::RateLimit);
        }
        if !status.is_success() {
            return Err(ClassificationError::Transport(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ClassificationError::Transport(e.to_string()))?;

        Ok(body
            .content
            .first()
            .map(|block| block.text.clone())
            .unwrap_or_default())
    }
}

// Strict wire shape: unknown or missing fields make the response malformed.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireClassification {
    category: Category,
    is_clickbait: bool,
    confidence: f64,
    reasoning: String,
}

/// Validate a raw service response into a Classification. Fencing is
/// stripped first; anything that deviates from the expected JSON object is
/// a malformed response, including out-of-enum categories and confidence
/// outside [0, 1].
pub fn parse_classification(
    raw: &str,
) -> std::result::Result<Classification, ClassificationError> {
    let stripped = strip_fences(raw);
    let wire: WireClassification = serde_json::from_str(stripped)
        .map_err(|e| ClassificationError::MalformedResponse(e.to_string()))?;

    if !(0.0..=1.0).contains(&wire.confidence) {
        return Err(ClassificationError::MalformedResponse(format!(
            "confidence {} outside [0, 1]",
            wire.confidence
        )));
    }

    Ok(Classification {
        category: wire.category,
        is_clickbait: wire.is_clickbait,
        confidence: wire.confidence,
        reasoning: wire.reasoning,
    })
}

/// Strip a surrounding markdown fence, if any, and return the JSON payload.
pub fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = start + 7;
        let end = trimmed[after..]
            .find("```")
            .map(|e| after + e)
            .unwrap_or(trimmed.len());
        trimmed[after..end].trim()
    } else if let Some(start) = trimmed.find("```") {
        let after = start + 3;
        let end = trimmed[after..]
            .find("```")
            .map(|e| after + e)
            .unwrap_or(trimmed.len());
        trimmed[after..end].trim()
    } else {
        trimmed
    }
}

/// Retry decisions, separated from the async loop so the cap logic is
/// testable on its own.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempt cap for transport and rate-limit failures.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Whether a failure of this kind, the `failures`-th of its kind so far,
    /// warrants another attempt. Malformed responses get exactly one re-ask.
    pub fn should_retry(&self, error: &ClassificationError, failures: u32) -> bool {
        match error {
            ClassificationError::Transport(_) | ClassificationError::RateLimit => {
                failures < self.max_attempts
            }
            ClassificationError::MalformedResponse(_) => failures < 2,
        }
    }

    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.base_delay,
            initial_interval: self.base_delay,
            max_interval: self.base_delay * 32,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }
}

/// Concurrent, rate-limited, retrying client for the analysis service.
/// This is the admission-control point for the external service: no more
/// than `max_concurrent` calls are ever in flight.
pub struct Classifier {
    backend: Arc<dyn AnalysisBackend>,
    template: String,
    policy: RetryPolicy,
    max_concurrent: usize,
}

impl Classifier {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        template: String,
        policy: RetryPolicy,
        max_concurrent: usize,
    ) -> Self {
        Self {
            backend,
            template,
            policy,
            max_concurrent,
        }
    }

    /// Substitute article fields into the prompt template.
    pub fn build_prompt(&self, article: &RawArticle) -> String {
        self.template
            .replace("{title}", &article.title)
            .replace("{source}", &article.source)
            .replace(
                "{summary}",
                article.summary.as_deref().unwrap_or("No summary available"),
            )
    }

    /// Classify every article in parallel, bounded by the concurrency limit.
    /// A failed article degrades to `classification: None`; it never blocks
    /// or fails the rest of the batch. When `deadline` elapses, outstanding
    /// calls are cancelled and the completed results returned.
    pub async fn classify_all(
        &self,
        articles: Vec<CanonicalArticle>,
        deadline: Option<Instant>,
    ) -> Vec<AnalyzedArticle> {
        info!("Analyzing {} articles", articles.len());

        let analyses = stream::iter(
            articles
                .into_iter()
                .map(|canonical| self.annotate(canonical)),
        )
        .buffer_unordered(self.max_concurrent);

        let analyzed: Vec<AnalyzedArticle> = match deadline {
            Some(deadline) => {
                analyses
                    .take_until(Box::pin(tokio::time::sleep_until(deadline)))
                    .collect()
                    .await
            }
            None => analyses.collect().await,
        };

        let classified = analyzed
            .iter()
            .filter(|a| a.classification.is_some())
            .count();
        info!(
            "Successfully analyzed {}/{} articles",
            classified,
            analyzed.len()
        );
        analyzed
    }

    async fn annotate(&self, canonical: CanonicalArticle) -> AnalyzedArticle {
        let classification = match self.classify(&canonical.article).await {
            Ok(classification) => Some(classification),
            Err(error) => {
                warn!(
                    "Classification failed for '{}': {}",
                    canonical.article.title, error
                );
                None
            }
        };
        AnalyzedArticle {
            article: canonical,
            classification,
        }
    }

    /// One article through the retry loop: transport and rate-limit failures
    /// back off exponentially up to the attempt cap, a malformed response is
    /// re-asked once immediately, then abandoned.
    pub async fn classify(
        &self,
        article: &RawArticle,
    ) -> std::result::Result<Classification, ClassificationError> {
        let prompt = self.build_prompt(article);
        let mut schedule = self.policy.schedule();
        let mut call_failures = 0u32;
        let mut parse_failures = 0u32;

        loop {
            let raw = match self.backend.complete(&prompt).await {
                Ok(raw) => raw,
                Err(error) => {
                    call_failures += 1;
                    if !self.policy.should_retry(&error, call_failures) {
                        return Err(error);
                    }
                    let delay = schedule.next_backoff().unwrap_or(self.policy.base_delay);
                    warn!(
                        "Analysis call failed for '{}' ({}), retrying in {:?}",
                        article.title, error, delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            match parse_classification(&raw) {
                Ok(classification) => {
                    debug!(
                        "Classified '{}' as {} (confidence {:.2})",
                        article.title, classification.category, classification.confidence
                    );
                    return Ok(classification);
                }
                Err(error) => {
                    parse_failures += 1;
                    if !self.policy.should_retry(&error, parse_failures) {
                        return Err(error);
                    }
                    warn!(
                        "Malformed response for '{}' ({}), re-asking once",
                        article.title, error
                    );
                }
            }
        }
    }
}
