use crate::parser;
use crate::types::{FeedSource, FetchOutcome, RawArticle, SourceStatus};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Transport seam for feed retrieval, so tests can stand in for the network.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Fetch the body at `url`. The error string describes the HTTP-level
    /// failure; timeouts are enforced by the caller.
    async fn fetch(&self, url: &str) -> std::result::Result<String, String>;
}

/// Live transport backed by a shared reqwest client.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    async fn fetch(&self, url: &str) -> std::result::Result<String, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            ));
        }

        response.text().await.map_err(|e| e.to_string())
    }
}

/// Concurrent feed fetcher with per-source failure isolation. Every enabled
/// source is attempted exactly once per run; a source failure is captured as
/// a status, never raised.
pub struct Fetcher {
    transport: Arc<dyn FeedTransport>,
    max_concurrent: usize,
    default_timeout_seconds: u64,
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn FeedTransport>,
        max_concurrent: usize,
        default_timeout_seconds: u64,
    ) -> Self {
        Self {
            transport,
            max_concurrent,
            default_timeout_seconds,
        }
    }

    /// Fetch all enabled sources in parallel, bounded by the configured
    /// concurrency limit. Returns the fetched articles (ordered by source
    /// priority, feed order within a source) and a status per completed
    /// source. When `deadline` elapses, in-flight fetches are cancelled and
    /// whatever completed is returned.
    pub async fn fetch_all(
        &self,
        sources: &[FeedSource],
        deadline: Option<Instant>,
    ) -> (Vec<RawArticle>, Vec<SourceStatus>) {
        let mut active: Vec<&FeedSource> = sources.iter().filter(|s| s.enabled).collect();
        // Stable sort keeps registry order for equal priorities.
        active.sort_by_key(|s| std::cmp::Reverse(s.priority));

        info!("Fetching {} feeds", active.len());

        let fetches = stream::iter(active.into_iter().enumerate().map(|(index, source)| {
            let transport = Arc::clone(&self.transport);
            let timeout = Duration::from_secs(
                source.timeout_seconds.unwrap_or(self.default_timeout_seconds),
            );
            async move {
                let result = fetch_source(transport, source, timeout).await;
                (index, source.name.clone(), result)
            }
        }))
        .buffer_unordered(self.max_concurrent);

        let mut completed: Vec<_> = match deadline {
            Some(deadline) => {
                let partial: Vec<_> = fetches
                    .take_until(Box::pin(tokio::time::sleep_until(deadline)))
                    .collect()
                    .await;
                partial
            }
            None => fetches.collect().await,
        };

        // Emission order follows source priority; the unordered fan-out is
        // re-sorted once everything has drained.
        completed.sort_by_key(|(index, _, _)| *index);

        let mut articles = Vec::new();
        let mut statuses = Vec::new();
        for (_, source, result) in completed {
            match result {
                Ok(batch) => {
                    info!("Feed '{}': {} articles", source, batch.len());
                    statuses.push(SourceStatus {
                        source,
                        outcome: FetchOutcome::Ok {
                            articles: batch.len(),
                        },
                    });
                    articles.extend(batch);
                }
                Err(outcome) => {
                    warn!("Feed '{}' failed: {:?}", source, outcome);
                    statuses.push(SourceStatus { source, outcome });
                }
            }
        }

        let failed = statuses.iter().filter(|s| !s.outcome.is_ok()).count();
        info!(
            "Fetched {} articles from {}/{} feeds",
            articles.len(),
            statuses.len() - failed,
            statuses.len()
        );
        (articles, statuses)
    }
}

async fn fetch_source(
    transport: Arc<dyn FeedTransport>,
    source: &FeedSource,
    timeout: Duration,
) -> std::result::Result<Vec<RawArticle>, FetchOutcome> {
    let body = match tokio::time::timeout(timeout, transport.fetch(&source.url)).await {
        Ok(Ok(body)) => body,
        Ok(Err(error)) => return Err(FetchOutcome::HttpError(error)),
        Err(_) => return Err(FetchOutcome::Timeout),
    };

    parser::parse_feed(&source.name, &body)
        .map_err(|e| FetchOutcome::ParseError(e.to_string()))
}
