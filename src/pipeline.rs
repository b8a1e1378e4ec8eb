use crate::classifier::{Classifier, ClaudeBackend, RetryPolicy};
use crate::config::CuratorConfig;
use crate::dedup::Deduplicator;
use crate::digest;
use crate::fetcher::{Fetcher, HttpTransport};
use crate::types::{
    CanonicalArticle, CuratorError, Digest, FeedSource, PipelineReport, Result,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Drives one full curation run: fetch, deduplicate, classify, filter,
/// assemble. Stage failures are captured as data and reported; the only
/// fatal failures are configuration problems, detected before any work is
/// spent.
pub struct CurationPipeline {
    config: CuratorConfig,
    fetcher: Fetcher,
    dedup: Deduplicator,
    classifier: Classifier,
}

impl CurationPipeline {
    /// Validate the configuration and construct the run's shared resources
    /// (one HTTP client, passed explicitly into both network stages).
    pub fn new(config: CuratorConfig, prompt_template: String) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        let transport = Arc::new(HttpTransport::new(client.clone()));
        let fetcher = Fetcher::new(
            transport,
            config.max_concurrent_fetches,
            config.fetch_timeout_seconds,
        );

        let dedup = Deduplicator::new(config.similarity_threshold);

        let backend = Arc::new(ClaudeBackend::new(client, &config));
        let policy = RetryPolicy {
            max_attempts: config.retry_attempts,
            base_delay: Duration::from_secs_f64(config.retry_delay_seconds),
        };
        let classifier = Classifier::new(
            backend,
            prompt_template,
            policy,
            config.max_concurrent_analysis,
        );

        Ok(Self {
            config,
            fetcher,
            dedup,
            classifier,
        })
    }

    /// Assemble a pipeline from pre-built stages. Intended for tests that
    /// substitute mock transports and backends.
    pub fn from_parts(
        config: CuratorConfig,
        fetcher: Fetcher,
        dedup: Deduplicator,
        classifier: Classifier,
    ) -> Self {
        Self {
            config,
            fetcher,
            dedup,
            classifier,
        }
    }

    /// Run the pipeline once over the given source registry.
    ///
    /// Fails fatally only when there is nothing to do (no enabled sources).
    /// Everything else degrades: failed sources and failed classifications
    /// are counted in the report and the run completes with partial results.
    pub async fn run(&self, sources: &[FeedSource]) -> Result<Digest> {
        let generated_at = Utc::now();

        let enabled = sources.iter().filter(|s| s.enabled).count();
        if enabled == 0 {
            return Err(CuratorError::Config(
                "source registry is empty or entirely disabled".to_string(),
            ));
        }

        let deadline = self
            .config
            .run_deadline_seconds
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        // Stage 1: fetch. Drains fully (or until the deadline) before
        // deduplication starts.
        let (raw, statuses) = self.fetcher.fetch_all(sources, deadline).await;
        let fetched = raw.len();
        let fetch_failed_sources = statuses.iter().filter(|s| !s.outcome.is_ok()).count();

        // Stage 2: deduplicate, so classification cost is not spent on
        // duplicates.
        let priorities: HashMap<String, i32> = sources
            .iter()
            .map(|s| (s.name.clone(), s.priority))
            .collect();
        let canonical: Vec<CanonicalArticle> = if self.config.deduplicate_articles {
            self.dedup.deduplicate(raw, &priorities)
        } else {
            raw.into_iter().map(CanonicalArticle::from_raw).collect()
        };
        let duplicates_removed = fetched - canonical.len();

        // Stage 3: classify.
        let mut analyzed = self.classifier.classify_all(canonical, deadline).await;
        let classified = analyzed
            .iter()
            .filter(|a| a.classification.is_some())
            .count();
        let classification_failed = analyzed.len() - classified;

        // Filtering policy: clickbait is dropped (and counted) when the
        // filter is on; unclassifiable articles are always retained.
        let mut filtered_clickbait = 0;
        if self.config.filter_clickbait {
            analyzed.retain(|a| {
                let clickbait = a
                    .classification
                    .as_ref()
                    .map(|c| c.is_clickbait)
                    .unwrap_or(false);
                if clickbait {
                    filtered_clickbait += 1;
                }
                !clickbait
            });
            if filtered_clickbait > 0 {
                info!("Filtered {} clickbait articles", filtered_clickbait);
            }
        }

        let report = PipelineReport {
            fetched,
            fetch_failed_sources,
            duplicates_removed,
            classified,
            classification_failed,
            filtered_clickbait,
        };

        if deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
            warn!("Run deadline elapsed; digest contains partial results");
        }

        info!(
            "Pipeline complete: fetched={} failed_sources={} duplicates_removed={} \
             classified={} classification_failed={} filtered_clickbait={}",
            report.fetched,
            report.fetch_failed_sources,
            report.duplicates_removed,
            report.classified,
            report.classification_failed,
            report.filtered_clickbait
        );

        Ok(digest::assemble(
            analyzed,
            &priorities,
            statuses,
            report,
            generated_at,
            self.config.max_articles_per_category,
        ))
    }
}
