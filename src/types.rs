use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_enabled() -> bool {
    true
}

/// A single entry in the source registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    /// Per-source fetch timeout; falls back to the configured default.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArticle {
    pub id: Uuid,
    pub title: String,
    pub link: String,
    pub source: String,
    pub published: Option<DateTime<Utc>>,
    pub summary: Option<String>,
}

/// The representative of a duplicate cluster, plus the links it absorbed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalArticle {
    pub article: RawArticle,
    pub absorbed: Vec<String>,
}

impl CanonicalArticle {
    pub fn from_raw(article: RawArticle) -> Self {
        Self {
            article,
            absorbed: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Must Know")]
    MustKnow,
    #[serde(rename = "Sports Context")]
    SportsContext,
    #[serde(rename = "Tech & Tools")]
    TechTools,
    #[serde(rename = "Fun Stuff")]
    FunStuff,
}

impl Category {
    /// Fixed display order for digest output.
    pub const DISPLAY_ORDER: [Category; 4] = [
        Category::MustKnow,
        Category::SportsContext,
        Category::TechTools,
        Category::FunStuff,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::MustKnow => "Must Know",
            Category::SportsContext => "Sports Context",
            Category::TechTools => "Tech & Tools",
            Category::FunStuff => "Fun Stuff",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of analyzing one canonical article. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    pub is_clickbait: bool,
    pub confidence: f64,
    pub reasoning: String,
}

/// A canonical article paired with its classification, or `None` when the
/// analysis exhausted its retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedArticle {
    pub article: CanonicalArticle,
    pub classification: Option<Classification>,
}

/// Terminal status of one source fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FetchOutcome {
    Ok { articles: usize },
    Timeout,
    HttpError(String),
    ParseError(String),
}

impl FetchOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, FetchOutcome::Ok { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStatus {
    pub source: String,
    pub outcome: FetchOutcome,
}

/// Per-stage counters attached to the final digest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub fetched: usize,
    pub fetch_failed_sources: usize,
    pub duplicates_removed: usize,
    pub classified: usize,
    pub classification_failed: usize,
    pub filtered_clickbait: usize,
}

impl PipelineReport {
    /// Fraction of deduplicated articles that received a classification.
    pub fn success_rate(&self) -> f64 {
        let distinct = self.fetched.saturating_sub(self.duplicates_removed);
        if distinct == 0 {
            return 0.0;
        }
        self.classified as f64 / distinct as f64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub category: Category,
    pub articles: Vec<AnalyzedArticle>,
}

/// Final pipeline output: grouped articles plus the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Digest {
    pub generated_at: DateTime<Utc>,
    pub groups: Vec<CategoryGroup>,
    pub unclassified: Vec<AnalyzedArticle>,
    pub source_statuses: Vec<SourceStatus>,
    pub report: PipelineReport,
}

#[derive(Debug, thiserror::Error)]
pub enum CuratorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed parse error: {0}")]
    Parse(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CuratorError>;
