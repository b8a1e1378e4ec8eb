pub mod classifier;
pub mod config;
pub mod dedup;
pub mod digest;
pub mod fetcher;
pub mod parser;
pub mod pipeline;
pub mod types;

pub use classifier::{
    AnalysisBackend, ClassificationError, Classifier, ClaudeBackend, RetryPolicy,
};
pub use config::CuratorConfig;
pub use dedup::Deduplicator;
pub use fetcher::{FeedTransport, Fetcher, HttpTransport};
pub use pipeline::CurationPipeline;
pub use types::*;
