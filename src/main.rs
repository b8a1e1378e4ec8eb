use clap::Parser;
use news_curator::{config, digest, CurationPipeline, CuratorConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "news-curator",
    about = "Fetch, deduplicate and categorize news feeds into a static digest"
)]
struct Cli {
    /// Path to the source registry JSON
    #[arg(short, long, default_value = "config/feeds.json")]
    feeds: PathBuf,

    /// Path to the categorization prompt template
    #[arg(short, long, default_value = "prompts/categorization.md")]
    prompt: PathBuf,

    /// Output path for the HTML digest
    #[arg(short, long, default_value = "docs/index.html")]
    output: PathBuf,

    /// Keep articles flagged as clickbait in the digest
    #[arg(long)]
    keep_clickbait: bool,

    /// Cancel outstanding work after this many seconds and emit partial results
    #[arg(long)]
    deadline_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Cli::parse();
    info!("Starting news curator");

    let mut curator_config = CuratorConfig::from_env();
    if args.keep_clickbait {
        curator_config.filter_clickbait = false;
    }
    if let Some(secs) = args.deadline_secs {
        curator_config.run_deadline_seconds = Some(secs);
    }

    let sources = config::load_feeds(&args.feeds)?;
    let template = config::load_prompt_template(&args.prompt)?;

    let pipeline = CurationPipeline::new(curator_config, template)?;
    let result = pipeline.run(&sources).await?;

    let html = digest::render_html(&result);
    if let Some(parent) = args.output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&args.output, html)?;

    let categorized: usize = result.groups.iter().map(|g| g.articles.len()).sum();
    info!(
        "Digest written to {} ({} categorized, {} unclassified, success rate {:.1}%)",
        args.output.display(),
        categorized,
        result.unclassified.len(),
        result.report.success_rate() * 100.0
    );

    Ok(())
}
