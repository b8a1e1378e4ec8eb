use crate::types::{
    AnalyzedArticle, Category, CategoryGroup, Digest, PipelineReport, SourceStatus,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Group analyzed articles by category in the fixed display order. Within a
/// category, articles are ordered by source priority, then recency.
/// Unclassifiable articles are kept on the digest, flagged rather than
/// dropped.
pub fn assemble(
    analyzed: Vec<AnalyzedArticle>,
    priorities: &HashMap<String, i32>,
    source_statuses: Vec<SourceStatus>,
    report: PipelineReport,
    generated_at: DateTime<Utc>,
    max_articles_per_category: usize,
) -> Digest {
    let mut groups: Vec<CategoryGroup> = Category::DISPLAY_ORDER
        .iter()
        .map(|&category| CategoryGroup {
            category,
            articles: Vec::new(),
        })
        .collect();
    let mut unclassified = Vec::new();

    for item in analyzed {
        match item.classification.as_ref().map(|c| c.category) {
            Some(category) => {
                let group = groups
                    .iter_mut()
                    .find(|g| g.category == category)
                    .expect("display order covers every category");
                group.articles.push(item);
            }
            None => unclassified.push(item),
        }
    }

    for group in &mut groups {
        group.articles.sort_by(|a, b| {
            let pa = priorities
                .get(&a.article.article.source)
                .copied()
                .unwrap_or(0);
            let pb = priorities
                .get(&b.article.article.source)
                .copied()
                .unwrap_or(0);
            pb.cmp(&pa)
                .then_with(|| b.article.article.published.cmp(&a.article.article.published))
                .then_with(|| a.article.article.title.cmp(&b.article.article.title))
        });
        if group.articles.len() > max_articles_per_category {
            debug!(
                "Truncating '{}' from {} to {} articles",
                group.category,
                group.articles.len(),
                max_articles_per_category
            );
            group.articles.truncate(max_articles_per_category);
        }
    }

    Digest {
        generated_at,
        groups,
        unclassified,
        source_statuses,
        report,
    }
}

/// Render the digest as a self-contained static HTML page.
pub fn render_html(digest: &Digest) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str("<title>News Digest</title>\n");
    html.push_str("<style>\n");
    html.push_str(EMBEDDED_CSS);
    html.push_str("</style>\n</head>\n<body>\n");

    html.push_str("<header>\n<h1>News Digest</h1>\n");
    html.push_str(&format!(
        "<p class=\"generated\">Generated {}</p>\n",
        digest.generated_at.format("%B %d, %Y at %H:%M UTC")
    ));
    html.push_str("</header>\n");

    for group in &digest.groups {
        if group.articles.is_empty() {
            continue;
        }
        html.push_str(&format!(
            "<section>\n<h2>{}</h2>\n<ul>\n",
            escape(group.category.label())
        ));
        for item in &group.articles {
            html.push_str(&render_article(item));
        }
        html.push_str("</ul>\n</section>\n");
    }

    if !digest.unclassified.is_empty() {
        html.push_str("<section>\n<h2>Unclassified</h2>\n");
        html.push_str("<p class=\"note\">These articles could not be analyzed this run.</p>\n<ul>\n");
        for item in &digest.unclassified {
            html.push_str(&render_article(item));
        }
        html.push_str("</ul>\n</section>\n");
    }

    let report = &digest.report;
    html.push_str("<footer>\n");
    html.push_str(&format!(
        "<p>Fetched {} articles ({} source failures), removed {} duplicates, \
         classified {} ({} failed, {} clickbait filtered). Success rate {:.1}%.</p>\n",
        report.fetched,
        report.fetch_failed_sources,
        report.duplicates_removed,
        report.classified,
        report.classification_failed,
        report.filtered_clickbait,
        report.success_rate() * 100.0
    ));
    for status in &digest.source_statuses {
        if !status.outcome.is_ok() {
            html.push_str(&format!(
                "<p class=\"note\">Skipped '{}': {:?}</p>\n",
                escape(&status.source),
                status.outcome
            ));
        }
    }
    html.push_str("</footer>\n</body>\n</html>\n");
    html
}

fn render_article(item: &AnalyzedArticle) -> String {
    let article = &item.article.article;
    let mut li = String::from("<li>");
    li.push_str(&format!(
        "<a href=\"{}\">{}</a> <span class=\"source\">{}</span>",
        escape(&article.link),
        escape(&article.title),
        escape(&article.source)
    ));
    if let Some(published) = article.published {
        li.push_str(&format!(
            " <span class=\"date\">{}</span>",
            published.format("%Y-%m-%d %H:%M")
        ));
    }
    if let Some(classification) = &item.classification {
        li.push_str(&format!(
            " <span class=\"confidence\" title=\"{}\">{:.0}%</span>",
            escape(&classification.reasoning),
            classification.confidence * 100.0
        ));
    }
    li.push_str("</li>\n");
    li
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const EMBEDDED_CSS: &str = "\
body { font-family: system-ui, sans-serif; max-width: 52rem; margin: 0 auto; padding: 1rem; color: #1a1a1a; }
h1 { margin-bottom: 0.2rem; }
h2 { border-bottom: 2px solid #e0e0e0; padding-bottom: 0.3rem; }
ul { list-style: none; padding: 0; }
li { margin: 0.6rem 0; line-height: 1.4; }
a { color: #0b57d0; text-decoration: none; }
a:hover { text-decoration: underline; }
.generated { color: #666; font-size: 0.9rem; }
.source { color: #666; font-size: 0.85rem; margin-left: 0.4rem; }
.date { color: #999; font-size: 0.8rem; }
.confidence { color: #999; font-size: 0.8rem; cursor: help; }
.note { color: #888; font-size: 0.85rem; }
footer { margin-top: 2rem; border-top: 1px solid #e0e0e0; color: #666; font-size: 0.85rem; }
";
