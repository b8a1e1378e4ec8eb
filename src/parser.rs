use crate::types::{CuratorError, RawArticle, Result};
use chrono::Utc;
use feed_rs::parser;
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// Query parameters that never distinguish one story from another.
const TRACKING_PARAMS: [&str; 7] = [
    "fbclid", "gclid", "mc_cid", "mc_eid", "igshid", "ref", "ref_src",
];

fn is_tracking_param(name: &str) -> bool {
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name)
}

/// Canonical form of an article link: lowercased scheme/host, tracking
/// parameters stripped, no fragment, no trailing slash.
pub fn normalize_link(link: &str) -> String {
    let mut url = match Url::parse(link.trim()) {
        Ok(url) => url,
        // Not a parseable URL; the raw string is the best key we have.
        Err(_) => return link.trim().trim_end_matches('/').to_string(),
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !is_tracking_param(name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (name, value) in &kept {
            pairs.append_pair(name, value);
        }
        drop(pairs);
    }
    url.set_fragment(None);

    let mut normalized = url.to_string();
    while normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Deterministic article id: the same normalized link always hashes to the
/// same id, so re-fetches across runs are idempotent.
pub fn article_id(link: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, normalize_link(link).as_bytes())
}

/// Parse feed XML into raw articles. Entries without a link are skipped;
/// feed order is preserved.
pub fn parse_feed(source: &str, content: &str) -> Result<Vec<RawArticle>> {
    let feed = parser::parse(content.as_bytes())
        .map_err(|e| CuratorError::Parse(format!("failed to parse feed: {}", e)))?;

    let mut articles = Vec::new();

    for entry in feed.entries {
        let link = match entry.links.first() {
            Some(link) => link.href.clone(),
            None => {
                debug!("Skipping entry without link in feed '{}'", source);
                continue;
            }
        };

        let title = entry
            .title
            .map(|t| t.content)
            .unwrap_or_else(|| "No title".to_string());

        let published = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.with_timezone(&Utc));

        let summary = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body));

        articles.push(RawArticle {
            id: article_id(&link),
            title,
            link,
            source: source.to_string(),
            published,
            summary,
        });
    }

    debug!("Parsed {} entries from feed '{}'", articles.len(), source);
    Ok(articles)
}
