use crate::parser::normalize_link;
use crate::types::{CanonicalArticle, RawArticle};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Collapses articles that describe the same story. Pure and synchronous;
/// identical input sets yield identical output sets regardless of arrival
/// order.
pub struct Deduplicator {
    similarity_threshold: f64,
}

impl Deduplicator {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold,
        }
    }

    /// Reduce raw articles to one canonical article per story. `priorities`
    /// maps source name to registry priority and drives which duplicate wins.
    pub fn deduplicate(
        &self,
        mut articles: Vec<RawArticle>,
        priorities: &HashMap<String, i32>,
    ) -> Vec<CanonicalArticle> {
        let total = articles.len();

        // Canonical order fixes the representative independent of arrival
        // order: higher-priority source first, then earliest publication.
        articles.sort_by(|a, b| {
            let pa = priorities.get(&a.source).copied().unwrap_or(0);
            let pb = priorities.get(&b.source).copied().unwrap_or(0);
            pb.cmp(&pa)
                .then_with(|| cmp_published_earliest(a, b))
                .then_with(|| a.link.cmp(&b.link))
        });

        // Pass 1: exact merge on the normalized link.
        let mut canonical: Vec<CanonicalArticle> = Vec::new();
        let mut by_link: HashMap<String, usize> = HashMap::new();
        for article in articles {
            let key = normalize_link(&article.link);
            match by_link.get(&key) {
                Some(&index) => {
                    debug!("Absorbing exact duplicate: {}", article.link);
                    canonical[index].absorbed.push(article.link);
                }
                None => {
                    by_link.insert(key, canonical.len());
                    canonical.push(CanonicalArticle::from_raw(article));
                }
            }
        }

        // Pass 2: near-duplicate titles across different links (syndicated
        // copies of the same story).
        let mut kept: Vec<CanonicalArticle> = Vec::new();
        for candidate in canonical {
            let merge_into = kept.iter().position(|existing| {
                title_similarity(&existing.article.title, &candidate.article.title)
                    >= self.similarity_threshold
            });
            match merge_into {
                Some(index) => {
                    debug!(
                        "Absorbing near-duplicate title '{}' into '{}'",
                        candidate.article.title, kept[index].article.title
                    );
                    let existing = &mut kept[index];
                    existing.absorbed.push(candidate.article.link);
                    existing.absorbed.extend(candidate.absorbed);
                }
                None => kept.push(candidate),
            }
        }

        let removed = total - kept.len();
        if removed > 0 {
            info!("Removed {} duplicate articles ({} remain)", removed, kept.len());
        }
        kept
    }
}

fn cmp_published_earliest(a: &RawArticle, b: &RawArticle) -> Ordering {
    match (a.published, b.published) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Token-set Jaccard similarity over normalized titles, in [0, 1].
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let tokens_a = title_tokens(a);
    let tokens_b = title_tokens(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    intersection as f64 / union as f64
}

fn title_tokens(title: &str) -> HashSet<String> {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
        .collect()
}
