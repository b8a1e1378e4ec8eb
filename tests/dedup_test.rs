use chrono::{Duration, TimeZone, Utc};
use news_curator::dedup::{title_similarity, Deduplicator};
use news_curator::parser::{article_id, normalize_link};
use news_curator::types::RawArticle;
use std::collections::HashMap;

fn article(title: &str, link: &str, source: &str, hours_ago: i64) -> RawArticle {
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    RawArticle {
        id: article_id(link),
        title: title.to_string(),
        link: link.to_string(),
        source: source.to_string(),
        published: Some(base - Duration::hours(hours_ago)),
        summary: Some(format!("Summary of {}", title)),
    }
}

fn priorities() -> HashMap<String, i32> {
    let mut map = HashMap::new();
    map.insert("Alpha Wire".to_string(), 10);
    map.insert("Beta Post".to_string(), 5);
    map
}

#[test]
fn test_normalized_links_share_an_id() {
    let plain = article_id("https://example.com/story/one");
    assert_eq!(plain, article_id("https://example.com/story/one/"));
    assert_eq!(plain, article_id("HTTPS://EXAMPLE.COM/story/one"));
    assert_eq!(
        plain,
        article_id("https://example.com/story/one?utm_source=feedly&utm_medium=rss")
    );
    assert_eq!(plain, article_id("https://example.com/story/one#section"));
    assert_ne!(plain, article_id("https://example.com/story/two"));
}

#[test]
fn test_normalize_preserves_meaningful_query() {
    let normalized = normalize_link("https://example.com/watch?v=abc123&utm_campaign=x");
    assert_eq!(normalized, "https://example.com/watch?v=abc123");
}

#[test]
fn test_exact_link_duplicates_merge() {
    let articles = vec![
        article("Volcano erupts in Iceland", "https://alpha.test/volcano", "Alpha Wire", 1),
        article(
            "Iceland volcano eruption coverage",
            "https://alpha.test/volcano?utm_source=rss",
            "Beta Post",
            0,
        ),
    ];

    let canonical = Deduplicator::new(0.6).deduplicate(articles, &priorities());

    assert_eq!(canonical.len(), 1);
    let kept = &canonical[0];
    assert_eq!(kept.article.source, "Alpha Wire");
    assert_eq!(kept.absorbed.len(), 1);
    assert!(kept.absorbed[0].contains("utm_source"));
}

#[test]
fn test_near_duplicate_titles_merge_across_links() {
    let articles = vec![
        article(
            "Parliament passes sweeping climate bill",
            "https://alpha.test/climate-bill",
            "Alpha Wire",
            2,
        ),
        article(
            "Parliament passes sweeping climate bill after debate",
            "https://beta.test/climate-vote",
            "Beta Post",
            1,
        ),
    ];

    let canonical = Deduplicator::new(0.6).deduplicate(articles, &priorities());

    assert_eq!(canonical.len(), 1);
    // The higher-priority source wins the cluster.
    assert_eq!(canonical[0].article.source, "Alpha Wire");
    assert_eq!(canonical[0].absorbed, vec!["https://beta.test/climate-vote"]);
}

#[test]
fn test_earliest_publication_wins_at_equal_priority() {
    let articles = vec![
        article(
            "Central bank holds interest rates steady",
            "https://beta.test/rates-later",
            "Beta Post",
            1,
        ),
        article(
            "Central bank holds interest rates steady today",
            "https://beta.test/rates-earlier",
            "Beta Post",
            6,
        ),
    ];

    let canonical = Deduplicator::new(0.6).deduplicate(articles, &priorities());

    assert_eq!(canonical.len(), 1);
    assert_eq!(canonical[0].article.link, "https://beta.test/rates-earlier");
}

#[test]
fn test_dissimilar_titles_stay_separate() {
    let articles = vec![
        article("Volcano erupts in Iceland", "https://alpha.test/volcano", "Alpha Wire", 1),
        article(
            "Championship final goes to penalties",
            "https://beta.test/final",
            "Beta Post",
            2,
        ),
    ];

    let canonical = Deduplicator::new(0.6).deduplicate(articles, &priorities());
    assert_eq!(canonical.len(), 2);
}

#[test]
fn test_deduplication_is_order_independent() {
    let build = || {
        vec![
            article("Volcano erupts in Iceland", "https://alpha.test/volcano", "Alpha Wire", 1),
            article(
                "Volcano erupts in Iceland overnight",
                "https://beta.test/volcano-news",
                "Beta Post",
                0,
            ),
            article(
                "Championship final goes to penalties",
                "https://beta.test/final",
                "Beta Post",
                2,
            ),
            article(
                "New open source database released",
                "https://alpha.test/database",
                "Alpha Wire",
                3,
            ),
        ]
    };

    let dedup = Deduplicator::new(0.6);
    let forward = dedup.deduplicate(build(), &priorities());
    let mut shuffled = build();
    shuffled.reverse();
    let backward = dedup.deduplicate(shuffled, &priorities());

    let links = |set: &[news_curator::types::CanonicalArticle]| {
        let mut links: Vec<String> = set.iter().map(|c| c.article.link.clone()).collect();
        links.sort();
        links
    };
    assert_eq!(links(&forward), links(&backward));
    assert_eq!(forward.len(), 3);
}

#[test]
fn test_title_similarity_bounds() {
    assert_eq!(title_similarity("Same headline here", "Same headline here"), 1.0);
    assert_eq!(title_similarity("", "Anything at all"), 0.0);
    let partial = title_similarity(
        "Parliament passes climate bill",
        "Parliament rejects climate bill",
    );
    assert!(partial > 0.0 && partial < 1.0);
}
