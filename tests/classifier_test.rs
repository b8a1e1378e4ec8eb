use async_trait::async_trait;
use news_curator::classifier::{
    parse_classification, AnalysisBackend, ClassificationError, Classifier, RetryPolicy,
};
use news_curator::parser::article_id;
use news_curator::types::{CanonicalArticle, Category, RawArticle};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TEMPLATE: &str = "Title: {title}\nSource: {source}\nSummary: {summary}";
const GOOD_RESPONSE: &str =
    r#"{"category": "Tech & Tools", "is_clickbait": false, "confidence": 0.9, "reasoning": "Developer tooling news."}"#;

fn canonical(title: &str) -> CanonicalArticle {
    let link = format!("https://example.test/{}", title.replace(' ', "-"));
    CanonicalArticle::from_raw(RawArticle {
        id: article_id(&link),
        title: title.to_string(),
        link,
        source: "Example Wire".to_string(),
        published: None,
        summary: Some("A summary.".to_string()),
    })
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
    }
}

/// Backend that replays a fixed sequence of outcomes and counts calls.
struct SequenceBackend {
    responses: Mutex<VecDeque<Result<String, ClassificationError>>>,
    calls: AtomicUsize,
}

impl SequenceBackend {
    fn new(responses: Vec<Result<String, ClassificationError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisBackend for SequenceBackend {
    async fn complete(&self, _prompt: &str) -> Result<String, ClassificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("backend called more times than scripted")
    }
}

/// Backend that tracks how many calls are in flight at once.
struct CountingBackend {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl CountingBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AnalysisBackend for CountingBackend {
    async fn complete(&self, _prompt: &str) -> Result<String, ClassificationError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(GOOD_RESPONSE.to_string())
    }
}

#[test]
fn test_valid_response_parses() {
    let classification = parse_classification(GOOD_RESPONSE).unwrap();
    assert_eq!(classification.category, Category::TechTools);
    assert!(!classification.is_clickbait);
    assert!((classification.confidence - 0.9).abs() < f64::EPSILON);
}

#[test]
fn test_fenced_response_parses() {
    let fenced = format!("```json\n{}\n```", GOOD_RESPONSE);
    assert!(parse_classification(&fenced).is_ok());
    let bare_fence = format!("```\n{}\n```", GOOD_RESPONSE);
    assert!(parse_classification(&bare_fence).is_ok());
}

#[test]
fn test_out_of_enum_category_is_a_parse_failure() {
    let raw =
        r#"{"category": "Politics", "is_clickbait": false, "confidence": 0.9, "reasoning": "x"}"#;
    assert!(matches!(
        parse_classification(raw),
        Err(ClassificationError::MalformedResponse(_))
    ));
}

#[test]
fn test_out_of_range_confidence_is_a_parse_failure() {
    let raw =
        r#"{"category": "Must Know", "is_clickbait": false, "confidence": 1.5, "reasoning": "x"}"#;
    assert!(matches!(
        parse_classification(raw),
        Err(ClassificationError::MalformedResponse(_))
    ));
}

#[test]
fn test_extra_or_missing_fields_are_parse_failures() {
    let extra = r#"{"category": "Must Know", "is_clickbait": false, "confidence": 0.5, "reasoning": "x", "sentiment": "positive"}"#;
    assert!(parse_classification(extra).is_err());

    let missing = r#"{"category": "Must Know", "is_clickbait": false, "confidence": 0.5}"#;
    assert!(parse_classification(missing).is_err());
}

#[test]
fn test_retry_policy_caps() {
    let policy = policy();
    let transport = ClassificationError::Transport("boom".to_string());
    assert!(policy.should_retry(&transport, 1));
    assert!(policy.should_retry(&transport, 2));
    assert!(!policy.should_retry(&transport, 3));

    assert!(policy.should_retry(&ClassificationError::RateLimit, 2));
    assert!(!policy.should_retry(&ClassificationError::RateLimit, 3));

    let malformed = ClassificationError::MalformedResponse("bad".to_string());
    assert!(policy.should_retry(&malformed, 1));
    assert!(!policy.should_retry(&malformed, 2));
}

#[tokio::test(start_paused = true)]
async fn test_transport_failures_exhaust_the_attempt_cap() {
    let backend = SequenceBackend::new(vec![
        Err(ClassificationError::Transport("reset".to_string())),
        Err(ClassificationError::Transport("reset".to_string())),
        Err(ClassificationError::Transport("reset".to_string())),
    ]);
    let classifier = Classifier::new(backend.clone(), TEMPLATE.to_string(), policy(), 5);

    let result = classifier.classify(&canonical("Outage story").article).await;

    assert!(matches!(result, Err(ClassificationError::Transport(_))));
    assert_eq!(backend.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_recovers_within_the_cap() {
    let backend = SequenceBackend::new(vec![
        Err(ClassificationError::RateLimit),
        Err(ClassificationError::RateLimit),
        Ok(GOOD_RESPONSE.to_string()),
    ]);
    let classifier = Classifier::new(backend.clone(), TEMPLATE.to_string(), policy(), 5);

    let result = classifier.classify(&canonical("Throttled story").article).await;

    assert!(result.is_ok());
    assert_eq!(backend.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_response_is_retried_exactly_once() {
    let backend = SequenceBackend::new(vec![
        Ok("not json at all".to_string()),
        Ok("still not json".to_string()),
    ]);
    let classifier = Classifier::new(backend.clone(), TEMPLATE.to_string(), policy(), 5);

    let result = classifier.classify(&canonical("Garbled story").article).await;

    assert!(matches!(
        result,
        Err(ClassificationError::MalformedResponse(_))
    ));
    assert_eq!(backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_then_valid_succeeds_on_the_re_ask() {
    let backend = SequenceBackend::new(vec![
        Ok("garbage".to_string()),
        Ok(GOOD_RESPONSE.to_string()),
    ]);
    let classifier = Classifier::new(backend.clone(), TEMPLATE.to_string(), policy(), 5);

    let result = classifier.classify(&canonical("Flaky story").article).await;

    assert!(result.is_ok());
    assert_eq!(backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_calls_never_exceed_the_limit() {
    let backend = CountingBackend::new();
    let classifier = Classifier::new(backend.clone(), TEMPLATE.to_string(), policy(), 5);

    let articles: Vec<CanonicalArticle> = (0..20)
        .map(|i| canonical(&format!("Concurrent story number {}", i)))
        .collect();

    let analyzed = classifier.classify_all(articles, None).await;

    assert_eq!(analyzed.len(), 20);
    assert!(analyzed.iter().all(|a| a.classification.is_some()));
    let peak = backend.peak.load(Ordering::SeqCst);
    assert!(peak <= 5, "peak concurrency {} exceeded the limit", peak);
    assert_eq!(peak, 5, "fan-out should saturate the limit");
}

#[tokio::test]
async fn test_prompt_substitution() {
    let backend = SequenceBackend::new(vec![Ok(GOOD_RESPONSE.to_string())]);
    let classifier = Classifier::new(backend, TEMPLATE.to_string(), policy(), 5);

    let item = canonical("Prompted story");
    let prompt = classifier.build_prompt(&item.article);

    assert!(prompt.contains("Title: Prompted story"));
    assert!(prompt.contains("Source: Example Wire"));
    assert!(prompt.contains("Summary: A summary."));
}
