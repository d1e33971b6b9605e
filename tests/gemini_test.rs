//! Wiremock integration tests for GeminiClassifier.
//!
//! These tests verify the HTTP exchange and error mapping using mocked
//! responses.
#![cfg(feature = "gemini")]

use std::sync::Arc;
use std::time::Duration;

use aisle::{
    AisleError, Category, CategoryCache, Classifier, ClassifyRequest, GeminiClassifier, Language,
    MemoryStore, ResolutionSource,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

fn model_reply(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{ "text": text }]
            },
            "finishReason": "STOP"
        }]
    })
}

fn request(name: &str) -> ClassifyRequest {
    ClassifyRequest::new(name, Language::En)
}

/// Test successful classification with a JSON-schema request body.
#[tokio::test]
async fn test_classify_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test_key"))
        .and(body_partial_json(serde_json::json!({
            "generationConfig": { "responseMimeType": "application/json" }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(model_reply(r#"{"category": "dairy"}"#)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let classifier = GeminiClassifier::with_base_url("test_key", mock_server.uri());
    let response = classifier
        .classify(&request("Milk"))
        .await
        .expect("classify should succeed");

    assert_eq!(response.category, "dairy");
}

/// The response schema restricts answers to the candidate categories.
#[tokio::test]
async fn test_request_schema_lists_candidates() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_partial_json(serde_json::json!({
            "generationConfig": {
                "responseSchema": {
                    "properties": {
                        "category": { "enum": Category::identifiers() }
                    }
                }
            }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(model_reply(r#"{"category": "bakery"}"#)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let classifier = GeminiClassifier::with_base_url("test_key", mock_server.uri());
    let response = classifier.classify(&request("Bagel")).await.unwrap();
    assert_eq!(response.category, "bakery");
}

/// Models sometimes wrap JSON in a markdown fence.
#[tokio::test]
async fn test_classify_fenced_reply() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(model_reply(
            "```json\n{\"category\": \"frozen\"}\n```",
        )))
        .mount(&mock_server)
        .await;

    let classifier = GeminiClassifier::with_base_url("test_key", mock_server.uri());
    let response = classifier.classify(&request("Ice cream")).await.unwrap();
    assert_eq!(response.category, "frozen");
}

/// Test custom model selection.
#[tokio::test]
async fn test_custom_model_path() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash-lite:generateContent"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(model_reply(r#"{"category": "cleaning"}"#)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let classifier =
        GeminiClassifier::with_base_url("test_key", mock_server.uri()).model("gemini-2.0-flash-lite");
    let response = classifier.classify(&request("Bleach")).await.unwrap();
    assert_eq!(response.category, "cleaning");
}

/// Test 401 maps to AuthenticationFailed.
#[tokio::test]
async fn test_auth_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let classifier = GeminiClassifier::with_base_url("bad_key", mock_server.uri());
    let err = classifier.classify(&request("Milk")).await.unwrap_err();
    assert!(matches!(err, AisleError::AuthenticationFailed));
    assert!(!err.is_transient());
}

/// Test 429 maps to RateLimited with the retry-after hint.
#[tokio::test]
async fn test_rate_limited() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&mock_server)
        .await;

    let classifier = GeminiClassifier::with_base_url("test_key", mock_server.uri());
    let err = classifier.classify(&request("Milk")).await.unwrap_err();
    match err {
        AisleError::RateLimited { retry_after } => {
            assert_eq!(retry_after, Some(Duration::from_secs(7)));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

/// Test 5xx maps to a transient Api error.
#[tokio::test]
async fn test_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let classifier = GeminiClassifier::with_base_url("test_key", mock_server.uri());
    let err = classifier.classify(&request("Milk")).await.unwrap_err();
    assert!(matches!(err, AisleError::Api { status: 503, .. }));
    assert!(err.is_transient());
}

/// No candidates means nothing to parse.
#[tokio::test]
async fn test_empty_candidates() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "candidates": [] })),
        )
        .mount(&mock_server)
        .await;

    let classifier = GeminiClassifier::with_base_url("test_key", mock_server.uri());
    let err = classifier.classify(&request("Milk")).await.unwrap_err();
    assert!(matches!(err, AisleError::EmptyResponse));
}

/// Prose instead of JSON is a malformed response.
#[tokio::test]
async fn test_prose_reply() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(model_reply("Milk is a dairy product.")),
        )
        .mount(&mock_server)
        .await;

    let classifier = GeminiClassifier::with_base_url("test_key", mock_server.uri());
    let err = classifier.classify(&request("Milk")).await.unwrap_err();
    assert!(matches!(err, AisleError::MalformedResponse(_)));
}

/// End to end: a garbage category is coerced and the classifier is only
/// asked once.
#[tokio::test]
async fn test_cache_coerces_and_remembers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(model_reply(r#"{"category": "banana"}"#)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let cache = CategoryCache::new(
        Arc::new(MemoryStore::new()),
        Arc::new(GeminiClassifier::with_base_url("test_key", mock_server.uri())),
    );
    cache.attach_to_scope("list").await.unwrap();

    let first = cache.resolve("Widget", Language::En).await;
    assert_eq!(first.category, Category::Other);
    assert_eq!(first.source, ResolutionSource::Classifier);

    let second = cache.resolve("widget", Language::En).await;
    assert_eq!(second.category, Category::Other);
    assert_eq!(second.source, ResolutionSource::Exact);
}

/// End to end: an HTTP failure falls back without remembering anything.
#[tokio::test]
async fn test_cache_falls_back_on_http_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;

    let cache = CategoryCache::new(
        Arc::new(MemoryStore::new()),
        Arc::new(GeminiClassifier::with_base_url("test_key", mock_server.uri())),
    );
    cache.attach_to_scope("list").await.unwrap();

    for _ in 0..2 {
        let resolution = cache.resolve("Kale", Language::En).await;
        assert_eq!(resolution.category, Category::Other);
        assert_eq!(resolution.source, ResolutionSource::Fallback);
    }
    assert!(cache.is_empty());
}
