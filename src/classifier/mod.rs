//! Classifier boundary.
//!
//! A [`Classifier`] guesses the aisle of a free-text item name. Answers come
//! back raw ([`ClassifierResponse`]) and are validated by the cache, never
//! trusted as-is.
//!
//! Implementations:
//! - [`GeminiClassifier`]: Gemini `generateContent` REST endpoint with a JSON
//!   response schema.
//! - [`LlmClassifier`]: any chat backend of the `llm` crate.
//! - [`RetryingClassifier`]: decorator retrying transient failures.
//! - [`NoClassifier`]: always fails, for local-only operation.

#[cfg(feature = "gemini")]
pub mod gemini;
pub mod llm_chat;
pub mod retry;

#[cfg(feature = "gemini")]
pub use gemini::GeminiClassifier;
pub use llm_chat::LlmClassifier;
pub use retry::{RetryConfig, RetryingClassifier};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Category, Language};
use crate::{AisleError, Result};

/// Input to a classification call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifyRequest {
    pub item_name: String,
    pub language: Language,
    pub candidate_categories: Vec<Category>,
}

impl ClassifyRequest {
    /// Request against the full category set.
    pub fn new(item_name: impl Into<String>, language: Language) -> Self {
        Self {
            item_name: item_name.into(),
            language,
            candidate_categories: Category::ALL.to_vec(),
        }
    }
}

/// Raw classifier answer. `category` may be anything the model produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierResponse {
    #[serde(alias = "groupId", alias = "group_id")]
    pub category: String,
}

/// Remote service that assigns a category to an item name.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classifier name for logging/debugging.
    fn name(&self) -> &str;

    /// Classify one item name.
    async fn classify(&self, request: &ClassifyRequest) -> Result<ClassifierResponse>;
}

/// Classifier used when none is configured. Every call fails, so the cache
/// answers from its index and falls back to `other` on misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoClassifier;

#[async_trait]
impl Classifier for NoClassifier {
    fn name(&self) -> &str {
        "none"
    }

    async fn classify(&self, _request: &ClassifyRequest) -> Result<ClassifierResponse> {
        Err(AisleError::Configuration("no classifier configured".to_string()))
    }
}

/// Prompt shared by the text-completion classifiers.
pub(crate) fn build_prompt(request: &ClassifyRequest) -> String {
    let options = request
        .candidate_categories
        .iter()
        .map(|c| format!("- {c}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are a grocery assistant.\n\
         Categorize the item \"{name}\" (Language: {lang}) into exactly one of the following category IDs:\n\
         {options}\n\n\
         Respond with JSON of the form {{\"category\": \"<id>\"}} and nothing else. \
         If unsure, use {other}.",
        name = request.item_name,
        lang = request.language,
        other = Category::Other,
    )
}

/// Parse model output into a [`ClassifierResponse`].
///
/// Accepts a JSON object (`category`/`groupId` field), a JSON string, or
/// either of those wrapped in a markdown code fence.
pub(crate) fn parse_response(text: &str) -> Result<ClassifierResponse> {
    let body = strip_code_fence(text);
    if body.is_empty() {
        return Err(AisleError::EmptyResponse);
    }

    if let Ok(response) = serde_json::from_str::<ClassifierResponse>(body) {
        return Ok(response);
    }
    if let Ok(category) = serde_json::from_str::<String>(body) {
        return Ok(ClassifierResponse { category });
    }
    Err(AisleError::MalformedResponse(truncate(body, 200)))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_every_candidate() {
        let prompt = build_prompt(&ClassifyRequest::new("Milk", Language::En));
        for id in Category::identifiers() {
            assert!(prompt.contains(&format!("- {id}")), "missing {id}");
        }
        assert!(prompt.contains("\"Milk\""));
        assert!(prompt.contains("Language: en"));
    }

    #[test]
    fn parses_plain_json_object() {
        let r = parse_response(r#"{"category": "dairy"}"#).unwrap();
        assert_eq!(r.category, "dairy");
    }

    #[test]
    fn parses_legacy_group_id_field() {
        let r = parse_response(r#"{"groupId": "bakery"}"#).unwrap();
        assert_eq!(r.category, "bakery");
    }

    #[test]
    fn parses_fenced_json() {
        let r = parse_response("```json\n{\"category\": \"frozen\"}\n```").unwrap();
        assert_eq!(r.category, "frozen");
        let r = parse_response("```\n{\"category\": \"frozen\"}\n```").unwrap();
        assert_eq!(r.category, "frozen");
    }

    #[test]
    fn parses_json_string() {
        let r = parse_response("\"cleaning\"").unwrap();
        assert_eq!(r.category, "cleaning");
    }

    #[test]
    fn passes_garbage_category_through_unvalidated() {
        // validation happens in the cache, not here
        let r = parse_response(r#"{"category": "banana"}"#).unwrap();
        assert_eq!(r.category, "banana");
    }

    #[test]
    fn rejects_prose() {
        let err = parse_response("I think this is dairy.").unwrap_err();
        assert!(matches!(err, AisleError::MalformedResponse(_)));
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(
            parse_response("  ").unwrap_err(),
            AisleError::EmptyResponse
        ));
        assert!(matches!(
            parse_response("```json\n```").unwrap_err(),
            AisleError::EmptyResponse
        ));
    }

    #[tokio::test]
    async fn no_classifier_always_fails() {
        let result = NoClassifier
            .classify(&ClassifyRequest::new("milk", Language::En))
            .await;
        assert!(matches!(result, Err(AisleError::Configuration(_))));
    }
}
