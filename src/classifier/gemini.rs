//! Gemini `generateContent` client.
//!
//! Calls the REST endpoint directly so the response can be constrained with a
//! JSON schema whose `category` property is an enum of the candidate IDs.
//! See: <https://ai.google.dev/api/generate-content>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use super::{Classifier, ClassifierResponse, ClassifyRequest, build_prompt, parse_response};
use crate::{AisleError, Result};

/// Default base URL for the Gemini API
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model, a fast and cheap one is plenty for aisle tagging.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Classifier backed by Google Gemini.
#[derive(Clone)]
pub struct GeminiClassifier {
    api_key: String,
    model: String,
    http: Client,
    base_url: String,
}

impl GeminiClassifier {
    /// Create a classifier using [`DEFAULT_MODEL`].
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a classifier with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            http,
            base_url: base_url.into(),
        }
    }

    /// Use a different Gemini model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Check response status and map to appropriate error.
    fn handle_response_errors(&self, response: &reqwest::Response) -> Result<()> {
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        match status.as_u16() {
            401 | 403 => Err(AisleError::AuthenticationFailed),
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(AisleError::RateLimited { retry_after })
            }
            code => Err(AisleError::Api {
                status: code,
                message: format!("Gemini API error for model {}: {}", self.model, status),
            }),
        }
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    fn name(&self) -> &str {
        "gemini"
    }

    #[instrument(name = "gemini.classify", skip(self, request), fields(model = %self.model, item = %request.item_name))]
    async fn classify(&self, request: &ClassifyRequest) -> Result<ClassifierResponse> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let candidates: Vec<&str> = request
            .candidate_categories
            .iter()
            .map(|c| c.as_str())
            .collect();

        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: build_prompt(request),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: json!({
                    "type": "OBJECT",
                    "properties": {
                        "category": { "type": "STRING", "enum": candidates }
                    },
                    "required": ["category"]
                }),
            },
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AisleError::Http(e.to_string()))?;

        self.handle_response_errors(&response)?;

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AisleError::MalformedResponse(e.to_string()))?;

        let text = result
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .ok_or(AisleError::EmptyResponse)?;

        parse_response(&text)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}
