//! `llm` crate wrapper implementing [`Classifier`].
//!
//! Lets any chat backend the `llm` crate supports (OpenAI, Anthropic,
//! OpenRouter, Ollama, Google) act as the classifier. The category set is
//! enforced by the prompt only, so answers are parsed leniently and validated
//! by the cache like any other.

use async_trait::async_trait;
use llm::LLMProvider;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;
use tracing::instrument;

use super::{Classifier, ClassifierResponse, ClassifyRequest, build_prompt, parse_response};
use crate::{AisleError, Result};

/// Classifier backed by an `llm` crate chat provider.
///
/// # Example
///
/// ```ignore
/// use llm::builder::LLMBackend;
/// use aisle::classifier::LlmClassifier;
///
/// let classifier = LlmClassifier::new(
///     LLMBackend::OpenAI,
///     Some("sk-your-key"),
///     "gpt-4o-mini",
///     "openai",
/// );
/// ```
pub struct LlmClassifier {
    backend: LLMBackend,
    api_key: Option<String>,
    model: String,
    name: String,
    /// Base URL override (only used for Ollama backend)
    base_url: Option<String>,
    timeout_secs: u64,
}

impl LlmClassifier {
    /// Create a classifier for the given backend and model.
    ///
    /// # Arguments
    ///
    /// * `backend` - The LLM backend to use (OpenAI, Anthropic, etc.)
    /// * `api_key` - API key for the backend (`None` for keyless access)
    /// * `model` - Model ID understood by the backend
    /// * `name` - Human-readable name for logging/debugging
    pub fn new(
        backend: LLMBackend,
        api_key: Option<impl Into<String>>,
        model: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            api_key: api_key.map(|k| k.into()),
            model: model.into(),
            name: name.into(),
            base_url: None,
            timeout_secs: 30,
        }
    }

    /// Set the Ollama base URL (only relevant for Ollama backend).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the timeout in seconds.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn build_provider(&self) -> Result<Box<dyn LLMProvider>> {
        let mut builder = LLMBuilder::new()
            .backend(self.backend.clone())
            .model(&self.model)
            .timeout_seconds(self.timeout_secs)
            .temperature(0.0);
        if let Some(ref key) = self.api_key {
            builder = builder.api_key(key);
        }

        if self.backend == LLMBackend::Ollama
            && let Some(ref url) = self.base_url
        {
            builder = builder.base_url(url.clone());
        }

        builder.build().map_err(|e| AisleError::Llm(e.to_string()))
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "llm.classify", skip(self, request), fields(model = %self.model, provider = %self.name))]
    async fn classify(&self, request: &ClassifyRequest) -> Result<ClassifierResponse> {
        let provider = self.build_provider()?;
        let messages = [ChatMessage::user().content(build_prompt(request)).build()];

        let response = provider
            .chat(&messages)
            .await
            .map_err(AisleError::from)?;

        let text = response.text().ok_or(AisleError::EmptyResponse)?;
        parse_response(&text)
    }
}
