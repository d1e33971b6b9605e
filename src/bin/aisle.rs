//! aisle: category cache CLI
//!
//! Resolves, teaches and inspects the category cache of one shopping list.
//! List data is kept under the configured data dir between runs.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use llm::builder::LLMBackend;
use tracing::{info, warn};

use aisle::classifier::NoClassifier;
use aisle::config::{Config, Secrets};
use aisle::{
    AisleError, Category, CategoryCache, Classifier, Language, LlmClassifier, MemoryStore,
    ResolutionSource, RetryingClassifier,
};

/// Shopping-list category cache
#[derive(Parser)]
#[command(name = "aisle")]
#[command(version)]
#[command(about = "Product category cache for shared shopping lists")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Shopping list (cache scope) to work on
    #[arg(short, long, env = "AISLE_LIST", default_value = "default")]
    list: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Categorize item names, asking the classifier for unknown ones
    Resolve {
        /// Item names
        #[arg(required = true)]
        names: Vec<String>,
        /// Language of the item names ("he" or "en")
        #[arg(long, default_value = "he")]
        lang: Language,
    },

    /// Assign a category to an item name
    Add {
        name: String,
        category: Category,
    },

    /// Change the category of a known entry
    Recategorize {
        /// Entry id (the normalized item name)
        id: String,
        category: Category,
    },

    /// Record that an item was moved to another aisle
    Correct {
        name: String,
        category: Category,
    },

    /// Autocomplete known item names
    Suggest {
        partial: String,
        #[arg(short = 'n', long, default_value_t = 5)]
        limit: usize,
    },

    /// Show every cached entry grouped by aisle
    List,

    /// Fill an empty list with the starter vocabulary
    Seed,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // default: warn for CLI; override with RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;

    let classifier = build_classifier(&config, &secrets)?;
    let store = Arc::new(MemoryStore::persistent(config.data_dir()));
    let cache = CategoryCache::with_config(store, classifier, config.cache_config());

    if let Err(e) = cache.attach_to_scope(args.list.as_str()).await {
        warn!(error = %e, "continuing without list data");
    }

    match args.command {
        Command::Resolve { names, lang } => {
            for name in names {
                let resolution = cache.resolve(&name, lang).await;
                let note = match resolution.source {
                    ResolutionSource::Exact => "cached",
                    ResolutionSource::Fuzzy => "similar",
                    ResolutionSource::Classifier | ResolutionSource::Coalesced => "classified",
                    ResolutionSource::Fallback => "fallback",
                };
                println!(
                    "{} {:<10} {name} ({note})",
                    resolution.category.icon(),
                    resolution.category
                );
                if let Some(e) = resolution.remote_error {
                    eprintln!("  not saved: {e}");
                }
            }
        }

        Command::Add { name, category } => {
            cache.add(&name, category).await?;
            println!("{} {category} {name}", category.icon());
        }

        Command::Recategorize { id, category } => {
            cache.recategorize(&id, category).await?;
            println!("{} {category} {id}", category.icon());
        }

        Command::Correct { name, category } => {
            cache.record_correction(&name, category).await?;
            println!("{} {category} {name}", category.icon());
        }

        Command::Suggest { partial, limit } => {
            for name in cache.suggest(&partial, limit) {
                println!("{name}");
            }
        }

        Command::List => {
            let mut entries = cache.entries();
            entries.sort_by_key(|e| (e.category.order(), e.added_at));
            let mut current = None;
            for entry in entries {
                if current != Some(entry.category) {
                    println!("{} {}", entry.category.icon(), entry.category);
                    current = Some(entry.category);
                }
                println!("    {}", entry.display_name);
            }
            if current.is_none() {
                println!("list '{}' has no cached items", args.list);
            }
        }

        Command::Seed => {
            let written = cache.seed_defaults().await?;
            println!("seeded {written} items");
        }
    }

    Ok(())
}

/// Build the classifier named in `[classifier]`, wrapped with retries.
fn build_classifier(config: &Config, secrets: &Secrets) -> Result<Arc<dyn Classifier>, AisleError> {
    let section = &config.classifier;
    let provider = section.provider.as_str();

    let require_key = || {
        secrets.api_key(provider).ok_or_else(|| {
            AisleError::Configuration(format!(
                "no API key for classifier provider '{provider}' (secrets.toml or environment)"
            ))
        })
    };

    let inner: Arc<dyn Classifier> = match provider {
        "none" => return Ok(Arc::new(NoClassifier)),
        #[cfg(feature = "gemini")]
        "gemini" => {
            let key = require_key()?;
            let classifier = match &section.base_url {
                Some(url) => aisle::GeminiClassifier::with_base_url(key, url),
                None => aisle::GeminiClassifier::new(key),
            };
            match &section.model {
                Some(model) => Arc::new(classifier.model(model)),
                None => Arc::new(classifier),
            }
        }
        "google" => {
            // same key as the REST classifier
            let key = secrets.api_key("gemini").ok_or_else(|| {
                AisleError::Configuration("no API key for classifier provider 'google'".to_string())
            })?;
            let model = section.model.as_deref().unwrap_or("gemini-2.5-flash");
            Arc::new(
                LlmClassifier::new(LLMBackend::Google, Some(key), model, "google")
                    .timeout_secs(section.timeout_secs),
            )
        }
        "openai" | "anthropic" | "openrouter" => {
            let (backend, default_model) = match provider {
                "openai" => (LLMBackend::OpenAI, "gpt-4o-mini"),
                "anthropic" => (LLMBackend::Anthropic, "claude-3-5-haiku-latest"),
                _ => (LLMBackend::OpenRouter, "google/gemini-2.5-flash"),
            };
            let model = section.model.as_deref().unwrap_or(default_model);
            Arc::new(
                LlmClassifier::new(backend, Some(require_key()?), model, provider)
                    .timeout_secs(section.timeout_secs),
            )
        }
        "ollama" => {
            let model = section.model.as_deref().unwrap_or("llama3.2");
            let url = section
                .base_url
                .as_deref()
                .unwrap_or("http://localhost:11434");
            Arc::new(
                LlmClassifier::new(LLMBackend::Ollama, None::<String>, model, "ollama")
                    .base_url(url)
                    .timeout_secs(section.timeout_secs),
            )
        }
        other => {
            return Err(AisleError::Configuration(format!(
                "unknown classifier provider '{other}'"
            )));
        }
    };

    info!(provider, classifier = inner.name(), "classifier configured");
    Ok(Arc::new(RetryingClassifier::new(inner, config.retry_config())))
}
