//! Aisle - shared product-category cache for shopping lists
//!
//! This crate remembers which aisle (category) an item name belongs to, per
//! shopping list. Known names are answered locally; unknown names are sent to
//! a [`Classifier`] once and the validated answer is shared with everyone on
//! the same list through a [`CacheStore`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aisle::{CategoryCache, GeminiClassifier, Language, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> aisle::Result<()> {
//!     let cache = CategoryCache::new(
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(GeminiClassifier::new("your-gemini-key")),
//!     );
//!     cache.attach_to_scope("weekly-groceries").await?;
//!
//!     let resolution = cache.resolve("Oat milk", Language::En).await;
//!     println!("{} {}", resolution.category.icon(), resolution.category);
//!
//!     // later lookups are local, including substring matches
//!     let again = cache.resolve("oat milk 1L", Language::En).await;
//!     assert_eq!(again.category, resolution.category);
//!     Ok(())
//! }
//! ```
//!
//! # Local-only
//!
//! With [`NoClassifier`](classifier::NoClassifier) every miss falls back to
//! [`Category::Other`]; manual [`CategoryCache::add`] and
//! [`CategoryCache::record_correction`] calls still teach the cache.

pub mod cache;
pub mod classifier;
#[cfg(feature = "cli")]
pub mod config;
pub mod error;
pub mod normalize;
pub mod store;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use cache::{CacheConfig, CategoryCache, Resolution, ResolutionSource};
#[cfg(feature = "gemini")]
pub use classifier::GeminiClassifier;
pub use classifier::{
    Classifier, ClassifierResponse, ClassifyRequest, LlmClassifier, RetryConfig,
    RetryingClassifier,
};
pub use error::{AisleError, Result};
pub use normalize::normalize;
pub use store::{CacheStore, MemoryStore, SnapshotStream};
pub use types::{Category, Language, ProductEntry, ScopeId, Snapshot};
