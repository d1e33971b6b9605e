//! Scoped product-category cache.
//!
//! [`CategoryCache`] answers "which aisle does this item belong to?" for one
//! shopping list at a time:
//!
//! - known names (exact or substring match) are answered from the local
//!   index without any network call;
//! - unknown names go to the [`Classifier`] once, under a timeout, and the
//!   validated answer is written locally and to the [`CacheStore`];
//! - the attached scope's snapshots replace the local index as they arrive,
//!   except where a local write is still in flight (see [`index`]).
//!
//! Classifier failures never surface as errors. `resolve` falls back to
//! [`Category::Other`] and remembers nothing, so the next call retries.

pub mod index;

pub use index::{MIN_SUGGEST_CHARS, MatchKind, ProductIndex, ScopeState, SnapshotOutcome};

use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::classifier::{Classifier, ClassifyRequest};
use crate::normalize::normalize;
use crate::store::{CacheStore, SnapshotStream};
use crate::telemetry;
use crate::types::{Category, Language, ProductEntry, ScopeId};
use crate::{AisleError, Result};

/// Starter vocabulary written by [`CategoryCache::seed_defaults`].
pub const DEFAULT_PRODUCTS: [(&str, Category); 5] = [
    ("חלב", Category::Dairy),
    ("לחם", Category::Bakery),
    ("תפוחים", Category::FruitsVeg),
    ("גבינה", Category::Dairy),
    ("בננות", Category::FruitsVeg),
];

/// How long an in-flight classification stays shareable.
const INFLIGHT_TTL: Duration = Duration::from_secs(60);

/// Configuration for a [`CategoryCache`].
///
/// ```rust
/// # use aisle::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .classify_timeout(Duration::from_secs(5))
///     .subscribe_timeout(Duration::from_secs(3));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on one classifier call, retries included. Default: 10s.
    pub classify_timeout: Duration,
    /// How long `attach_to_scope` waits for the first snapshot. Default: 10s.
    pub subscribe_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            classify_timeout: Duration::from_secs(10),
            subscribe_timeout: Duration::from_secs(10),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the classifier timeout.
    pub fn classify_timeout(mut self, timeout: Duration) -> Self {
        self.classify_timeout = timeout;
        self
    }

    /// Set how long to wait for the first snapshot of a scope.
    pub fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }
}

/// Where a resolved category came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    /// Local index, same normalized name.
    Exact,
    /// Local index, substring match.
    Fuzzy,
    /// Fresh classifier answer, now remembered.
    Classifier,
    /// Answer of a classifier call another caller had in flight.
    Coalesced,
    /// Empty input or classifier unavailable. Nothing was remembered.
    Fallback,
}

/// Outcome of [`CategoryCache::resolve`].
#[derive(Debug)]
pub struct Resolution {
    pub category: Category,
    pub source: ResolutionSource,
    /// Set when the classifier answered but the remote write failed. The
    /// local index still holds the answer.
    pub remote_error: Option<AisleError>,
}

impl Resolution {
    fn new(category: Category, source: ResolutionSource) -> Self {
        Self {
            category,
            source,
            remote_error: None,
        }
    }

    fn fallback() -> Self {
        Self::new(Category::Other, ResolutionSource::Fallback)
    }
}

impl From<MatchKind> for ResolutionSource {
    fn from(kind: MatchKind) -> Self {
        match kind {
            MatchKind::Exact => ResolutionSource::Exact,
            MatchKind::Fuzzy => ResolutionSource::Fuzzy,
        }
    }
}

/// Product-category cache bound to at most one scope at a time.
///
/// Cheap to share behind an `Arc`; all methods take `&self`. Dropping the
/// cache stops its snapshot listener.
pub struct CategoryCache {
    store: Arc<dyn CacheStore>,
    classifier: Arc<dyn Classifier>,
    config: CacheConfig,
    state: Arc<RwLock<ScopeState>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    inflight: moka::future::Cache<String, Category>,
}

impl CategoryCache {
    /// Create a detached cache with the default configuration.
    pub fn new(store: Arc<dyn CacheStore>, classifier: Arc<dyn Classifier>) -> Self {
        Self::with_config(store, classifier, CacheConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn CacheStore>,
        classifier: Arc<dyn Classifier>,
        config: CacheConfig,
    ) -> Self {
        Self {
            store,
            classifier,
            config,
            state: Arc::new(RwLock::new(ScopeState::new())),
            listener: Mutex::new(None),
            inflight: moka::future::Cache::builder()
                .time_to_live(INFLIGHT_TTL)
                .build(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // ===== lookups =====

    /// Category for `name`, asking the classifier on a miss.
    ///
    /// Never fails: an unavailable classifier yields [`Category::Other`] with
    /// [`ResolutionSource::Fallback`] and nothing is remembered.
    pub async fn resolve(&self, name: &str, language: Language) -> Resolution {
        let key = normalize(name);
        if key.is_empty() {
            metrics::counter!(telemetry::LOOKUPS_TOTAL, "outcome" => "empty").increment(1);
            return Resolution::fallback();
        }

        if let Some((category, kind)) = self.lookup(&key) {
            let outcome = match kind {
                MatchKind::Exact => "exact",
                MatchKind::Fuzzy => "fuzzy",
            };
            metrics::counter!(telemetry::LOOKUPS_TOTAL, "outcome" => outcome).increment(1);
            debug!(key, %category, outcome, "category cache hit");
            return Resolution::new(category, kind.into());
        }

        metrics::counter!(telemetry::LOOKUPS_TOTAL, "outcome" => "miss").increment(1);
        debug!(key, "category cache miss");

        let entry = self
            .inflight
            .entry(key.clone())
            .or_try_insert_with(self.classify(name, language))
            .await;

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "classifier unavailable, falling back to other");
                return Resolution::fallback();
            }
        };

        let category = *entry.value();
        if !entry.is_fresh() {
            return Resolution::new(category, ResolutionSource::Coalesced);
        }

        let slot = InflightSlot::new(&self.inflight, key);
        let remote_error = self.add(name, category).await.err();
        slot.release().await;
        Resolution {
            category,
            source: ResolutionSource::Classifier,
            remote_error,
        }
    }

    fn lookup(&self, key: &str) -> Option<(Category, MatchKind)> {
        let state = self.read_state();
        state
            .index()
            .find_similar(key)
            .map(|(entry, kind)| (entry.category, kind))
    }

    async fn classify(&self, name: &str, language: Language) -> Result<Category> {
        let request = ClassifyRequest::new(name.trim(), language);
        let timeout = self.config.classify_timeout;
        let started = Instant::now();

        let outcome = tokio::time::timeout(timeout, self.classifier.classify(&request)).await;
        metrics::histogram!(telemetry::CLASSIFIER_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        let response = match outcome {
            Ok(Ok(response)) => {
                metrics::counter!(telemetry::CLASSIFIER_REQUESTS_TOTAL, "status" => "ok")
                    .increment(1);
                response
            }
            Ok(Err(e)) => {
                metrics::counter!(telemetry::CLASSIFIER_REQUESTS_TOTAL, "status" => "error")
                    .increment(1);
                return Err(e);
            }
            Err(_) => {
                metrics::counter!(telemetry::CLASSIFIER_REQUESTS_TOTAL, "status" => "timeout")
                    .increment(1);
                return Err(AisleError::Timeout(timeout));
            }
        };

        let (category, coerced) = Category::coerce(&response.category);
        if coerced {
            metrics::counter!(telemetry::COERCED_CATEGORIES_TOTAL).increment(1);
            warn!(
                classifier = self.classifier.name(),
                raw = %response.category,
                "classifier returned unknown category, using other"
            );
        }
        Ok(category)
    }

    /// Exact-then-fuzzy lookup in the local index.
    pub fn find_similar(&self, name: &str) -> Option<ProductEntry> {
        let key = normalize(name);
        let state = self.read_state();
        state.index().find_similar(&key).map(|(entry, _)| entry.clone())
    }

    /// Up to `limit` known display names containing `partial`, shortest first.
    pub fn suggest(&self, partial: &str, limit: usize) -> Vec<String> {
        self.read_state().index().suggest(partial, limit)
    }

    /// Every known display name in insertion order.
    pub fn display_names(&self) -> Vec<String> {
        let state = self.read_state();
        state
            .index()
            .entries()
            .iter()
            .map(|e| e.display_name.clone())
            .collect()
    }

    pub fn entries(&self) -> Vec<ProductEntry> {
        self.read_state().index().entries().to_vec()
    }

    pub fn len(&self) -> usize {
        self.read_state().index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Currently attached scope.
    pub fn scope(&self) -> Option<ScopeId> {
        self.read_state().scope().cloned()
    }

    // ===== writes =====

    /// Remember `category` for `name`, locally first and then remotely.
    ///
    /// The local index keeps the change even when the remote write fails.
    /// Without an attached scope the change stays local and `NoScope` is
    /// returned.
    pub async fn add(&self, name: &str, category: Category) -> Result<()> {
        let entry = ProductEntry::new(name, category);
        if entry.key.is_empty() {
            return Err(AisleError::InvalidInput("item name is empty".to_string()));
        }

        let (scope, seq) = {
            let mut state = self.write_state();
            let seq = state.record_upsert(entry.clone());
            (state.scope().cloned(), seq)
        };
        let (Some(scope), Some(seq)) = (scope, seq) else {
            return Err(AisleError::NoScope);
        };

        let pending = PendingGuard::new(&self.state, &entry.key, seq);
        let result = self.store.upsert(&scope, &entry).await;
        self.finish_write("upsert", &scope, pending, result)
    }

    /// Change the category of the entry with `entry_id`, leaving its name
    /// untouched.
    pub async fn recategorize(&self, entry_id: &str, category: Category) -> Result<()> {
        let (scope, seq) = {
            let mut state = self.write_state();
            let seq = state.record_category(entry_id, category);
            (state.scope().cloned(), seq)
        };
        let Some(scope) = scope else {
            return Err(AisleError::NoScope);
        };

        let pending = seq.map(|seq| PendingGuard::new(&self.state, entry_id, seq));
        let result = self.store.update_category(&scope, entry_id, category).await;
        match pending {
            Some(pending) => self.finish_write("update_category", &scope, pending, result),
            None => {
                // not known locally; the store decides
                Self::count_write("update_category", result.is_ok());
                result
                    .map(|_| ())
                    .map_err(|e| remote_write_error(&scope, entry_id, e))
            }
        }
    }

    fn finish_write(
        &self,
        operation: &'static str,
        scope: &ScopeId,
        pending: PendingGuard<'_>,
        result: Result<u64>,
    ) -> Result<()> {
        Self::count_write(operation, result.is_ok());
        match result {
            Ok(revision) => {
                debug!(%scope, key = %pending.key, revision, operation, "remote write applied");
                pending.ack(revision);
                Ok(())
            }
            Err(e) => {
                warn!(%scope, key = %pending.key, operation, error = %e, "remote write failed, keeping local change");
                let err = remote_write_error(scope, &pending.key, e);
                drop(pending);
                Err(err)
            }
        }
    }

    fn count_write(operation: &'static str, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        metrics::counter!(
            telemetry::REMOTE_WRITES_TOTAL,
            "operation" => operation,
            "status" => status
        )
        .increment(1);
    }

    /// Apply a user's manual move of `name` to `category`.
    ///
    /// Recategorizes a similar known entry, does nothing if it already has
    /// `category`, and adds `name` otherwise.
    pub async fn record_correction(&self, name: &str, category: Category) -> Result<()> {
        match self.find_similar(name) {
            Some(entry) if entry.category == category => {
                debug!(key = %entry.key, %category, "correction matches cache");
                Ok(())
            }
            Some(entry) => self.recategorize(entry.id(), category).await,
            None => self.add(name, category).await,
        }
    }

    /// Write [`DEFAULT_PRODUCTS`] into an empty attached scope.
    ///
    /// Returns how many entries were written (0 if the scope already has
    /// entries).
    pub async fn seed_defaults(&self) -> Result<usize> {
        if self.scope().is_none() {
            return Err(AisleError::NoScope);
        }
        if !self.is_empty() {
            return Ok(0);
        }
        for (name, category) in DEFAULT_PRODUCTS {
            self.add(name, category).await?;
        }
        info!(count = DEFAULT_PRODUCTS.len(), "seeded default products");
        Ok(DEFAULT_PRODUCTS.len())
    }

    // ===== scope lifecycle =====

    /// Bind the cache to `scope`.
    ///
    /// Stops any previous listener and clears the index, then subscribes and
    /// applies the first snapshot before returning. Later snapshots are
    /// applied in the background. On failure the cache keeps the scope with
    /// an empty index and works local-only.
    pub async fn attach_to_scope(&self, scope: impl Into<ScopeId>) -> Result<()> {
        let scope = scope.into();
        self.stop_listener();
        self.inflight.invalidate_all();
        let generation = self.write_state().begin(scope.clone());
        info!(%scope, store = self.store.name(), "attaching category cache");

        let mut stream = self.store.subscribe(&scope).await.map_err(|e| {
            warn!(%scope, error = %e, "scope subscription failed");
            AisleError::ScopeSubscriptionFailed {
                scope: scope.to_string(),
                reason: e.to_string(),
            }
        })?;

        let first = tokio::time::timeout(self.config.subscribe_timeout, stream.next()).await;
        let first_error = match first {
            Ok(Some(snapshot)) => {
                self.write_state().apply_snapshot(generation, snapshot);
                None
            }
            Ok(None) => {
                warn!(%scope, "snapshot stream ended before the first snapshot");
                return Err(AisleError::ScopeSubscriptionFailed {
                    scope: scope.to_string(),
                    reason: "snapshot stream closed".to_string(),
                });
            }
            Err(_) => {
                warn!(%scope, "no initial snapshot in time, continuing in background");
                Some(AisleError::ScopeSubscriptionFailed {
                    scope: scope.to_string(),
                    reason: format!(
                        "no snapshot within {}s",
                        self.config.subscribe_timeout.as_secs_f64()
                    ),
                })
            }
        };

        let handle = tokio::spawn(listen(
            Arc::clone(&self.state),
            generation,
            scope.clone(),
            stream,
        ));
        let previous = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(%scope, entries = self.len(), "category cache attached");
                Ok(())
            }
        }
    }

    /// Stop following the current scope and clear the index.
    pub fn detach_scope(&self) {
        self.stop_listener();
        self.inflight.invalidate_all();
        let mut state = self.write_state();
        if let Some(scope) = state.scope() {
            info!(%scope, "detaching category cache");
        }
        state.detach();
    }

    fn stop_listener(&self) {
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ScopeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ScopeState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &RwLock<ScopeState>) -> RwLockWriteGuard<'_, ScopeState> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

/// `EntryNotFound` passes through; everything else becomes `RemoteWriteFailed`.
fn remote_write_error(scope: &ScopeId, key: &str, error: AisleError) -> AisleError {
    match error {
        AisleError::EntryNotFound(_) => error,
        other => AisleError::RemoteWriteFailed {
            scope: scope.to_string(),
            key: key.to_string(),
            reason: other.to_string(),
        },
    }
}

/// An optimistic write waiting for the store.
///
/// Unless acknowledged, dropping it (remote failure or a cancelled caller)
/// releases the pending record so the next snapshot decides the value.
struct PendingGuard<'a> {
    state: &'a RwLock<ScopeState>,
    key: String,
    seq: u64,
    acked: bool,
}

impl<'a> PendingGuard<'a> {
    fn new(state: &'a RwLock<ScopeState>, key: &str, seq: u64) -> Self {
        Self {
            state,
            key: key.to_string(),
            seq,
            acked: false,
        }
    }

    fn ack(mut self, revision: u64) {
        self.acked = true;
        lock_state(self.state).ack(&self.key, self.seq, revision);
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.acked {
            lock_state(self.state).fail(&self.key, self.seq);
            debug!(key = %self.key, seq = self.seq, "pending write released");
        }
    }
}

/// Keeps a finished classification shareable until its write settles.
///
/// Dropped without [`release`](Self::release), it schedules the
/// invalidation on the current runtime.
struct InflightSlot {
    inflight: moka::future::Cache<String, Category>,
    key: Option<String>,
}

impl InflightSlot {
    fn new(inflight: &moka::future::Cache<String, Category>, key: String) -> Self {
        Self {
            inflight: inflight.clone(),
            key: Some(key),
        }
    }

    async fn release(mut self) {
        if let Some(key) = &self.key {
            self.inflight.invalidate(key).await;
        }
        self.key = None;
    }
}

impl Drop for InflightSlot {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let inflight = self.inflight.clone();
            handle.spawn(async move { inflight.invalidate(&key).await });
        }
    }
}

impl Drop for CategoryCache {
    fn drop(&mut self) {
        self.stop_listener();
    }
}

/// Apply snapshots of one scope generation until the stream ends or the
/// cache moves on.
async fn listen(
    state: Arc<RwLock<ScopeState>>,
    generation: u64,
    scope: ScopeId,
    mut stream: SnapshotStream,
) {
    while let Some(snapshot) = stream.next().await {
        let outcome = lock_state(&state).apply_snapshot(generation, snapshot);
        match outcome {
            SnapshotOutcome::Applied => {}
            SnapshotOutcome::Outdated => debug!(%scope, "ignored outdated snapshot"),
            SnapshotOutcome::Detached => break,
        }
    }
    debug!(%scope, generation, "snapshot listener stopped");
}
