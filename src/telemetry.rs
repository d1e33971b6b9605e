//! Telemetry metric name constants.
//!
//! Centralised metric names for aisle operations. Consumers install their own
//! `metrics` recorder (e.g. prometheus, statsd); without a recorder installed,
//! all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `aisle_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `outcome`: lookup result: "exact", "fuzzy", "miss" or "empty"
//! - `status`: "ok", "error" or "timeout"
//! - `operation`: store operation: "upsert" or "update_category"

/// Local index lookups performed by `resolve`.
///
/// Labels: `outcome` ("exact" | "fuzzy" | "miss" | "empty").
pub const LOOKUPS_TOTAL: &str = "aisle_lookups_total";

/// Classifier calls issued on cache misses.
///
/// Labels: `status` ("ok" | "error" | "timeout").
pub const CLASSIFIER_REQUESTS_TOTAL: &str = "aisle_classifier_requests_total";

/// Classifier call duration in seconds.
pub const CLASSIFIER_DURATION_SECONDS: &str = "aisle_classifier_duration_seconds";

/// Classifier answers outside the category set, coerced to `other`.
pub const COERCED_CATEGORIES_TOTAL: &str = "aisle_coerced_categories_total";

/// Writes sent to the shared store.
///
/// Labels: `operation`, `status` ("ok" | "error").
pub const REMOTE_WRITES_TOTAL: &str = "aisle_remote_writes_total";

/// Remote snapshots applied to the local index.
pub const SNAPSHOTS_APPLIED_TOTAL: &str = "aisle_snapshots_applied_total";

/// Classifier retry attempts (not counting the initial request).
///
/// Labels: `classifier`.
pub const RETRIES_TOTAL: &str = "aisle_retries_total";
