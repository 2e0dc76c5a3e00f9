//! Telemetry metric name constants.
//!
//! Consumers install their own `metrics` recorder (e.g. prometheus,
//! statsd); without a recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `lectern_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `action`: quota-gated action (e.g. "ai_requests")
//! - `tier`: subject tier: "free", "premium" or "admin"
//! - `outcome`: quota decision: "allowed", "rejected", "reset" or "fail_open"
//! - `model`: model id passed to the provider
//! - `status`: outcome: "ok", "cached" or "error"

/// Total quota checks.
///
/// Labels: `action`, `tier`, `outcome`.
pub const QUOTA_CHECKS_TOTAL: &str = "lectern_quota_checks_total";

/// Total generate requests through the AI client.
///
/// Labels: `model`, `status` ("ok" | "cached" | "error").
pub const REQUESTS_TOTAL: &str = "lectern_requests_total";

/// Generate duration in seconds, first attempt to success.
///
/// Labels: `model`.
pub const REQUEST_DURATION_SECONDS: &str = "lectern_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `model`.
pub const RETRIES_TOTAL: &str = "lectern_retries_total";

/// Total response cache hits.
///
/// Labels: `namespace`.
pub const CACHE_HITS_TOTAL: &str = "lectern_cache_hits_total";

/// Total response cache misses.
///
/// Labels: `namespace`.
pub const CACHE_MISSES_TOTAL: &str = "lectern_cache_misses_total";

/// Total cache backend failures swallowed by the response cache.
///
/// Labels: `namespace`, `operation`.
pub const CACHE_ERRORS_TOTAL: &str = "lectern_cache_errors_total";
