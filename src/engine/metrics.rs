//! Apply metrics.
//!
//! Collected on every `apply` call (the counters are cheap) and surfaced to
//! callers through [`Replacer::apply_with_metrics`](crate::Replacer::apply_with_metrics).
//! Useful when tuning large replacement stores or chasing a template that
//! leaves placeholders behind.

use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct ApplyMetrics {
    /// Total elapsed time for the call.
    pub total: Duration,
    /// Time spent merging overrides and compiling the plain matcher.
    pub prepare: Duration,
    /// Number of lookup keys the plain matcher was built for.
    pub lookup_keys: usize,
    /// Encoding the subject into its structural text form. Zero in tree mode.
    pub encode: Duration,
    /// Plain-token pass.
    pub plain: PassMetrics,
    /// Modifier-token pass.
    pub modifier: PassMetrics,
    /// Parsing the substituted text back. Zero in tree mode.
    pub decode: Duration,
}

/// Timing and token counts for one substitution pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassMetrics {
    pub duration: Duration,
    /// Tokens whose value was substituted.
    pub replaced: usize,
    /// Distinct tokens left in place because their key was not found.
    pub unresolved: usize,
    /// Repeated occurrences of an already-handled token text.
    pub duplicates: usize,
}

/// `apply` output bundled with its metrics.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub value: Value,
    pub metrics: ApplyMetrics,
}
