//! Substitution engine.
//!
//! Split into focused submodules under `src/engine/`; the public handle that
//! owns engine state lives in `src/api.rs`.
//!
//! ## How the parts work together
//!
//! ```text
//! replacement source ── standardise_source ──▶ ReplacementStore   (keys.rs, store.rs)
//!                                                  │ merged with per-call overrides
//!                                                  v
//!                        Substitution::prepare                    (substitute.rs)
//!                          - KeyRule::lookup_key per entry        (keys.rs)
//!                          - DelimiterSet::compile_plain          (delimiters.rs)
//!                                                  │
//!               ┌──────────────────────────────────┴──────────────────┐
//!               v                                                     v
//!   run_serialized (default)                              substitute_tree (opt-in)
//!     encode ─▶ plain pass ─▶ modifier pass ─▶ decode       per string: both passes
//!               │                                                     │
//!               └──────── ModifierRegistry / ModifierChain ───────────┘
//!                                (modifiers.rs)
//! ```
//!
//! ## Responsibilities by module
//!
//! - `delimiters.rs`: escapes delimiters and builds the plain and modifier matchers.
//! - `keys.rs`: flattening, canonical keys, and the key rule producing lookup keys.
//! - `store.rs`: the persistent canonical-keyed replacement store.
//! - `modifiers.rs`: modifier name resolution, built-ins, and chain folding.
//! - `substitute.rs`: the serialized pipeline and both text passes.
//! - `tree.rs`: the structure-walking alternative.
//! - `metrics.rs`: per-call timing and token counts.
//!
//! ## Debugging
//!
//! The engine emits `tracing` events: `debug` for state changes and pass
//! summaries, `trace` for individual token decisions.

#[path = "engine/delimiters.rs"]
mod delimiters;
#[path = "engine/keys.rs"]
mod keys;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/modifiers.rs"]
mod modifiers;
#[path = "engine/store.rs"]
mod store;
#[path = "engine/substitute.rs"]
mod substitute;
#[path = "engine/tree.rs"]
mod tree;

pub use delimiters::{DEFAULT_LEFT, DEFAULT_MODIFIER, DEFAULT_RIGHT, DelimiterSet};
pub use keys::{DEFAULT_KEY_RULE_PATTERN, DEFAULT_KEY_RULE_REPLACE, KeyRule, canonicalize, flatten, standardise_source};
pub use metrics::{ApplyMetrics, ApplyReport, PassMetrics};
pub use modifiers::{Modifier, ModifierRef, ModifierRegistry, ModifierSet, ModifierTable};
pub use store::ReplacementStore;
pub(crate) use substitute::Substitution;
pub(crate) use tree::substitute_tree;
