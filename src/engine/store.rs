//! Persistent replacement store.
//!
//! Entries are keyed by canonical key (see `keys.rs`) and live as long as the
//! engine that owns the store. Nothing is ever removed; an entry only changes
//! when a later addition canonicalizes to the same key.

use super::keys::standardise_source;
use crate::Scalar;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplacementStore {
    entries: BTreeMap<String, Scalar>,
}

impl ReplacementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten, canonicalize and merge `source`. Later additions win.
    pub fn add(&mut self, source: &Value) {
        let added = standardise_source(source);
        tracing::debug!(added = added.len(), total_before = self.entries.len(), "merging replacements");
        self.entries.extend(added);
    }

    /// The persistent entries, keyed by canonical key.
    pub fn get(&self) -> &BTreeMap<String, Scalar> {
        &self.entries
    }

    /// Persistent entries overlaid with `overrides` for a single call.
    ///
    /// The store itself is left untouched.
    pub fn merged(&self, overrides: &Value) -> BTreeMap<String, Scalar> {
        let mut merged = self.entries.clone();
        merged.extend(standardise_source(overrides));
        merged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn later_additions_win() {
        let mut store = ReplacementStore::new();
        store.add(&json!({"name": "Ada", "age": 30}));
        store.add(&json!({"NAME": "Grace"}));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get()["name"], Scalar::from("Grace"));
        assert_eq!(store.get()["age"], Scalar::Integer(30));
    }

    #[test]
    fn merged_does_not_persist_overrides() {
        let mut store = ReplacementStore::new();
        store.add(&json!({"x": 1}));

        let merged = store.merged(&json!({"x": 2, "y": true}));
        assert_eq!(merged["x"], Scalar::Integer(2));
        assert_eq!(merged["y"], Scalar::Bool(true));

        assert_eq!(store.get()["x"], Scalar::Integer(1));
        assert!(!store.get().contains_key("y"));
    }

    #[test]
    fn scalar_source_adds_nothing() {
        let mut store = ReplacementStore::new();
        store.add(&json!(42));
        assert!(store.is_empty());
    }
}
