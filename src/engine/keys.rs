//! Key normalization.
//!
//! Replacement sources are nested structures. Before they can back a matcher,
//! their keys go through three steps:
//!
//! ```text
//! {"User": {"First Name": "Ada"}}
//!     │ flatten
//!     ▼
//! "User.First Name"  ──canonicalize──▶  "user.first.name"  ──lookup_key──▶  "USER_FIRST_NAME"
//! ```
//!
//! The canonical key is what the store is keyed by; the lookup key is what a
//! template actually spells inside its delimiters. Two different source paths
//! that canonicalize to the same key overwrite each other (last write wins).

use crate::{Error, Result, Scalar};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_KEY_RULE_PATTERN: &str = "[^a-zA-Z0-9]";
pub const DEFAULT_KEY_RULE_REPLACE: &str = "_";

/// Flatten `source` into `(dot.path, leaf)` pairs, in source order.
///
/// A non-empty list or map contributes `prefix + key + "."` to its children;
/// anything else is a leaf, including empty containers. List items are keyed
/// by index. A scalar `source` has no keys and yields nothing.
pub fn flatten(source: &Value, prefix: &str) -> Vec<(String, Scalar)> {
    let mut out = Vec::new();
    flatten_into(source, prefix, &mut out);
    out
}

fn flatten_into(source: &Value, prefix: &str, out: &mut Vec<(String, Scalar)>) {
    let children: Vec<(String, &Value)> = match source {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items.iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect(),
        _ => return,
    };

    for (key, value) in children {
        let path = format!("{prefix}{key}");
        if is_branch(value) {
            flatten_into(value, &format!("{path}."), out);
        } else {
            out.push((path, Scalar::from_leaf(value)));
        }
    }
}

fn is_branch(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => false,
    }
}

/// Lower-case `raw`, collapse each run of non-alphanumerics into one `.`, and
/// trim dots and spaces from both ends.
pub fn canonicalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let dotted = regex!(r"[^a-zA-Z0-9]+").replace_all(&lowered, ".");
    dotted.trim_matches(|c| c == '.' || c == ' ').to_string()
}

/// Flatten and canonicalize a replacement source into a canonical-keyed map.
pub fn standardise_source(source: &Value) -> BTreeMap<String, Scalar> {
    if !matches!(source, Value::Object(_) | Value::Array(_)) {
        tracing::debug!("replacement source is not a container; nothing to add");
    }

    let mut map = BTreeMap::new();
    for (path, value) in flatten(source, "") {
        map.insert(canonicalize(&path), value);
    }
    map
}

/// Sanitization rule turning a canonical key into its lookup form.
///
/// The result of the pattern replacement is always upper-cased. An empty
/// pattern disables sanitization (upper-casing still applies).
#[derive(Debug, Clone)]
pub struct KeyRule {
    pattern: String,
    replace: String,
    matcher: Option<Regex>,
}

impl Default for KeyRule {
    fn default() -> Self {
        KeyRule {
            pattern: DEFAULT_KEY_RULE_PATTERN.to_string(),
            replace: DEFAULT_KEY_RULE_REPLACE.to_string(),
            matcher: Some(regex!("[^a-zA-Z0-9]").clone()),
        }
    }
}

impl KeyRule {
    /// Build a rule from a regex `pattern` and its `replace` text. `replace`
    /// may refer to capture groups (`$1`, `${name}`).
    pub fn new(pattern: &str, replace: &str) -> Result<Self> {
        let matcher = if pattern.is_empty() {
            None
        } else {
            Some(
                Regex::new(pattern)
                    .map_err(|source| Error::InvalidKeyRule { pattern: pattern.to_string(), source })?,
            )
        };
        Ok(KeyRule { pattern: pattern.to_string(), replace: replace.to_string(), matcher })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn replace(&self) -> &str {
        &self.replace
    }

    /// The key a template must spell to reach `canonical`.
    pub fn lookup_key(&self, canonical: &str) -> String {
        match &self.matcher {
            Some(re) => re.replace_all(canonical, self.replace.as_str()).to_uppercase(),
            None => canonical.to_uppercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn flatten_joins_nested_paths() {
        let flat = flatten(&json!({"user": {"name": "Ada", "tags": ["a", "b"]}, "n": 1}), "");
        assert_eq!(
            flat,
            vec![
                ("n".to_string(), Scalar::Integer(1)),
                ("user.name".to_string(), Scalar::from("Ada")),
                ("user.tags.0".to_string(), Scalar::from("a")),
                ("user.tags.1".to_string(), Scalar::from("b")),
            ]
        );
    }

    #[test]
    fn flatten_keeps_empty_containers_as_leaves() {
        let flat = flatten(&json!({"a": {}, "b": [], "c": {"d": null}}), "cfg.");
        assert_eq!(
            flat,
            vec![
                ("cfg.a".to_string(), Scalar::EmptyMap),
                ("cfg.b".to_string(), Scalar::EmptyList),
                ("cfg.c.d".to_string(), Scalar::Null),
            ]
        );
    }

    #[test]
    fn flatten_of_scalar_is_empty() {
        assert!(flatten(&json!("just text"), "").is_empty());
    }

    #[test]
    fn canonicalize_collapses_punctuation_runs() {
        assert_eq!(canonicalize("User.Name"), "user.name");
        assert_eq!(canonicalize("user_name"), "user.name");
        assert_eq!(canonicalize("USER NAME"), "user.name");
        assert_eq!(canonicalize("  --Order__ID.. "), "order.id");
        assert_eq!(canonicalize("a//b"), "a.b");
    }

    #[test]
    fn standardise_last_write_wins_on_collision() {
        let map = standardise_source(&json!({"user": {"name": "nested"}, "user_name": "flat"}));
        assert_eq!(map.len(), 1);
        assert_eq!(map["user.name"], Scalar::from("flat"));
    }

    #[test]
    fn default_lookup_key() {
        let rule = KeyRule::default();
        assert_eq!(rule.lookup_key("user.name"), "USER_NAME");
        assert_eq!(rule.pattern(), DEFAULT_KEY_RULE_PATTERN);
    }

    #[test]
    fn custom_and_empty_key_rules() {
        let rule = KeyRule::new(r"\.", "-").unwrap();
        assert_eq!(rule.lookup_key("user.name"), "USER-NAME");

        let rule = KeyRule::new("", "").unwrap();
        assert_eq!(rule.lookup_key("user.name"), "USER.NAME");
    }

    #[test]
    fn invalid_key_rule_is_rejected() {
        let err = KeyRule::new("(", "_").unwrap_err();
        assert!(matches!(err, Error::InvalidKeyRule { .. }));
    }

    proptest! {
        #[test]
        fn canonical_keys_ignore_case_and_separators(
            words in proptest::collection::vec("[a-z0-9]{1,6}", 1..4),
            sep in prop::sample::select(vec![".", "_", " ", "-", "__", ". "]),
        ) {
            let lower = words.join(".");
            let mixed = words.iter().map(|w| w.to_uppercase()).collect::<Vec<_>>().join(sep);
            prop_assert_eq!(canonicalize(&mixed), canonicalize(&lower));
        }

        #[test]
        fn canonical_keys_have_no_edge_separators(raw in ".{0,24}") {
            let key = canonicalize(&raw);
            prop_assert!(!key.starts_with('.') && !key.ends_with('.'));
            prop_assert!(!key.contains(".."));
        }
    }
}
