use serde_json::Value;
use std::fmt;

#[macro_use]
mod macros;
mod api;
mod engine;

pub use api::{ReplacerConfig, Replacer, SubstitutionMode};
pub use engine::{
    ApplyMetrics, ApplyReport, DEFAULT_KEY_RULE_PATTERN, DEFAULT_KEY_RULE_REPLACE, DEFAULT_LEFT, DEFAULT_MODIFIER,
    DEFAULT_RIGHT, DelimiterSet, KeyRule, Modifier, ModifierRef, ModifierRegistry, ModifierSet, ModifierTable,
    PassMetrics, ReplacementStore, canonicalize, flatten, standardise_source,
};

// --- Values -----------------------------------------------------------------

/// A leaf value held by the replacement store.
///
/// Booleans, integers and finite floats are *native*: when one of them fills a
/// placeholder that makes up an entire string value, the placeholder is
/// replaced by the bare scalar instead of its text.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    /// An integer above `i64::MAX`.
    Unsigned(u64),
    Float(f64),
    String(String),
    /// An empty nested list in the replacement source. Kept as a leaf.
    EmptyList,
    /// An empty nested map in the replacement source. Kept as a leaf.
    EmptyMap,
}

impl Scalar {
    /// Convert a terminal JSON value into a `Scalar`.
    ///
    /// Non-empty containers are not leaves; they are rendered as their JSON text
    /// so the conversion stays total.
    pub fn from_leaf(value: &Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => Scalar::Integer(i),
                (None, Some(u)) => Scalar::Unsigned(u),
                (None, None) => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Scalar::String(s.clone()),
            Value::Array(items) if items.is_empty() => Scalar::EmptyList,
            Value::Object(map) if map.is_empty() => Scalar::EmptyMap,
            other => Scalar::String(other.to_string()),
        }
    }

    /// True for values that may be spliced into the structural form unquoted.
    pub fn is_native(&self) -> bool {
        match self {
            Scalar::Bool(_) | Scalar::Integer(_) | Scalar::Unsigned(_) => true,
            Scalar::Float(f) => f.is_finite(),
            _ => false,
        }
    }

    /// The JSON value this scalar stands for.
    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Integer(i) => Value::from(*i),
            Scalar::Unsigned(u) => Value::from(*u),
            Scalar::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            Scalar::String(s) => Value::String(s.clone()),
            Scalar::EmptyList => Value::Array(Vec::new()),
            Scalar::EmptyMap => Value::Object(serde_json::Map::new()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Integer(i) => write!(f, "{i}"),
            Scalar::Unsigned(u) => write!(f, "{u}"),
            // JSON number form keeps the fraction (`3.0`), so a float stays a float
            // after the text is parsed back.
            Scalar::Float(v) => match serde_json::Number::from_f64(*v) {
                Some(n) => write!(f, "{n}"),
                None => write!(f, "{v}"),
            },
            Scalar::String(s) => f.write_str(s),
            Scalar::EmptyList => f.write_str("[]"),
            Scalar::EmptyMap => f.write_str("{}"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Integer(value.into())
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(i) => Scalar::Integer(i),
            Err(_) => Scalar::Unsigned(value),
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

// --- Tokens -----------------------------------------------------------------

/// A placeholder matched in the text being substituted.
///
/// `text` is the full matched region, delimiters included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'t> {
    /// `{{ KEY }}`; `lookup_key` is the upper-cased key the matcher was built for.
    Plain { text: &'t str, lookup_key: &'t str },
    /// `{{ mod1,mod2 | KEY }}`; `chain` is the raw text before the separator.
    Modifier { text: &'t str, chain: &'t str, key: &'t str },
}

impl<'t> Token<'t> {
    pub(crate) fn text(&self) -> &'t str {
        match self {
            Token::Plain { text, .. } | Token::Modifier { text, .. } => text,
        }
    }

    /// The key segment: the matched lookup key, or the untrimmed key text of a
    /// modifier token.
    pub(crate) fn key(&self) -> &'t str {
        match self {
            Token::Plain { lookup_key, .. } => lookup_key,
            Token::Modifier { key, .. } => key,
        }
    }
}

// --- Errors -----------------------------------------------------------------

/// Errors surfaced by the engine.
///
/// Unresolved placeholders and unknown modifiers are not errors: they fall back
/// to leaving the text in place and passing the value through respectively.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to encode subject: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("substitution corrupted the structural form: {source}")]
    StructuralCorruption {
        #[source]
        source: serde_json::Error,
        /// The intermediate text that failed to parse.
        content: String,
    },

    #[error("wrapped scalar subject came back as {found} instead of a single-element list")]
    ShapeMismatch { found: String },

    #[error("invalid key rule pattern '{pattern}': {source}")]
    InvalidKeyRule {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to compile {what} matcher: {source}")]
    Matcher {
        what: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn leaf_conversion_keeps_types() {
        assert_eq!(Scalar::from_leaf(&json!(3)), Scalar::Integer(3));
        assert_eq!(Scalar::from_leaf(&json!(1.5)), Scalar::Float(1.5));
        assert_eq!(Scalar::from_leaf(&json!(u64::MAX)), Scalar::Unsigned(u64::MAX));
        assert_eq!(Scalar::from_leaf(&json!(i64::MAX as u64)), Scalar::Integer(i64::MAX));
        assert_eq!(Scalar::from_leaf(&json!(true)), Scalar::Bool(true));
        assert_eq!(Scalar::from_leaf(&json!("x")), Scalar::String("x".into()));
        assert_eq!(Scalar::from_leaf(&json!([])), Scalar::EmptyList);
        assert_eq!(Scalar::from_leaf(&json!({})), Scalar::EmptyMap);
        assert_eq!(Scalar::from_leaf(&json!(null)), Scalar::Null);
    }

    #[test]
    fn display_matches_structural_text() {
        assert_eq!(Scalar::Float(3.0).to_string(), "3.0");
        assert_eq!(Scalar::Integer(-4).to_string(), "-4");
        assert_eq!(Scalar::Unsigned(u64::MAX).to_string(), "18446744073709551615");
        assert_eq!(Scalar::Unsigned(u64::MAX).to_json(), json!(u64::MAX));
        assert_eq!(Scalar::Bool(false).to_string(), "false");
        assert_eq!(Scalar::Null.to_string(), "");
        assert_eq!(Scalar::EmptyMap.to_string(), "{}");
    }

    #[test]
    fn native_excludes_strings_and_non_finite_floats() {
        assert!(Scalar::Integer(1).is_native());
        assert!(Scalar::Bool(true).is_native());
        assert!(Scalar::from(u64::MAX).is_native());
        assert!(!Scalar::Float(f64::NAN).is_native());
        assert!(!Scalar::String("1".into()).is_native());
        assert!(!Scalar::Null.is_native());
    }
}
