//! Substitution passes.
//!
//! This module is the operational core of the engine. A call runs as:
//!
//! ```text
//! (0) prepare     -> merge overrides, derive lookup keys, compile plain matcher
//! (1) encode      -> subject as compact JSON (scalars wrapped in a 1-item list)
//! (2) plain pass  -> one simultaneous substitution of every `{{ KEY }}`
//! (3) modifier    -> each distinct `{{ mods | KEY }}` resolved once
//! (4) decode      -> parse the text back, unwrap if wrapped
//! ```
//!
//! Routing through JSON text lets one substitution path cover arbitrarily nested
//! subjects, at the cost that values are inserted raw: a value carrying an
//! unescaped `"` or `\` breaks the text and step (4) reports
//! [`Error::StructuralCorruption`]. `tree.rs` offers a mode without that hazard.
//!
//! ## Native scalars
//!
//! When a token with a boolean, integer or finite float value fills a whole
//! JSON string that sits in a value slot (after `:`, `[` or `,`, and followed
//! by `,`, `]` or `}`), the surrounding quotes are dropped so the value
//! decodes as the scalar itself:
//!
//! ```text
//! {"n":"{{COUNT}}"}   ──▶  {"n":3}
//! {"n":"x{{COUNT}}"}  ──▶  {"n":"x3"}
//! {"{{COUNT}}":1}     ──▶  {"3":1}      (keys stay strings)
//! ```

use super::delimiters::DelimiterSet;
use super::keys::KeyRule;
use super::metrics::{ApplyMetrics, PassMetrics};
use super::modifiers::{ModifierChain, ModifierRegistry};
use crate::{Error, Result, Scalar, Token};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

/// Matchers and values prepared for one `apply` call.
///
/// `lookup_keys[i]` and `values[i]` are aligned with capture group `i + 1`
/// of `plain`.
pub(crate) struct Substitution<'e> {
    delimiters: &'e DelimiterSet,
    registry: &'e ModifierRegistry,
    plain: Option<Regex>,
    lookup_keys: Vec<String>,
    values: Vec<Scalar>,
    by_key: HashMap<String, usize>,
}

impl<'e> Substitution<'e> {
    /// Derive lookup keys from `merged` (canonical key -> value) and compile
    /// the plain matcher. Canonical keys that share a lookup key collapse to
    /// the last one in key order.
    pub(crate) fn prepare(
        merged: BTreeMap<String, Scalar>,
        key_rule: &KeyRule,
        delimiters: &'e DelimiterSet,
        registry: &'e ModifierRegistry,
    ) -> Result<Self> {
        let mut by_lookup: BTreeMap<String, Scalar> = BTreeMap::new();
        for (canonical, value) in merged {
            by_lookup.insert(key_rule.lookup_key(&canonical), value);
        }

        let (lookup_keys, values): (Vec<String>, Vec<Scalar>) = by_lookup.into_iter().unzip();
        let by_key = lookup_keys.iter().enumerate().map(|(i, k)| (k.clone(), i)).collect();
        let plain = delimiters.compile_plain(&lookup_keys)?;

        Ok(Substitution { delimiters, registry, plain, lookup_keys, values, by_key })
    }

    pub(crate) fn len(&self) -> usize {
        self.lookup_keys.len()
    }

    /// Value stored under an exact lookup key.
    pub(crate) fn value(&self, lookup_key: &str) -> Option<&Scalar> {
        self.by_key.get(lookup_key).map(|&i| &self.values[i])
    }

    /// Run the serialized pipeline over `subject`.
    pub(crate) fn run_serialized(&self, subject: &Value, metrics: &mut ApplyMetrics) -> Result<Value> {
        let started = Instant::now();
        let wrapped = !matches!(subject, Value::Array(_) | Value::Object(_));
        let encoded =
            (if wrapped { serde_json::to_string(&[subject]) } else { serde_json::to_string(subject) })
                .map_err(Error::Encode)?;
        metrics.encode = started.elapsed();

        let content = self.plain_pass(&encoded, true, &mut metrics.plain);
        let content = self.modifier_pass(content, true, &mut metrics.modifier);

        let started = Instant::now();
        let decoded: Value = match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(source) => return Err(Error::StructuralCorruption { source, content }),
        };
        metrics.decode = started.elapsed();

        if !wrapped {
            return Ok(decoded);
        }
        match decoded {
            Value::Array(mut items) if items.len() == 1 => Ok(items.remove(0)),
            other => Err(Error::ShapeMismatch { found: describe(&other) }),
        }
    }

    /// Replace every plain token in `text` with the raw text of its value.
    ///
    /// With `slot_typing`, `text` is treated as JSON and native values filling
    /// a whole value-slot string are spliced in unquoted.
    pub(crate) fn plain_pass(&self, text: &str, slot_typing: bool, metrics: &mut PassMetrics) -> String {
        let started = Instant::now();
        let Some(re) = &self.plain else {
            return text.to_string();
        };

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in re.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(idx) = (1..caps.len()).find(|&i| caps.get(i).is_some()) else { continue };
            let token = Token::Plain { text: whole.as_str(), lookup_key: &self.lookup_keys[idx - 1] };
            let value = &self.values[idx - 1];

            if slot_typing && value.is_native() && in_value_slot(text, whole.start(), whole.end()) {
                out.push_str(&text[last..whole.start() - 1]);
                out.push_str(&value.to_string());
                last = whole.end() + 1;
            } else {
                out.push_str(&text[last..whole.start()]);
                out.push_str(&value.to_string());
                last = whole.end();
            }
            tracing::trace!(token = token.text(), key = token.key(), %value, "plain token replaced");
            metrics.replaced += 1;
        }
        out.push_str(&text[last..]);

        metrics.duration += started.elapsed();
        out
    }

    /// Resolve every distinct modifier token in `text`.
    ///
    /// Tokens whose key is not an exact lookup key stay in place. With
    /// `slot_typing`, native results filling a whole value-slot string are
    /// spliced in unquoted before the remaining occurrences are replaced.
    pub(crate) fn modifier_pass(&self, mut text: String, slot_typing: bool, metrics: &mut PassMetrics) -> String {
        let started = Instant::now();
        let found: Vec<(String, String, String)> = self
            .modifier_tokens(&text)
            .into_iter()
            .filter_map(|token| match token {
                Token::Modifier { chain, .. } => {
                    Some((token.text().to_string(), chain.to_string(), token.key().trim().to_string()))
                }
                Token::Plain { .. } => None,
            })
            .collect();

        let mut done: HashSet<String> = HashSet::new();
        for (target, chain, key) in found {
            if !done.insert(target.clone()) {
                metrics.duplicates += 1;
                continue;
            }

            let Some(value) = self.value(&key) else {
                tracing::trace!(token = %target, "no replacement for modifier token; left in place");
                metrics.unresolved += 1;
                continue;
            };

            let value = ModifierChain::parse(&chain).run(self.registry, value.clone());
            let rendered = value.to_string();
            if slot_typing && value.is_native() {
                text = splice_value_slots(&text, &target, &rendered);
            }
            text = text.replace(&target, &rendered);

            tracing::trace!(token = %target, value = %rendered, "modifier token replaced");
            metrics.replaced += 1;
        }

        metrics.duration += started.elapsed();
        text
    }

    /// All modifier tokens in `text`, in order of appearance.
    pub(crate) fn modifier_tokens<'t>(&self, text: &'t str) -> Vec<Token<'t>> {
        self.delimiters
            .modifier_matcher()
            .captures_iter(text)
            .filter_map(|caps| {
                Some(Token::Modifier {
                    text: caps.get(0)?.as_str(),
                    chain: caps.get(1)?.as_str(),
                    key: caps.get(2)?.as_str(),
                })
            })
            .collect()
    }

    /// The value of a string made of exactly one plain token.
    pub(crate) fn whole_plain_value(&self, text: &str) -> Option<&Scalar> {
        let caps = self.plain.as_ref()?.captures(text)?;
        let whole = caps.get(0)?;
        if whole.start() != 0 || whole.end() != text.len() {
            return None;
        }
        let idx = (1..caps.len()).find(|&i| caps.get(i).is_some())?;
        Some(&self.values[idx - 1])
    }

    /// The chain result of a string made of exactly one resolvable modifier
    /// token.
    pub(crate) fn whole_modifier_value(&self, text: &str) -> Option<Scalar> {
        match self.modifier_tokens(text).first() {
            Some(Token::Modifier { text: whole, chain, key }) if whole.len() == text.len() => {
                let value = self.value(key.trim())?.clone();
                Some(ModifierChain::parse(chain).run(self.registry, value))
            }
            _ => None,
        }
    }
}

/// True when `text[start..end]` is the entire content of a JSON string that
/// is an object value or list element.
///
/// Inside a JSON string every `"` is escaped, so a bare quote directly around
/// the token can only be the string's own delimiter.
fn in_value_slot(text: &str, start: usize, end: usize) -> bool {
    let bytes = text.as_bytes();
    start >= 2
        && bytes[start - 1] == b'"'
        && matches!(bytes[start - 2], b':' | b'[' | b',')
        && bytes.get(end) == Some(&b'"')
        && matches!(bytes.get(end + 1), Some(b',' | b']' | b'}'))
}

/// Replace each value-slot string consisting solely of `target` with the bare
/// `replacement`.
fn splice_value_slots(text: &str, target: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (start, _) in text.match_indices(target) {
        let end = start + target.len();
        if start > last && in_value_slot(text, start, end) {
            out.push_str(&text[last..start - 1]);
            out.push_str(replacement);
            last = end + 1;
        }
    }
    out.push_str(&text[last..]);
    out
}

fn describe(value: &Value) -> String {
    match value {
        Value::Array(items) => format!("a list of {} items", items.len()),
        Value::Object(_) => "a map".to_string(),
        Value::Null => "null".to_string(),
        _ => "a scalar".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::keys::standardise_source;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run(source: Value, subject: Value) -> Result<(Value, ApplyMetrics)> {
        let delimiters = DelimiterSet::default();
        let registry = ModifierRegistry::new();
        let sub = Substitution::prepare(standardise_source(&source), &KeyRule::default(), &delimiters, &registry)?;
        let mut metrics = ApplyMetrics::default();
        let value = sub.run_serialized(&subject, &mut metrics)?;
        Ok((value, metrics))
    }

    #[test]
    fn value_slots() {
        let text = r#"{"a":"T","b":["T","T"],"T":"xT"}"#;
        let at = |n: usize| text.match_indices('T').nth(n).map(|(i, _)| i).unwrap();
        assert!(in_value_slot(text, at(0), at(0) + 1));
        assert!(in_value_slot(text, at(1), at(1) + 1));
        assert!(in_value_slot(text, at(2), at(2) + 1));
        // map key, then embedded in a longer string
        assert!(!in_value_slot(text, at(3), at(3) + 1));
        assert!(!in_value_slot(text, at(4), at(4) + 1));
    }

    #[test]
    fn splice_only_touches_value_slots() {
        let text = r#"{"{{T}}":"{{T}}","l":["{{T}}","a{{T}}"]}"#;
        assert_eq!(splice_value_slots(text, "{{T}}", "7"), r#"{"{{T}}":7,"l":[7,"a{{T}}"]}"#);
    }

    #[test]
    fn plain_tokens_keep_native_types() {
        let source = json!({"count": 3, "ok": true, "ratio": 0.5});
        let (value, metrics) = run(source, json!({"n": "{{COUNT}}", "l": ["{{ok}}", "{{ RATIO }}"]})).unwrap();
        assert_eq!(value, json!({"n": 3, "l": [true, 0.5]}));
        assert_eq!(metrics.plain.replaced, 3);
    }

    #[test]
    fn embedded_tokens_stay_text() {
        let (value, _) = run(json!({"count": 3}), json!({"n": "total: {{COUNT}}"})).unwrap();
        assert_eq!(value, json!({"n": "total: 3"}));
    }

    #[test]
    fn wrapped_scalar_subject() {
        let (value, _) = run(json!({"count": 3}), json!("{{COUNT}}")).unwrap();
        assert_eq!(value, json!(3));

        let (value, _) = run(json!({"name": "Ada"}), json!("Hello {{NAME}}!")).unwrap();
        assert_eq!(value, json!("Hello Ada!"));
    }

    #[test]
    fn duplicate_modifier_tokens_are_handled_once() {
        let (value, metrics) =
            run(json!({"name": " ada "}), json!(["{{ upper,trim | NAME }}", "{{ upper,trim | NAME }}"])).unwrap();
        assert_eq!(value, json!(["ADA", "ADA"]));
        assert_eq!(metrics.modifier.replaced, 1);
        assert_eq!(metrics.modifier.duplicates, 1);
    }

    #[test]
    fn modifier_token_with_native_result() {
        let (value, _) = run(json!({"n": "41"}), json!({"a": "{{int|N}}", "b": "n={{int|N}}"})).unwrap();
        assert_eq!(value, json!({"a": 41, "b": "n=41"}));
    }

    #[test]
    fn unresolved_modifier_token_stays() {
        let (value, metrics) = run(json!({}), json!({"a": "{{upper|MISSING}}"})).unwrap();
        assert_eq!(value, json!({"a": "{{upper|MISSING}}"}));
        assert_eq!(metrics.modifier.unresolved, 1);
    }

    #[test]
    fn quote_in_value_corrupts_structure() {
        let err = run(json!({"q": "say \"hi\""}), json!({"a": "{{Q}}"})).unwrap_err();
        match err {
            Error::StructuralCorruption { content, .. } => assert!(content.contains(r#""say "hi"""#)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wrapped_subject_that_grows_is_a_shape_mismatch() {
        let err = run(json!({"x": "a\",\"b"}), json!("{{X}}")).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn whole_token_detection() {
        let delimiters = DelimiterSet::default();
        let registry = ModifierRegistry::new();
        let sub = Substitution::prepare(
            standardise_source(&json!({"n": 2, "s": "x"})),
            &KeyRule::default(),
            &delimiters,
            &registry,
        )
        .unwrap();

        assert_eq!(sub.len(), 2);
        assert_eq!(sub.whole_plain_value("{{ n }}"), Some(&Scalar::Integer(2)));
        assert_eq!(sub.whole_plain_value("a {{N}}"), None);
        assert_eq!(sub.whole_plain_value("{{upper|S}}"), None);
        assert_eq!(sub.whole_modifier_value("{{upper|S}}"), Some(Scalar::from("X")));
        assert_eq!(sub.whole_modifier_value("{{upper|S}}!"), None);
        assert_eq!(sub.whole_modifier_value("{{upper|Q}}"), None);
    }
}
