//! Structure-walking substitution.
//!
//! The opt-in alternative to the serialized pipeline in `substitute.rs`. Rather
//! than splicing values into JSON text, this walks the subject and runs both
//! passes over each string (and map key) on its own:
//!
//! ```text
//! "{{COUNT}}"          ──▶  3            whole token, native value
//! "{{ upper | NAME }}" ──▶  "ADA"        whole token, string value
//! "Hi {{NAME}}"        ──▶  "Hi Ada"     embedded token
//! ```
//!
//! Values are never re-parsed, so quotes or backslashes in a replacement are
//! carried through as ordinary characters and cannot corrupt the result.
//! Map keys are always substituted as text.

use super::metrics::ApplyMetrics;
use super::substitute::Substitution;
use crate::Scalar;
use serde_json::{Map, Value};

/// Substitute every string in `subject`, keeping its shape.
pub(crate) fn substitute_tree(sub: &Substitution<'_>, subject: &Value, metrics: &mut ApplyMetrics) -> Value {
    match subject {
        Value::String(s) => substitute_string(sub, s, metrics),
        Value::Array(items) => Value::Array(items.iter().map(|item| substitute_tree(sub, item, metrics)).collect()),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                let key = substitute_text(sub, key, metrics);
                let value = substitute_tree(sub, value, metrics);
                out.insert(key, value);
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Both passes run in order, as in the serialized pipeline. A native value
/// replaces the string only when it fills the string on its own, either
/// straight from the plain pass or from a modifier token the plain pass left
/// behind.
fn substitute_string(sub: &Substitution<'_>, text: &str, metrics: &mut ApplyMetrics) -> Value {
    if let Some(value) = sub.whole_plain_value(text).filter(|v| v.is_native()) {
        metrics.plain.replaced += 1;
        return value.to_json();
    }
    let text = sub.plain_pass(text, false, &mut metrics.plain);

    if let Some(value) = sub.whole_modifier_value(&text).filter(Scalar::is_native) {
        metrics.modifier.replaced += 1;
        return value.to_json();
    }
    Value::String(sub.modifier_pass(text, false, &mut metrics.modifier))
}

fn substitute_text(sub: &Substitution<'_>, text: &str, metrics: &mut ApplyMetrics) -> String {
    let text = sub.plain_pass(text, false, &mut metrics.plain);
    sub.modifier_pass(text, false, &mut metrics.modifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::delimiters::DelimiterSet;
    use crate::engine::keys::{KeyRule, standardise_source};
    use crate::engine::modifiers::ModifierRegistry;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run_with_metrics(source: Value, subject: Value) -> (Value, ApplyMetrics) {
        let delimiters = DelimiterSet::default();
        let registry = ModifierRegistry::new();
        let sub = Substitution::prepare(standardise_source(&source), &KeyRule::default(), &delimiters, &registry)
            .unwrap();
        let mut metrics = ApplyMetrics::default();
        let value = substitute_tree(&sub, &subject, &mut metrics);
        (value, metrics)
    }

    fn run(source: Value, subject: Value) -> Value {
        run_with_metrics(source, subject).0
    }

    #[test]
    fn quotes_in_values_survive() {
        let out = run(json!({"q": "say \"hi\" \\o/"}), json!({"a": "{{Q}}", "b": ["<{{Q}}>"]}));
        assert_eq!(out, json!({"a": "say \"hi\" \\o/", "b": ["<say \"hi\" \\o/>"]}));
    }

    #[test]
    fn whole_tokens_become_native() {
        let out = run(json!({"count": 3, "on": false}), json!({"n": "{{COUNT}}", "l": ["{{ON}}", "x{{ON}}"]}));
        assert_eq!(out, json!({"n": 3, "l": [false, "xfalse"]}));
    }

    #[test]
    fn keys_are_substituted_as_text() {
        let out = run(json!({"count": 3, "name": "Ada"}), json!({"{{NAME}}": "{{upper|NAME}}", "{{COUNT}}": 1}));
        assert_eq!(out, json!({"Ada": "ADA", "3": 1}));
    }

    #[test]
    fn non_string_leaves_pass_through() {
        let subject = json!({"a": 1, "b": null, "c": [true, 2.5]});
        assert_eq!(run(json!({"a": "x"}), subject.clone()), subject);
    }

    #[test]
    fn whole_and_embedded_tokens_run_both_passes() {
        let source = json!({"a": "{{upper|B}}", "b": "x", "c": "{{int|D}}", "d": "7"});
        let out = run(source, json!({"v": "{{A}}", "w": "p {{A}}", "n": "{{C}}"}));
        assert_eq!(out, json!({"v": "X", "w": "p X", "n": 7}));
    }

    #[test]
    fn whole_tokens_count_under_their_own_pass() {
        let (out, metrics) = run_with_metrics(json!({"n": 2, "s": "x"}), json!(["{{N}}", "{{upper|S}}", "{{int|N}}"]));
        assert_eq!(out, json!([2, "X", 2]));
        assert_eq!(metrics.plain.replaced, 1);
        assert_eq!(metrics.modifier.replaced, 2);
    }
}
