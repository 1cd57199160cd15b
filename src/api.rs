use crate::engine::{
    self, ApplyMetrics, ApplyReport, DEFAULT_KEY_RULE_PATTERN, DEFAULT_KEY_RULE_REPLACE, DEFAULT_LEFT, DEFAULT_MODIFIER,
    DEFAULT_RIGHT, DelimiterSet, KeyRule, ModifierRegistry, ModifierSet, ReplacementStore, Substitution,
};
use crate::{Error, Result, Scalar};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// How `apply` routes the subject through substitution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstitutionMode {
    /// Encode the whole subject as JSON text, substitute over the text, and
    /// parse it back. Values containing `"` or `\` make the call fail with
    /// [`Error::StructuralCorruption`].
    #[default]
    Serialized,
    /// Walk the subject and substitute inside each string separately.
    Tree,
}

/// Engine configuration.
///
/// Every field has a default, so partial documents are fine:
///
/// ```text
/// {"left_delimiter": "<%", "right_delimiter": "%>", "replacements": {"app": {"name": "demo"}}}
/// ```
///
/// The class map is not part of the configuration (it holds callables); use
/// [`Replacer::add_classes`] after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplacerConfig {
    /// Initial content of the persistent store (nested map or list).
    pub replacements: Value,
    pub left_delimiter: String,
    pub right_delimiter: String,
    pub modifier_delimiter: String,
    pub key_rule_pattern: String,
    pub key_rule_replace: String,
    pub mode: SubstitutionMode,
}

impl Default for ReplacerConfig {
    fn default() -> Self {
        ReplacerConfig {
            replacements: Value::Object(serde_json::Map::new()),
            left_delimiter: DEFAULT_LEFT.to_string(),
            right_delimiter: DEFAULT_RIGHT.to_string(),
            modifier_delimiter: DEFAULT_MODIFIER.to_string(),
            key_rule_pattern: DEFAULT_KEY_RULE_PATTERN.to_string(),
            key_rule_replace: DEFAULT_KEY_RULE_REPLACE.to_string(),
            mode: SubstitutionMode::default(),
        }
    }
}

impl ReplacerConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(Error::Config)
    }
}

/// A placeholder-substitution engine.
///
/// Each `Replacer` owns its store, alias table, delimiters and key rule;
/// nothing is shared between instances.
///
/// # Example
/// ```
/// use replacer::Replacer;
/// use serde_json::json;
///
/// let mut r = Replacer::new();
/// r.add_replacements(&json!({"user": {"name": "  ada ", "age": 36}}));
///
/// let out = r.apply(&json!({"who": "{{ upper,trim | USER_NAME }}", "age": "{{USER_AGE}}"}), &json!({})).unwrap();
/// assert_eq!(out, json!({"who": "ADA", "age": 36}));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Replacer {
    store: ReplacementStore,
    registry: ModifierRegistry,
    delimiters: DelimiterSet,
    key_rule: KeyRule,
    mode: SubstitutionMode,
}

impl Replacer {
    /// An engine with default delimiters (`{{`, `}}`, `|`), the default key
    /// rule and an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an engine from `config`: replacements first, then delimiters,
    /// then the key rule.
    pub fn from_config(config: &ReplacerConfig) -> Result<Self> {
        let mut replacer = Replacer::new();
        replacer
            .add_replacements(&config.replacements)
            .set_delimiters(
                Some(config.left_delimiter.as_str()),
                Some(config.right_delimiter.as_str()),
                Some(config.modifier_delimiter.as_str()),
            )?
            .set_key_rule(&config.key_rule_pattern, &config.key_rule_replace)?
            .set_mode(config.mode);
        Ok(replacer)
    }

    /// The persistent store, keyed by canonical key.
    pub fn get_replacements(&self) -> &BTreeMap<String, Scalar> {
        self.store.get()
    }

    /// Merge a nested replacement source into the persistent store.
    pub fn add_replacements(&mut self, source: &Value) -> &mut Self {
        self.store.add(source);
        self
    }

    /// Merge aliases into the modifier alias table. Later additions win.
    pub fn add_classes<I, S>(&mut self, classes: I) -> &mut Self
    where
        I: IntoIterator<Item = (S, Arc<dyn ModifierSet>)>,
        S: Into<String>,
    {
        self.registry.add_classes(classes);
        self
    }

    /// Register a global modifier function on this engine.
    pub fn register_function<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(Scalar) -> Scalar + Send + Sync + 'static,
    {
        self.registry.register_function(name, f);
        self
    }

    /// Replace the non-empty delimiters; `None` or empty strings keep the
    /// current ones.
    pub fn set_delimiters(
        &mut self,
        left: Option<&str>,
        right: Option<&str>,
        modifier: Option<&str>,
    ) -> Result<&mut Self> {
        self.delimiters.set(left, right, modifier)?;
        Ok(self)
    }

    /// Replace the key rule used to derive lookup keys.
    pub fn set_key_rule(&mut self, pattern: &str, replace: &str) -> Result<&mut Self> {
        self.key_rule = KeyRule::new(pattern, replace)?;
        Ok(self)
    }

    pub fn set_mode(&mut self, mode: SubstitutionMode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Compiled left matcher text (not the raw delimiter).
    pub fn get_left_delimiter(&self) -> &str {
        self.delimiters.left_pattern()
    }

    /// Compiled right matcher text (not the raw delimiter).
    pub fn get_right_delimiter(&self) -> &str {
        self.delimiters.right_pattern()
    }

    /// Compiled modifier-token matcher text (not the raw separator).
    pub fn get_modifier_delimiter(&self) -> &str {
        self.delimiters.modifier_pattern()
    }

    pub fn get_left_pattern(&self) -> &str {
        self.get_left_delimiter()
    }

    pub fn get_right_pattern(&self) -> &str {
        self.get_right_delimiter()
    }

    pub fn get_modifier_pattern(&self) -> &str {
        self.get_modifier_delimiter()
    }

    pub fn delimiters(&self) -> &DelimiterSet {
        &self.delimiters
    }

    pub fn key_rule(&self) -> &KeyRule {
        &self.key_rule
    }

    pub fn registry(&self) -> &ModifierRegistry {
        &self.registry
    }

    pub fn mode(&self) -> SubstitutionMode {
        self.mode
    }

    /// Substitute every resolvable placeholder in `subject`.
    ///
    /// `overrides` is merged over the persistent store for this call only;
    /// pass `&json!({})` (or any scalar) for none. The result has the same
    /// shape as `subject`. Unresolved placeholders are left as written.
    pub fn apply(&self, subject: &Value, overrides: &Value) -> Result<Value> {
        self.apply_with_metrics(subject, overrides).map(|report| report.value)
    }

    /// [`apply`](Self::apply), returning timings and token counts as well.
    pub fn apply_with_metrics(&self, subject: &Value, overrides: &Value) -> Result<ApplyReport> {
        let started = Instant::now();
        let mut metrics = ApplyMetrics::default();

        let merged = self.store.merged(overrides);
        let sub = Substitution::prepare(merged, &self.key_rule, &self.delimiters, &self.registry)?;
        metrics.lookup_keys = sub.len();
        metrics.prepare = started.elapsed();

        let value = match self.mode {
            SubstitutionMode::Serialized => sub.run_serialized(subject, &mut metrics)?,
            SubstitutionMode::Tree => engine::substitute_tree(&sub, subject, &mut metrics),
        };
        metrics.total = started.elapsed();

        tracing::debug!(
            mode = ?self.mode,
            lookup_keys = metrics.lookup_keys,
            plain = metrics.plain.replaced,
            modifier = metrics.modifier.replaced,
            unresolved = metrics.modifier.unresolved,
            "apply finished"
        );

        Ok(ApplyReport { value, metrics })
    }
}
