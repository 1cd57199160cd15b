//! Delimiter compilation.
//!
//! Turns the three raw delimiter strings (left marker, right marker, modifier
//! separator) into the matchers the substitution passes run:
//!
//! ```text
//! left  "{{"  ──▶ \{\{\s*
//! right "}}"  ──▶ \s*\}\}
//!
//! plain    = left (?i:(KEY_A)|(KEY_B)|...) right
//! modifier = left ([^|}]+?) \s*\|\s* ([^}]+?) right
//!                 └ chain ┘            └ key ┘
//! ```
//!
//! Every delimiter character is escaped, so regex metacharacters in a
//! delimiter are matched literally.
//!
//! ## Invariants
//!
//! - All derived matchers are rebuilt whenever any delimiter changes, because
//!   the modifier matcher embeds the left and right matchers.
//! - An empty (or all-whitespace) delimiter argument leaves the previous
//!   delimiter in place. Delimiters are never cleared.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

pub const DEFAULT_LEFT: &str = "{{";
pub const DEFAULT_RIGHT: &str = "}}";
pub const DEFAULT_MODIFIER: &str = "|";

/// Upper bound for the compiled size of the combined plain matcher. One
/// alternative per replacement key adds up quickly for large stores.
const PLAIN_SIZE_LIMIT: usize = 64 * (1 << 20);

static STANDARD: Lazy<DelimiterSet> = Lazy::new(|| {
    DelimiterSet::compile(DEFAULT_LEFT, DEFAULT_RIGHT, DEFAULT_MODIFIER).expect("default delimiters always compile")
});

/// Raw delimiters plus the matchers derived from them.
#[derive(Debug, Clone)]
pub struct DelimiterSet {
    left: String,
    right: String,
    modifier: String,
    left_pattern: String,
    right_pattern: String,
    modifier_pattern: String,
    modifier_matcher: Regex,
}

impl Default for DelimiterSet {
    fn default() -> Self {
        STANDARD.clone()
    }
}

impl DelimiterSet {
    /// Build a delimiter set from three non-empty delimiters.
    pub fn compile(left: &str, right: &str, modifier: &str) -> Result<Self> {
        let left = left.trim().to_string();
        let right = right.trim().to_string();
        let modifier = modifier.trim().to_string();

        let left_pattern = format!(r"{}\s*", regex::escape(&left));
        let right_pattern = format!(r"\s*{}", regex::escape(&right));
        let modifier_pattern = format!(
            r"{left_pattern}([^{chain_excl}]+?)\s*{sep}\s*([^{key_excl}]+?){right_pattern}",
            chain_excl = class_escape(&format!("{modifier}{right}")),
            sep = regex::escape(&modifier),
            key_excl = class_escape(&right),
        );
        let modifier_matcher =
            Regex::new(&modifier_pattern).map_err(|source| Error::Matcher { what: "modifier", source })?;

        Ok(DelimiterSet { left, right, modifier, left_pattern, right_pattern, modifier_pattern, modifier_matcher })
    }

    /// Replace the non-empty delimiters and rebuild every matcher.
    ///
    /// `None`, `""` and whitespace-only arguments keep the current delimiter.
    pub fn set(&mut self, left: Option<&str>, right: Option<&str>, modifier: Option<&str>) -> Result<()> {
        let pick = |arg: Option<&str>, current: &str| match arg.map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => current.to_string(),
        };
        let left = pick(left, &self.left);
        let right = pick(right, &self.right);
        let modifier = pick(modifier, &self.modifier);

        if left == self.left && right == self.right && modifier == self.modifier {
            return Ok(());
        }

        *self = DelimiterSet::compile(&left, &right, &modifier)?;
        tracing::debug!(left = %self.left, right = %self.right, modifier = %self.modifier, "delimiters rebuilt");
        Ok(())
    }

    pub fn left(&self) -> &str {
        &self.left
    }

    pub fn right(&self) -> &str {
        &self.right
    }

    pub fn modifier(&self) -> &str {
        &self.modifier
    }

    /// Compiled left matcher text (escaped delimiter plus trailing `\s*`).
    pub fn left_pattern(&self) -> &str {
        &self.left_pattern
    }

    /// Compiled right matcher text (leading `\s*` plus escaped delimiter).
    pub fn right_pattern(&self) -> &str {
        &self.right_pattern
    }

    /// Compiled modifier-token matcher text.
    pub fn modifier_pattern(&self) -> &str {
        &self.modifier_pattern
    }

    pub(crate) fn modifier_matcher(&self) -> &Regex {
        &self.modifier_matcher
    }

    /// Compile one matcher covering every lookup key, so the plain pass is a
    /// single simultaneous substitution.
    ///
    /// Capture group `i + 1` corresponds to `lookup_keys[i]`. Returns `None` for
    /// an empty key list.
    pub(crate) fn compile_plain<S: AsRef<str>>(&self, lookup_keys: &[S]) -> Result<Option<Regex>> {
        if lookup_keys.is_empty() {
            return Ok(None);
        }

        let alternatives: Vec<String> =
            lookup_keys.iter().map(|k| format!("({})", regex::escape(k.as_ref()))).collect();
        let pattern = format!("{}(?i:{}){}", self.left_pattern, alternatives.join("|"), self.right_pattern);

        RegexBuilder::new(&pattern)
            .size_limit(PLAIN_SIZE_LIMIT)
            .build()
            .map(Some)
            .map_err(|source| Error::Matcher { what: "plain", source })
    }
}

/// Escape every character of `chars` for use inside a `[...]` class.
///
/// `<` and `>` are left alone because the regex syntax reserves `\<` and `\>`.
fn class_escape(chars: &str) -> String {
    let mut out = String::with_capacity(chars.len() * 2);
    for c in chars.chars() {
        if c.is_ascii_punctuation() && c != '<' && c != '>' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
