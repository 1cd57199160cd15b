//! Modifier resolution.
//!
//! A modifier is a named unary transform applied to a resolved value before it
//! is substituted. Names come in two forms:
//!
//! ```text
//! "upper"          ──▶ ModifierRef::GlobalFunction("upper")
//! "text::slugify"  ──▶ ModifierRef::AliasedMethod { alias: "text", method: "slugify" }
//! ```
//!
//! Global functions are looked up in the registry's own function table first,
//! then in the built-in table shared by every registry. Aliased methods are
//! looked up on the `ModifierSet` registered under the alias; if the alias or
//! the method is missing, the full name is tried as a global function.
//!
//! Resolution never fails: an unknown name resolves to the identity transform.
//!
//! ## Chains
//!
//! `{{ upper,trim | NAME }}` lists modifiers outermost first. The chain is
//! folded right to left, so `trim` runs first and `upper` receives its output:
//!
//! ```text
//! upper(trim(value))
//! ```

use crate::Scalar;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A bound value transform.
pub type Modifier = Arc<dyn Fn(Scalar) -> Scalar + Send + Sync>;

/// A target exposing modifier methods by name, registered under an alias.
pub trait ModifierSet: Send + Sync {
    /// The callable named `method`, if this set has one.
    fn method(&self, method: &str) -> Option<Modifier>;
}

/// Stock `ModifierSet`: a table of named closures.
#[derive(Clone, Default)]
pub struct ModifierTable {
    methods: HashMap<String, Modifier>,
}

impl ModifierTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `insert`.
    pub fn with<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Scalar) -> Scalar + Send + Sync + 'static,
    {
        self.insert(name, f);
        self
    }

    pub fn insert<F>(&mut self, name: &str, f: F)
    where
        F: Fn(Scalar) -> Scalar + Send + Sync + 'static,
    {
        self.methods.insert(name.to_string(), Arc::new(f));
    }
}

impl ModifierSet for ModifierTable {
    fn method(&self, method: &str) -> Option<Modifier> {
        self.methods.get(method).cloned()
    }
}

impl fmt::Debug for ModifierTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ModifierTable").field("methods", &names).finish()
    }
}

/// Parsed form of a modifier name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierRef<'n> {
    GlobalFunction(&'n str),
    AliasedMethod { alias: &'n str, method: &'n str },
}

impl<'n> ModifierRef<'n> {
    /// Split on the first `::`; names without one are global functions.
    pub fn parse(name: &'n str) -> Self {
        match name.split_once("::") {
            Some((alias, method)) => ModifierRef::AliasedMethod { alias, method },
            None => ModifierRef::GlobalFunction(name),
        }
    }
}

/// Function and alias tables used to resolve modifier names.
#[derive(Clone, Default)]
pub struct ModifierRegistry {
    functions: HashMap<String, Modifier>,
    classes: HashMap<String, Arc<dyn ModifierSet>>,
}

impl fmt::Debug for ModifierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        functions.sort_unstable();
        let mut classes: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        classes.sort_unstable();
        f.debug_struct("ModifierRegistry")
            .field("functions", &functions)
            .field("classes", &classes)
            .field("builtins", &BUILTINS.len())
            .finish()
    }
}

impl ModifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or shadow) a global function for this registry only.
    pub fn register_function<F>(&mut self, name: &str, f: F)
    where
        F: Fn(Scalar) -> Scalar + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(f));
    }

    /// Merge `classes` into the alias table. Later additions win.
    pub fn add_classes<I, S>(&mut self, classes: I)
    where
        I: IntoIterator<Item = (S, Arc<dyn ModifierSet>)>,
        S: Into<String>,
    {
        for (alias, set) in classes {
            self.classes.insert(alias.into(), set);
        }
    }

    pub fn has_class(&self, alias: &str) -> bool {
        self.classes.contains_key(alias)
    }

    /// Bind `name` to a callable, or `None` when nothing answers to it.
    pub fn resolve(&self, name: &str) -> Option<Modifier> {
        let name = name.trim();
        if let ModifierRef::AliasedMethod { alias, method } = ModifierRef::parse(name) {
            if let Some(bound) = self.classes.get(alias).and_then(|set| set.method(method)) {
                return Some(bound);
            }
        }
        self.function(name)
    }

    fn function(&self, name: &str) -> Option<Modifier> {
        if let Some(f) = self.functions.get(name) {
            return Some(f.clone());
        }
        BUILTINS.get(name).map(|&f| Arc::new(f) as Modifier)
    }

    /// Run `name` over `value`; unknown names pass the value through.
    pub fn apply(&self, name: &str, value: Scalar) -> Scalar {
        match self.resolve(name) {
            Some(f) => f(value),
            None => {
                tracing::trace!(modifier = name, "unknown modifier; value passed through");
                value
            }
        }
    }
}

/// Ordered modifier names attached to one token, as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ModifierChain<'t> {
    names: Vec<&'t str>,
}

impl<'t> ModifierChain<'t> {
    /// Split on commas, trimming names and dropping empty entries.
    pub(crate) fn parse(text: &'t str) -> Self {
        ModifierChain { names: text.split(',').map(str::trim).filter(|n| !n.is_empty()).collect() }
    }

    /// Fold `value` through the chain, right-most modifier first.
    pub(crate) fn run(&self, registry: &ModifierRegistry, value: Scalar) -> Scalar {
        self.names.iter().rev().fold(value, |acc, name| registry.apply(name, acc))
    }
}

// --- Built-in functions -------------------------------------------------------

static BUILTINS: Lazy<HashMap<&'static str, fn(Scalar) -> Scalar>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, fn(Scalar) -> Scalar> = HashMap::new();
    m.insert("upper", |v| map_text(v, |s| s.to_uppercase()));
    m.insert("lower", |v| map_text(v, |s| s.to_lowercase()));
    m.insert("trim", |v| map_text(v, |s| s.trim().to_string()));
    m.insert("ltrim", |v| map_text(v, |s| s.trim_start().to_string()));
    m.insert("rtrim", |v| map_text(v, |s| s.trim_end().to_string()));
    m.insert("ucfirst", |v| map_text(v, |s| first_char(s, char::to_uppercase)));
    m.insert("lcfirst", |v| map_text(v, |s| first_char(s, char::to_lowercase)));
    m.insert("ucwords", |v| map_text(v, ucwords));
    m.insert("reverse", |v| map_text(v, |s| s.chars().rev().collect()));
    m.insert("length", length);
    m.insert("int", to_int);
    m.insert("float", to_float);
    m.insert("bool", |v| Scalar::Bool(truthy(&v)));
    m.insert("string", |v| Scalar::String(v.to_string()));
    m.insert("abs", |v| map_number(v, i64::wrapping_abs, f64::abs));
    m.insert("round", |v| map_number(v, |i| i, f64::round));
    m.insert("ceil", |v| map_number(v, |i| i, f64::ceil));
    m.insert("floor", |v| map_number(v, |i| i, f64::floor));
    m
});

fn map_text(value: Scalar, f: impl FnOnce(&str) -> String) -> Scalar {
    match value {
        Scalar::String(s) => Scalar::String(f(&s)),
        other => other,
    }
}

fn map_number(value: Scalar, int: fn(i64) -> i64, float: fn(f64) -> f64) -> Scalar {
    match value {
        Scalar::Integer(i) => Scalar::Integer(int(i)),
        Scalar::Float(f) => Scalar::Float(float(f)),
        other => other,
    }
}

fn first_char<I: Iterator<Item = char>>(s: &str, case: fn(char) -> I) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => case(c).chain(chars).collect(),
        None => String::new(),
    }
}

fn ucwords(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && !c.is_whitespace() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    out
}

fn length(value: Scalar) -> Scalar {
    match value {
        Scalar::String(s) => Scalar::Integer(s.chars().count() as i64),
        Scalar::EmptyList | Scalar::EmptyMap | Scalar::Null => Scalar::Integer(0),
        other => other,
    }
}

fn to_int(value: Scalar) -> Scalar {
    let i = match value {
        Scalar::Integer(_) | Scalar::Unsigned(_) => return value,
        Scalar::Float(f) => f.trunc() as i64,
        Scalar::Bool(b) => i64::from(b),
        Scalar::String(s) => {
            let s = s.trim();
            if let Ok(u) = s.parse::<u64>() {
                return Scalar::from(u);
            }
            s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64)).unwrap_or(0)
        }
        Scalar::Null | Scalar::EmptyList | Scalar::EmptyMap => 0,
    };
    Scalar::Integer(i)
}

fn to_float(value: Scalar) -> Scalar {
    let f = match value {
        Scalar::Integer(i) => i as f64,
        Scalar::Unsigned(u) => u as f64,
        Scalar::Float(f) => f,
        Scalar::Bool(b) => f64::from(u8::from(b)),
        Scalar::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Scalar::Null | Scalar::EmptyList | Scalar::EmptyMap => 0.0,
    };
    Scalar::Float(f)
}

fn truthy(value: &Scalar) -> bool {
    match value {
        Scalar::Null | Scalar::EmptyList | Scalar::EmptyMap => false,
        Scalar::Bool(b) => *b,
        Scalar::Integer(i) => *i != 0,
        Scalar::Unsigned(u) => *u != 0,
        Scalar::Float(f) => *f != 0.0,
        Scalar::String(s) => !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")),
    }
}
