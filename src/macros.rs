/// Compile a literal pattern once and hand out a `&'static Regex`.
///
/// Only used with literal patterns known to be valid, so the compile step
/// cannot fail at runtime.
#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}
