use crate::env::Environment;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

static PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:(\$)|\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("parameter pattern is valid")
});

/// Substitute `$NAME` and `${NAME}` references in `input` with values from `env`.
///
/// Works like parameter substitution in a POSIX shell, restricted to plain names:
/// - an unset variable expands to the empty string;
/// - `$$` produces a literal `$`;
/// - a `$` that starts no valid reference is kept as is.
///
/// Substituted text is never scanned again, so values containing `$` are inert.
pub fn expand<'a>(input: &'a str, env: &Environment) -> Cow<'a, str> {
    PARAM.replace_all(input, |caps: &Captures<'_>| {
        if caps.get(1).is_some() {
            return "$".to_string();
        }
        let name = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        env.get_var(name).unwrap_or_default().to_string()
    })
}
