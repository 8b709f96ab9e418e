//! `${VAR}` placeholders in configured values.

use regex::Regex;
use std::{env, env::VarError, sync::LazyLock};

/// Matches a `${VAR}` placeholder, capturing the trimmed variable name as `name`.
static ENV_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{\s*(?P<name>[^}]*?)\s*\}").unwrap());

/// A placeholder whose variable isn't set.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("cannot resolve `${{{var}}}` in `{input}`: {source}")]
pub struct UnresolvedEnvVarError {
    /// The value holding the placeholder.
    pub input: String,
    pub var: String,
    pub source: VarError,
}

/// Whether `value` holds at least one placeholder.
pub fn has_placeholder(value: &str) -> bool {
    ENV_PLACEHOLDER.is_match(value)
}

/// Replaces every placeholder in `input` with the value of its environment variable.
pub fn interpolate(input: &str) -> Result<String, UnresolvedEnvVarError> {
    interpolate_with(input, |var| env::var(var))
}

/// Replaces placeholders in a single pass, so substituted values are never expanded again.
fn interpolate_with(
    input: &str,
    lookup: impl Fn(&str) -> Result<String, VarError>,
) -> Result<String, UnresolvedEnvVarError> {
    let mut resolved = String::with_capacity(input.len());
    let mut rest = 0;
    for caps in ENV_PLACEHOLDER.captures_iter(input) {
        let (Some(placeholder), Some(var)) = (caps.get(0), caps.name("name")) else { continue };
        let value = lookup(var.as_str()).map_err(|source| UnresolvedEnvVarError {
            input: input.to_string(),
            var: var.as_str().to_string(),
            source,
        })?;
        resolved.push_str(&input[rest..placeholder.start()]);
        resolved.push_str(&value);
        rest = placeholder.end();
    }
    resolved.push_str(&input[rest..]);
    Ok(resolved)
}
