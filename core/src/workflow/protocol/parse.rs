//! YAML bytes -> [`Protocol`]. Substitutes `${VAR}` / `${VAR:default}` before parsing.

use super::model::Protocol;
use crate::workflow::error::ConfigError;

/// Replaces every `${VAR}` / `${VAR:default}` occurrence with the environment value (or the
/// default, or an empty string if neither is present). Runs before YAML parsing so the
/// substitution is purely textual and has no knowledge of YAML structure.
pub fn interpolate_env(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let bytes = source.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(end) = source[i + 2..].find('}') {
                let inner = &source[i + 2..i + 2 + end];
                let (var, default) = match inner.split_once(':') {
                    Some((v, d)) => (v, Some(d)),
                    None => (inner, None),
                };
                let value = std::env::var(var)
                    .ok()
                    .or_else(|| default.map(|d| d.to_string()))
                    .unwrap_or_default();
                out.push_str(&value);
                i += 2 + end + 1;
                continue;
            }
        }
        // Safe: we only ever skip ASCII '$'/'{' above, so byte index stays char-aligned.
        let ch = source[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Parses YAML bytes into a [`Protocol`] after env interpolation.
///
/// `path` is only used for error messages. Unknown top-level keys are tolerated by
/// `serde_yaml`'s default behaviour (extra keys are ignored); unknown fields nested inside
/// strongly-typed blocks fail because those structs do not derive `#[serde(deny_unknown_fields)]`
/// selectively — see the `protocol` block below, which does.
pub fn parse(path: &str, bytes: &[u8]) -> Result<Protocol, ConfigError> {
    let text = String::from_utf8_lossy(bytes);
    let interpolated = interpolate_env(&text);
    serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
        path: path.to_string(),
        reason: e.to_string(),
    })
}
