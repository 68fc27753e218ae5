//! URL normalization for stored hyperlinks.

use crate::config::LinkConfig;
use crate::error::LinkError;

/// Trim `input` and make sure it carries an explicit scheme.
///
/// A recognized scheme prefix (case-insensitive) is kept as typed, anything
/// else gets `config.default_scheme` prepended: `example.com` becomes
/// `https://example.com`.
///
/// # Errors
/// `InvalidInput` for an empty string, embedded whitespace, or a bare scheme
/// with nothing after it.
pub fn normalize_url(input: &str, config: &LinkConfig) -> Result<String, LinkError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(LinkError::InvalidInput("URL is empty".into()));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(LinkError::InvalidInput(format!(
            "URL `{trimmed}` contains whitespace"
        )));
    }

    let lower = trimmed.to_ascii_lowercase();
    let scheme = config
        .recognized_schemes
        .iter()
        .find(|s| lower.starts_with(&s.to_ascii_lowercase()));

    match scheme {
        Some(s) if trimmed.len() == s.len() => Err(LinkError::InvalidInput(format!(
            "URL `{trimmed}` has no address after the scheme"
        ))),
        Some(_) => Ok(trimmed.to_string()),
        None => Ok(format!("{}{}", config.default_scheme, trimmed)),
    }
}
