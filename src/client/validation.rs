//! URL normalization and validation at the submission boundary.

use crate::{Error, ErrorContext, Result};
use url::Url;

/// Normalize user input into an absolute `http(s)` URL.
///
/// Input without a scheme gets `https://` prepended. The returned string is the
/// normalized input itself (not the re-serialized [`Url`]), so `example.com` becomes
/// `https://example.com` without a trailing slash.
pub fn normalize_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("URL must not be empty", raw));
    }

    let candidate = if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&candidate).map_err(|e| invalid(e.to_string(), raw))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{}'", other), raw)),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("URL has no host", raw));
    }
    Ok(candidate)
}

/// `scheme://` prefix per RFC 3986: a letter followed by letters, digits, `+`, `-`, `.`.
fn has_scheme(input: &str) -> bool {
    let Some((scheme, _)) = input.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn invalid(msg: impl Into<String>, raw: &str) -> Error {
    Error::validation_with_context(
        msg,
        ErrorContext::new()
            .with_field_path("url")
            .with_details(raw.to_string())
            .with_source("normalize_url"),
    )
}
