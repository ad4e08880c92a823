//! Redaction helpers for log output and stored check details.

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

const MAX_LOG_MESSAGE_CHARS: usize = 500;

/// Mask a secret, keeping at most the first and last two characters.
///
/// Secrets of eight characters or fewer are masked entirely.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len().max(3));
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 4), tail)
}

/// Remove userinfo from a URL. Strings that are not URLs are returned as is.
pub fn redact_url_credentials(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if !url.username().is_empty() || url.password().is_some() => {
            // Both setters only fail for cannot-be-a-base URLs, which carry no userinfo
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.to_string()
        }
        _ => raw.to_string(),
    }
}

fn secret_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?i)\b(password|passwd|pwd|clave|secret|token|api[_-]?key|authorization|cookie|session(?:id)?)\b(\s*[=:]\s*)("[^"]*"|'[^']*'|[^\s&;,]+)"#,
        )
        .expect("secret pattern is valid")
    })
}

fn userinfo_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(https?://)[^/\s:@]+(?::[^/\s@]*)?@").expect("userinfo pattern is valid")
    })
}

/// Prepare arbitrary text (error messages, response snippets) for logging.
///
/// Redacts `key=value` secrets and URL userinfo, strips control characters
/// and truncates to a bounded length.
pub fn sanitize_log_message(message: &str) -> String {
    let redacted = secret_pattern().replace_all(message, "$1$2[REDACTED]");
    let redacted = userinfo_pattern().replace_all(&redacted, "$1[REDACTED]@");

    let mut cleaned: String = redacted
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(MAX_LOG_MESSAGE_CHARS)
        .collect();
    if redacted.chars().count() > MAX_LOG_MESSAGE_CHARS {
        cleaned.push_str("...");
    }
    cleaned
}
