use once_cell::sync::Lazy;
use regex::Regex;

static BEARER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bbearer\s+[^\s\x22\x27]+").expect("valid bearer regex"));
static KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(sk-|pplx-|xai-|AIza|github_pat_|ghp_)[A-Za-z0-9_\-]+")
        .expect("valid api key regex")
});
static QUERY_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([?&](?:key|api_key|apikey|token)=)[^&\s\x22\x27]+")
        .expect("valid query key regex")
});

const MAX_ERROR_LEN: usize = 2000;

/// Strips credentials from provider error text before it is logged or returned.
pub fn redact_secrets(input: &str) -> String {
    let out = BEARER_RE.replace_all(input, "Bearer [REDACTED]");
    let out = KEY_RE.replace_all(&out, "$1[REDACTED]");
    let out = QUERY_KEY_RE.replace_all(&out, "$1[REDACTED]");
    truncate(&out, MAX_ERROR_LEN)
}

/// Replaces every occurrence of a known credential, whatever its format.
pub fn scrub_literal(text: &str, secret: &str) -> String {
    let secret = secret.trim();
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, "[REDACTED]")
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max_chars).collect();
    out.push('…');
    out
}
