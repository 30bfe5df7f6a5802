use regex::Regex;

const REDACTED: &str = "[REDACTED]";

static BEARER_RE: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]+")
        .unwrap_or_else(|_| Regex::new(r"$^").expect("fallback regex compiles"))
});

static ASSIGNMENT_RE: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new(r#"(?i)\b(api[_-]?key|access[_-]?token|secret|token)(\s*[=:]\s*)["']?[^\s"'&,;]+"#)
        .unwrap_or_else(|_| Regex::new(r"$^").expect("fallback regex compiles"))
});

// OpenAI style (`sk-...`, `sk-proj-...`) and Google style (`AIza...`) keys.
static KEY_SHAPE_RE: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new(r"\b(?:sk-[A-Za-z0-9_-]{8,}|AIza[0-9A-Za-z_-]{20,})")
        .unwrap_or_else(|_| Regex::new(r"$^").expect("fallback regex compiles"))
});

/// Replaces credential-looking substrings with `[REDACTED]`.
///
/// Covers bearer tokens, `api_key=...` / `token: ...` assignments and bare
/// provider keys. Text without secrets is returned unchanged.
#[must_use]
pub fn redact_secrets(text: &str) -> String {
    let out = BEARER_RE.replace_all(text, format!("Bearer {REDACTED}").as_str());
    let out = ASSIGNMENT_RE.replace_all(&out, format!("${{1}}${{2}}{REDACTED}").as_str());
    KEY_SHAPE_RE.replace_all(&out, REDACTED).into_owned()
}
