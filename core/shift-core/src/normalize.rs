//! Placeholder-identifier normalization.
//!
//! Provisioning tools and older builds write placeholder values such as
//! `default-terminal` where a real identifier is missing. These must read as
//! absent so that no fallback chain ever treats them as a real branch,
//! terminal or organization.

const PLACEHOLDERS: &[&str] = &[
    "default-branch",
    "default-terminal",
    "default-organization",
    "default-org",
];

/// Returns the trimmed identifier, or `None` for empty and placeholder values.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if PLACEHOLDERS
        .iter()
        .any(|placeholder| trimmed.eq_ignore_ascii_case(placeholder))
    {
        return None;
    }
    Some(trimmed.to_string())
}

/// [`normalize`] lifted over an optional value.
pub fn normalize_opt(value: Option<&str>) -> Option<String> {
    value.and_then(normalize)
}
