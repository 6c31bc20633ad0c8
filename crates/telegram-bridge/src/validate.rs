//! Local identifier validation
//!
//! Obviously malformed identifiers are rejected here, before any credential
//! is consumed on a remote call.

/// Normalize a phone number to `+<digits>` form.
///
/// Strips spaces, dashes, dots, parentheses and a leading `+`, then requires
/// 7 to 15 digits (ITU E.164 bounds). Returns `None` for anything else.
pub fn validate_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let stripped: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')' | '+'))
        .collect();
    if stripped != digits {
        return None;
    }
    if digits.len() < 7 || digits.len() > 15 {
        return None;
    }
    Some(format!("+{digits}"))
}

/// Normalize a username to its bare lowercase form.
///
/// Accepts `@name`, `t.me/name` and `https://t.me/name` shapes. The result
/// must be 5 to 32 characters of `[a-z0-9_]` starting with a letter.
pub fn validate_username(raw: &str) -> Option<String> {
    let mut name = raw.trim();
    for prefix in ["https://t.me/", "http://t.me/", "t.me/"] {
        if let Some(rest) = name.strip_prefix(prefix) {
            name = rest;
            break;
        }
    }
    name = name.strip_prefix('@').unwrap_or(name);
    let name = name.to_lowercase();

    if name.len() < 5 || name.len() > 32 {
        return None;
    }
    if !name.chars().next().is_some_and(|c| c.is_ascii_lowercase()) {
        return None;
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return None;
    }
    Some(name)
}
