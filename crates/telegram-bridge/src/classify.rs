//! Classification of Telegram error messages
//!
//! Distinguishes clean "no such user" responses from flood-wait rate limits.
//! Only the latter feeds back into account state.

/// Message fragments that mean the identifier has no Telegram user behind it.
///
/// These come back for unregistered phones, unclaimed usernames, and
/// malformed identifiers the server rejects outright.
const NOT_FOUND_PATTERNS: &[&str] = &["no user", "nobody is using", "not found", "unacceptable"];

/// True if the message is a "no such user" family response.
pub fn is_not_found_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    NOT_FOUND_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Extract the wait duration from a flood-wait message.
///
/// Handles the human-readable form ("A wait of 1860 seconds is required")
/// and the raw error code form ("FLOOD_WAIT_1860"). Returns `None` when the
/// message is not a flood-wait at all.
pub fn parse_flood_wait(message: &str) -> Option<u64> {
    let lower = message.to_lowercase();

    if let Some(rest) = lower.split("a wait of ").nth(1) {
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            return digits.parse().ok();
        }
    }

    if let Some(rest) = lower.split("flood_wait_").nth(1) {
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            return digits.parse().ok();
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_no_user() {
        assert!(is_not_found_message("No user has \"+15550001111\" as phone"));
    }

    #[test]
    fn not_found_nobody_using() {
        assert!(is_not_found_message("Nobody is using this username"));
    }

    #[test]
    fn not_found_generic() {
        assert!(is_not_found_message("username not found"));
    }

    #[test]
    fn not_found_unacceptable() {
        assert!(is_not_found_message(
            "The username is unacceptable (caused by ResolveUsernameRequest)"
        ));
    }

    #[test]
    fn not_found_case_insensitive() {
        assert!(is_not_found_message("NOT FOUND"));
    }

    #[test]
    fn flood_wait_is_not_a_miss() {
        assert!(!is_not_found_message(
            "A wait of 1860 seconds is required (caused by ResolveUsernameRequest)"
        ));
    }

    #[test]
    fn empty_message_is_not_a_miss() {
        assert!(!is_not_found_message(""));
    }

    #[test]
    fn parse_flood_wait_sentence() {
        assert_eq!(
            parse_flood_wait("A wait of 1860 seconds is required (caused by ImportContactsRequest)"),
            Some(1860)
        );
    }

    #[test]
    fn parse_flood_wait_sentence_case_insensitive() {
        assert_eq!(parse_flood_wait("A WAIT OF 30 SECONDS IS REQUIRED"), Some(30));
    }

    #[test]
    fn parse_flood_wait_error_code() {
        assert_eq!(parse_flood_wait("FLOOD_WAIT_420"), Some(420));
    }

    #[test]
    fn parse_flood_wait_non_flood_message() {
        assert_eq!(parse_flood_wait("No user has this phone"), None);
    }

    #[test]
    fn parse_flood_wait_missing_number() {
        assert_eq!(parse_flood_wait("A wait of some seconds is required"), None);
    }

    #[test]
    fn parse_flood_wait_empty() {
        assert_eq!(parse_flood_wait(""), None);
    }
}
