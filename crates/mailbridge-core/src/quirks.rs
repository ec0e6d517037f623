//! Client and provider quirks.
//!
//! Gmail exposes labels as mailboxes. Moving a message out of the inbox
//! through the automation interface may leave the inbox label in place, so
//! the message shows up in both mailboxes.

/// Server name fragments identifying Gmail.
const GMAIL_SERVER_PATTERNS: &[&str] = &["gmail", "google", "googlemail"];

/// Address domains identifying Gmail.
const GMAIL_DOMAINS: &[&str] = &["@gmail.com", "@googlemail.com"];

/// Warning attached to moves in Gmail-backed accounts.
pub const GMAIL_MOVE_WARNING: &str = "Gmail uses labels instead of folders. Moving messages out of \
     the inbox through the automation interface may not remove the inbox label, so moved \
     messages can appear in both mailboxes.";

/// Detects Gmail from an incoming server host name.
#[must_use]
pub fn is_gmail_server(server_name: &str) -> bool {
    let lower = server_name.to_lowercase();
    !lower.is_empty() && GMAIL_SERVER_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Detects Gmail from an email address.
#[must_use]
pub fn is_gmail_address(email: &str) -> bool {
    let lower = email.trim().to_lowercase();
    GMAIL_DOMAINS.iter().any(|d| lower.ends_with(d))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_server_detection() {
        assert!(is_gmail_server("imap.gmail.com"));
        assert!(is_gmail_server("IMAP.GoogleMail.com"));
        assert!(!is_gmail_server("imap.fastmail.com"));
        assert!(!is_gmail_server(""));
    }

    #[test]
    fn test_address_detection() {
        assert!(is_gmail_address("someone@gmail.com"));
        assert!(is_gmail_address(" Someone@GoogleMail.com "));
        assert!(!is_gmail_address("someone@gmail.com.example.org"));
        assert!(!is_gmail_address(""));
    }
}
