//! Account records read from the client's live configuration.

use serde::Serialize;

use crate::quirks;

/// A mail account configured in the client.
///
/// Read-only: the account list belongs to the client and is fetched fresh
/// whenever an account name is resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Account {
    /// Account name, unique within the client.
    pub name: String,
    /// Addresses the account sends as.
    pub email_addresses: Vec<String>,
    /// Whether the account is enabled.
    pub enabled: bool,
    /// Client account type (`imap`, `pop`, `iCloud`, ...).
    pub account_type: String,
    /// Incoming server host name; empty when the client does not expose one.
    pub server_name: String,
}

impl Account {
    /// Whether the account appears to be backed by Gmail, whose labels make
    /// moves out of the inbox behave differently.
    #[must_use]
    pub fn is_gmail(&self) -> bool {
        quirks::is_gmail_server(&self.server_name)
            || self.email_addresses.iter().any(|e| quirks::is_gmail_address(e))
    }
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
    fn gmail_by_server() {
        let account = Account {
            name: "Personal".into(),
            server_name: "imap.gmail.com".into(),
            ..Account::default()
        };
        assert!(account.is_gmail());
    }

    #[test]
    fn gmail_by_address() {
        let account = Account {
            name: "Personal".into(),
            email_addresses: vec!["work@example.com".into(), "me@googlemail.com".into()],
            ..Account::default()
        };
        assert!(account.is_gmail());
    }

    #[test]
    fn regular_account() {
        let account = Account {
            name: "Work".into(),
            email_addresses: vec!["me@example.com".into()],
            server_name: "mail.example.com".into(),
            ..Account::default()
        };
        assert!(!account.is_gmail());
    }
}
