//! Snapshot scoping for message identifiers.
//!
//! Identifiers are only valid relative to the mailbox they were listed from.
//! Every identifier-consuming call carries that mailbox as a [`Scope`], and
//! selections built from listed references refuse to mix scopes.

use serde::Serialize;

use super::mailbox::MailboxPath;
use super::message::{MessageId, MessageRecord};
use crate::error::{Error, Result};

/// Default page size for listing and search.
pub const DEFAULT_LIMIT: u32 = 50;

/// The (account, mailbox) pair identifiers are relative to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Scope {
    /// Account name, matched exactly.
    pub account: String,
    /// Mailbox path within the account.
    pub mailbox: MailboxPath,
}

impl Scope {
    /// Creates a scope.
    #[must_use]
    pub fn new(account: impl Into<String>, mailbox: impl Into<MailboxPath>) -> Self {
        Self {
            account: account.into(),
            mailbox: mailbox.into(),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mailbox \"{}\" of account \"{}\"", self.mailbox, self.account)
    }
}

/// An identifier together with the scope it was listed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageRef {
    /// Where the identifier is valid.
    pub scope: Scope,
    /// The identifier.
    pub id: MessageId,
}

/// Ordered identifiers to act on, all from one scope.
///
/// Order is preserved through every batch operation; duplicates are kept
/// and handled independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    scope: Scope,
    ids: Vec<MessageId>,
}

impl Selection {
    /// Selects raw identifiers the caller obtained from `scope`.
    #[must_use]
    pub fn new(scope: Scope, ids: impl IntoIterator<Item = MessageId>) -> Self {
        Self {
            scope,
            ids: ids.into_iter().collect(),
        }
    }

    /// Selects listed references, rejecting any that came from another scope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScopeMismatch`] for the first foreign reference.
    pub fn from_refs<'a>(
        scope: Scope,
        refs: impl IntoIterator<Item = &'a MessageRef>,
    ) -> Result<Self> {
        let mut ids = Vec::new();
        for r in refs {
            if r.scope != scope {
                return Err(Error::ScopeMismatch {
                    id: r.id,
                    expected: scope,
                    found: r.scope.clone(),
                });
            }
            ids.push(r.id);
        }
        Ok(Self { scope, ids })
    }

    /// Scope of the identifiers.
    #[must_use]
    pub const fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Identifiers in request order.
    #[must_use]
    pub fn ids(&self) -> &[MessageId] {
        &self.ids
    }

    /// Number of identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Messages listed from one scope at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Where the identifiers are valid.
    pub scope: Scope,
    /// Messages, most recent first.
    pub messages: Vec<MessageRecord>,
}

impl Snapshot {
    /// Scoped references to every listed message.
    #[must_use]
    pub fn refs(&self) -> Vec<MessageRef> {
        self.messages
            .iter()
            .map(|m| MessageRef {
                scope: self.scope.clone(),
                id: m.id,
            })
            .collect()
    }

    /// Selection of every listed message, in listing order.
    #[must_use]
    pub fn selection(&self) -> Selection {
        Selection::new(self.scope.clone(), self.messages.iter().map(|m| m.id))
    }
}

/// Maximum number of messages a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit(u32);

impl Limit {
    /// Validates a caller-supplied limit. Zero is allowed and yields an
    /// empty listing; negative values are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for negative or oversized values.
    pub fn new(limit: i64) -> Result<Self> {
        u32::try_from(limit)
            .map(Self)
            .map_err(|_| {
                Error::invalid(
                    "limit",
                    format!("must be between 0 and {}, got {limit}", u32::MAX),
                )
            })
    }

    /// Returns the limit.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns true for a zero limit.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Default for Limit {
    fn default() -> Self {
        Self(DEFAULT_LIMIT)
    }
}

/// Parameters for `list_messages`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Page size.
    pub limit: Limit,
    /// Matching messages to skip.
    pub offset: u32,
    /// Only unread messages.
    pub unread_only: bool,
    /// Only flagged messages.
    pub flagged_only: bool,
}

/// Parameters for `search_messages`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Sender must contain this text.
    pub sender_contains: Option<String>,
    /// Subject must contain this text.
    pub subject_contains: Option<String>,
    /// Page size.
    pub limit: Limit,
    /// Matching messages to skip.
    pub offset: u32,
}

/// Status changes for `set_messages_status`; `None` leaves a flag alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusChange {
    /// New read status.
    pub read: Option<bool>,
    /// New flagged status.
    pub flagged: Option<bool>,
}

impl StatusChange {
    /// Returns true if nothing would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.read.is_none() && self.flagged.is_none()
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

    fn inbox() -> Scope {
        Scope::new("Work", "INBOX")
    }

    mod selection_tests {
        use super::*;

        #[test]
        fn from_refs_same_scope() {
            let refs = [
                MessageRef { scope: inbox(), id: MessageId(3) },
                MessageRef { scope: inbox(), id: MessageId(1) },
            ];
            let selection = Selection::from_refs(inbox(), &refs).unwrap();
            assert_eq!(selection.ids(), &[MessageId(3), MessageId(1)]);
            assert_eq!(selection.scope(), &inbox());
        }

        #[test]
        fn from_refs_rejects_other_mailbox() {
            let archive = Scope::new("Work", "Archive");
            let refs = [
                MessageRef { scope: inbox(), id: MessageId(3) },
                MessageRef { scope: archive.clone(), id: MessageId(3) },
            ];
            match Selection::from_refs(inbox(), &refs) {
                Err(Error::ScopeMismatch { id, expected, found }) => {
                    assert_eq!(id, MessageId(3));
                    assert_eq!(expected, inbox());
                    assert_eq!(found, archive);
                }
                other => panic!("unexpected: {other:?}"),
            }
        }

        #[test]
        fn from_refs_rejects_other_account() {
            let refs = [MessageRef { scope: Scope::new("Home", "INBOX"), id: MessageId(3) }];
            assert!(Selection::from_refs(inbox(), &refs).is_err());
        }

        #[test]
        fn keeps_duplicates_and_order() {
            let selection = Selection::new(inbox(), [MessageId(9), MessageId(7), MessageId(9)]);
            assert_eq!(selection.len(), 3);
            assert_eq!(selection.ids()[2], MessageId(9));
        }
    }

    mod limit_tests {
        use super::*;

        #[test]
        fn accepts_zero_and_positive() {
            assert!(Limit::new(0).unwrap().is_zero());
            assert_eq!(Limit::new(2).unwrap().get(), 2);
        }

        #[test]
        fn rejects_negative() {
            assert!(matches!(Limit::new(-1), Err(Error::InvalidArgument { .. })));
        }

        #[test]
        fn rejects_oversized() {
            assert!(Limit::new(i64::from(u32::MAX) + 1).is_err());
        }

        #[test]
        fn default_is_fifty() {
            assert_eq!(Limit::default().get(), 50);
        }
    }

    #[test]
    fn scope_display_names_account_and_mailbox() {
        assert_eq!(
            Scope::new("Work", "Archive/2024").to_string(),
            "mailbox \"Archive/2024\" of account \"Work\""
        );
    }

    #[test]
    fn status_change_empty() {
        assert!(StatusChange::default().is_empty());
        assert!(!StatusChange { read: Some(true), flagged: None }.is_empty());
    }
}
