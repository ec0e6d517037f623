//! Error types for the core library.

use mailbridge_script::BridgeError;
use serde::Serialize;
use thiserror::Error;

use crate::model::{MailboxPath, MessageId, Scope};

/// Errors that abort a whole operation.
///
/// Every variant names the account, mailbox or identifier it concerns.
/// Failures of single items inside a batch are reported per item as
/// [`ItemError`](crate::ItemError) instead.
#[derive(Debug, Error)]
pub enum Error {
    /// No account with exactly this name exists.
    #[error("account \"{account}\" not found")]
    AccountNotFound {
        /// Requested account name.
        account: String,
    },

    /// More than one account carries this exact name.
    #[error("account name \"{account}\" is ambiguous ({matches} accounts match)")]
    AmbiguousAccount {
        /// Requested account name.
        account: String,
        /// Number of accounts with that name.
        matches: usize,
    },

    /// A segment of a mailbox path does not exist under its parent.
    #[error(
        "mailbox \"{path}\" not found in account \"{account}\": \"{segment}\" (segment {position}) does not exist"
    )]
    MailboxNotFound {
        /// Account searched.
        account: String,
        /// Full requested path.
        path: MailboxPath,
        /// The first segment that was missing.
        segment: String,
        /// 1-based position of that segment.
        position: usize,
    },

    /// The automation bridge failed while working on `target`.
    #[error("{target}: {source}")]
    Bridge {
        /// Account, mailbox or operation the script addressed.
        target: String,
        /// Underlying bridge failure.
        #[source]
        source: BridgeError,
    },

    /// A request parameter is unusable.
    #[error("invalid {target}: {message}")]
    InvalidArgument {
        /// Parameter or object the problem concerns.
        target: String,
        /// What is wrong with it.
        message: String,
    },

    /// An identifier was used outside the mailbox it was listed from.
    #[error("message {id} was listed from {found}, not {expected}")]
    ScopeMismatch {
        /// The misused identifier.
        id: MessageId,
        /// Scope of the operation.
        expected: Scope,
        /// Scope the identifier came from.
        found: Scope,
    },
}

impl Error {
    /// Creates an invalid argument error.
    pub fn invalid(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Wraps a bridge failure with the object it concerned.
    pub fn bridge(target: impl std::fmt::Display, source: BridgeError) -> Self {
        Self::Bridge {
            target: target.to_string(),
            source,
        }
    }

    /// Classifies the error for callers.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AccountNotFound { .. }
            | Self::AmbiguousAccount { .. }
            | Self::MailboxNotFound { .. } => ErrorKind::NotFound,
            Self::Bridge { source, .. } => match source {
                BridgeError::NotRunning { .. } => ErrorKind::NotRunning,
                BridgeError::Timeout(_) => ErrorKind::Timeout,
                BridgeError::Script { .. } => ErrorKind::ScriptError,
                BridgeError::ProtocolMismatch(_) => ErrorKind::ProtocolMismatch,
                BridgeError::Io(_) => ErrorKind::Io,
            },
            Self::InvalidArgument { .. } | Self::ScopeMismatch { .. } => ErrorKind::InvalidArgument,
        }
    }
}

/// Flat error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Account or mailbox did not resolve.
    NotFound,
    /// The mail client is not running.
    NotRunning,
    /// The script timed out; client state is undefined, re-list before retrying.
    Timeout,
    /// The client reported a failure.
    ScriptError,
    /// Output did not match the expected format. Not retryable.
    ProtocolMismatch,
    /// A parameter was rejected before reaching the client.
    InvalidArgument,
    /// The automation interface could not be started.
    Io,
}

impl ErrorKind {
    /// Returns the snake-case name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NotRunning => "not_running",
            Self::Timeout => "timeout",
            Self::ScriptError => "script_error",
            Self::ProtocolMismatch => "protocol_mismatch",
            Self::InvalidArgument => "invalid_argument",
            Self::Io => "io",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

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
    use std::time::Duration;

    #[test]
    fn mailbox_not_found_names_segment() {
        let err = Error::MailboxNotFound {
            account: "Work".into(),
            path: MailboxPath::parse("Archive/2024/Q1"),
            segment: "2024".into(),
            position: 2,
        };
        let text = err.to_string();
        assert!(text.contains("\"2024\" (segment 2)"));
        assert!(text.contains("Archive/2024/Q1"));
        assert!(text.contains("Work"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn bridge_errors_keep_target() {
        let err = Error::bridge(
            Scope::new("Work", "INBOX"),
            BridgeError::Timeout(Duration::from_secs(120)),
        );
        assert!(err.to_string().starts_with("mailbox \"INBOX\" of account \"Work\": "));
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn kinds_cover_bridge_taxonomy() {
        let not_running = Error::bridge(
            "list_accounts",
            BridgeError::NotRunning {
                application: "Mail".into(),
                message: "Mail is not running".into(),
            },
        );
        assert_eq!(not_running.kind(), ErrorKind::NotRunning);
        assert_eq!(
            Error::bridge("x", BridgeError::mismatch("bad")).kind(),
            ErrorKind::ProtocolMismatch
        );
        assert_eq!(
            Error::bridge(
                "x",
                BridgeError::Script {
                    code: Some(-10000),
                    message: "no".into(),
                }
            )
            .kind(),
            ErrorKind::ScriptError
        );
        assert_eq!(Error::invalid("limit", "negative").kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn kind_wire_names() {
        assert_eq!(ErrorKind::ProtocolMismatch.to_string(), "protocol_mismatch");
        assert_eq!(serde_json::to_string(&ErrorKind::NotFound).unwrap(), "\"not_found\"");
    }
}
