//! Error types for the automation bridge.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while executing a script or decoding its output.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The mail client is not running and launching it was not allowed,
    /// or the automation interface could not connect to it.
    #[error("{application} is not running: {message}")]
    NotRunning {
        /// Application the script was addressed to.
        application: String,
        /// Message reported by the automation interface.
        message: String,
    },

    /// The script did not finish in time. The client state is undefined:
    /// the script may have partially completed.
    #[error("script timed out after {0:?}; mail client state is undefined")]
    Timeout(Duration),

    /// The automation interface rejected the script or the script raised.
    #[error("script error{}: {message}", code_suffix(.code))]
    Script {
        /// AppleScript error number, when one was reported.
        code: Option<i32>,
        /// Error message without the position prefix.
        message: String,
    },

    /// Output did not match the expected wire format.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The automation interface process could not be spawned or driven.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Creates a protocol mismatch error.
    pub fn mismatch(message: impl Into<String>) -> Self {
        Self::ProtocolMismatch(message.into())
    }

    /// Returns the AppleScript error number, if any.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        match self {
            Self::Script { code, .. } => *code,
            _ => None,
        }
    }
}

#[allow(clippy::ref_option)] // Signature fixed by the thiserror field shorthand
fn code_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" ({c})")).unwrap_or_default()
}

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;
