//! # mailbridge-core
//!
//! The addressing and batch layer between callers and a desktop mail client.
//!
//! ## Features
//!
//! - **Fresh resolution**: account names match exactly and case-sensitively;
//!   mailbox paths are walked one segment at a time and a failure names the
//!   missing segment
//! - **Scoped identifiers**: message identifiers only mean something inside
//!   the mailbox they were listed from, so every identifier-consuming call
//!   carries that [`Scope`]
//! - **One script per batch**: read, move and status changes iterate inside
//!   the client and report per-item outcomes
//! - **Failure isolation**: a stale identifier fails its own item, never the
//!   batch; results always line up with the request
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailbridge_core::{ListQuery, Mailer, Scope};
//! use mailbridge_script::{BridgeConfig, OsascriptBridge};
//!
//! let mailer = Mailer::new(OsascriptBridge::new(BridgeConfig::new()));
//! let inbox = Scope::new("Work", "INBOX");
//!
//! let snapshot = mailer
//!     .list_messages(&inbox, &ListQuery { unread_only: true, ..ListQuery::default() })
//!     .await?;
//!
//! // Move everything listed; the outcome carries the new identifiers.
//! let outcome = mailer.move_messages(&snapshot.selection(), &"Archive".into()).await?;
//! let moved = mailer.read_messages(&outcome.selection(), Some(2000)).await?;
//! for item in &moved {
//!     println!("{}: {:?}", item.id, item.outcome.as_ref().map(|m| &m.subject));
//! }
//! ```
//!
//! ## Modules
//!
//! - [`batch`]: per-item results and reconciliation
//! - [`model`]: accounts, mailboxes, messages and scoping
//! - [`quirks`]: account-specific behavior
//! - [`resolver`]: name to handle resolution

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod batch;
mod error;
pub mod model;
mod parse;
pub mod quirks;
pub mod resolver;
mod scripts;
mod service;

pub use batch::{BatchItem, BatchResult, ItemError};
pub use error::{Error, ErrorKind, Result};
pub use model::{
    Account, DEFAULT_LIMIT, Limit, ListQuery, MailboxNode, MailboxPath, MessageBody, MessageId,
    MessageRecord, MessageRef, Scope, SearchQuery, Selection, Snapshot, StatusChange,
};
pub use resolver::{AccountHandle, MailboxHandle, Resolver};
pub use service::{Mailer, MoveOutcome};
