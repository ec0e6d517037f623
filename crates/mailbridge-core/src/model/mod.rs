//! Domain model: accounts, mailboxes, messages and snapshot scoping.

mod account;
mod mailbox;
mod message;
mod scope;

pub use account::Account;
pub use mailbox::{MailboxNode, MailboxPath};
pub use message::{MessageBody, MessageId, MessageRecord};
pub use scope::{
    DEFAULT_LIMIT, Limit, ListQuery, MessageRef, Scope, SearchQuery, Selection, Snapshot,
    StatusChange,
};
