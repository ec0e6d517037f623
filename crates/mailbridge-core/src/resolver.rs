//! Account and mailbox resolution.
//!
//! Names are resolved fresh on every call. Nothing is cached: the user may
//! rename or move mailboxes between calls.

use mailbridge_script::{Bridge, literal};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{Account, MailboxPath, Scope};
use crate::{parse, scripts};

/// A resolved account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountHandle {
    account: Account,
}

impl AccountHandle {
    /// Account name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.account.name
    }

    /// The account record as listed.
    #[must_use]
    pub const fn account(&self) -> &Account {
        &self.account
    }

    /// Handle for the account's top level.
    #[must_use]
    pub fn root(&self) -> MailboxHandle {
        MailboxHandle::new(self.name(), MailboxPath::root())
    }
}

/// A mailbox whose every segment existed when it was resolved.
///
/// The root path denotes the account's top-level mailbox list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MailboxHandle {
    account: String,
    path: MailboxPath,
}

impl MailboxHandle {
    pub(crate) fn new(account: impl Into<String>, path: MailboxPath) -> Self {
        Self {
            account: account.into(),
            path,
        }
    }

    /// Account name.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Mailbox path within the account.
    #[must_use]
    pub const fn path(&self) -> &MailboxPath {
        &self.path
    }

    /// Returns true for the account's top level.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }

    /// Scope under which identifiers listed from this mailbox are valid.
    #[must_use]
    pub fn scope(&self) -> Scope {
        Scope::new(self.account.clone(), self.path.clone())
    }

    /// Script object specifier, innermost segment first:
    /// `mailbox "2024" of mailbox "Archive" of account "Work"`.
    #[must_use]
    pub fn reference(&self) -> String {
        let mut out = String::new();
        for segment in self.path.segments().iter().rev() {
            out.push_str("mailbox ");
            literal::write_string(&mut out, segment);
            out.push_str(" of ");
        }
        out.push_str("account ");
        literal::write_string(&mut out, &self.account);
        out
    }
}

impl std::fmt::Display for MailboxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mailbox \"{}\" of account \"{}\"", self.path, self.account)
    }
}

/// Resolves names into handles through a bridge.
#[derive(Debug)]
pub struct Resolver<'a, B> {
    bridge: &'a B,
}

impl<'a, B: Bridge> Resolver<'a, B> {
    /// Creates a resolver over `bridge`.
    #[must_use]
    pub const fn new(bridge: &'a B) -> Self {
        Self { bridge }
    }

    /// Lists the live account configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bridge`] if the script fails or its output is malformed.
    pub async fn accounts(&self) -> Result<Vec<Account>> {
        let records = parse::execute(self.bridge, &scripts::accounts(), "account list").await?;
        parse::accounts(&records).map_err(|e| Error::bridge("account list", e))
    }

    /// Resolves an account by exact, case-sensitive name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] when no account matches,
    /// [`Error::AmbiguousAccount`] when several do.
    pub async fn resolve_account(&self, name: &str) -> Result<AccountHandle> {
        let mut matches: Vec<Account> = self
            .accounts()
            .await?
            .into_iter()
            .filter(|a| a.name == name)
            .collect();
        match matches.len() {
            0 => Err(Error::AccountNotFound {
                account: name.to_string(),
            }),
            1 => Ok(AccountHandle {
                account: matches.remove(0),
            }),
            n => Err(Error::AmbiguousAccount {
                account: name.to_string(),
                matches: n,
            }),
        }
    }

    /// Resolves `path` one segment at a time under `account`.
    ///
    /// The root path resolves without a script.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MailboxNotFound`] naming the first missing segment.
    pub async fn resolve_mailbox(
        &self,
        account: &AccountHandle,
        path: &MailboxPath,
    ) -> Result<MailboxHandle> {
        let handle = MailboxHandle::new(account.name(), path.clone());
        if path.is_root() {
            return Ok(handle);
        }

        let script = scripts::probe_mailbox(account.name(), path.segments());
        let records = parse::execute(self.bridge, &script, &handle).await?;
        match parse::probe(&records, path.depth()).map_err(|e| Error::bridge(&handle, e))? {
            None => {
                debug!(%handle, "mailbox resolved");
                Ok(handle)
            }
            Some(position) => Err(Error::MailboxNotFound {
                account: account.name().to_string(),
                path: path.clone(),
                segment: path.segments()[position - 1].clone(),
                position,
            }),
        }
    }

    /// Creates mailbox `name` under `parent` (the top level when `None`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an unusable name, resolution
    /// errors for the parent, and [`Error::Bridge`] when the client refuses
    /// (for example a duplicate name).
    pub async fn create_mailbox(
        &self,
        account: &AccountHandle,
        name: &str,
        parent: Option<&MailboxPath>,
    ) -> Result<MailboxHandle> {
        validate_name("mailbox name", name)?;
        let parent = match parent {
            Some(path) => self.resolve_mailbox(account, path).await?,
            None => account.root(),
        };

        let created = MailboxHandle::new(account.name(), parent.path().child(name));
        let script = scripts::create_mailbox(&parent, name);
        let records = parse::execute(self.bridge, &script, &created).await?;
        parse::ack(&records, "created").map_err(|e| Error::bridge(&created, e))?;
        Ok(created)
    }

    /// Renames the mailbox behind `handle`, returning the renamed handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for the root or an unusable name,
    /// and [`Error::Bridge`] when the client refuses.
    pub async fn rename_mailbox(
        &self,
        handle: &MailboxHandle,
        new_name: &str,
    ) -> Result<MailboxHandle> {
        if handle.is_root() {
            return Err(Error::invalid("mailbox_path", "the account top level cannot be renamed"));
        }
        validate_name("new_name", new_name)?;

        let script = scripts::rename_mailbox(handle, new_name);
        let records = parse::execute(self.bridge, &script, handle).await?;
        parse::ack(&records, "renamed").map_err(|e| Error::bridge(handle, e))?;
        Ok(MailboxHandle::new(
            handle.account(),
            handle.path().parent().child(new_name),
        ))
    }
}

/// Rejects names the client would misread.
pub(crate) fn validate_name(target: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid(target, "must not be empty"));
    }
    if name.contains(MailboxPath::DELIMITER) {
        return Err(Error::invalid(
            target,
            format!("\"{name}\" must not contain '{}'", MailboxPath::DELIMITER),
        ));
    }
    Ok(())
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
    fn root_reference_is_account() {
        let handle = MailboxHandle::new("Work", MailboxPath::root());
        assert_eq!(handle.reference(), r#"account "Work""#);
    }

    #[test]
    fn nested_reference_innermost_first() {
        let handle = MailboxHandle::new("Work", MailboxPath::parse("Archive/2024/Q1"));
        assert_eq!(
            handle.reference(),
            r#"mailbox "Q1" of mailbox "2024" of mailbox "Archive" of account "Work""#
        );
    }

    #[test]
    fn reference_escapes_quotes() {
        let path = MailboxPath::from_segments(vec!["Say \"hi\"".into()]);
        let handle = MailboxHandle::new("Work", path);
        assert_eq!(handle.reference(), r#"mailbox "Say \"hi\"" of account "Work""#);
    }

    #[test]
    fn names_are_validated() {
        assert!(validate_name("mailbox name", "Projects").is_ok());
        assert!(validate_name("mailbox name", "Quote \" and \\").is_ok());
        assert!(matches!(
            validate_name("mailbox name", "  "),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(validate_name("mailbox name", "a/b").is_err());
    }

    #[test]
    fn handle_scope_matches_path() {
        let handle = MailboxHandle::new("Work", MailboxPath::parse("INBOX"));
        assert_eq!(handle.scope(), Scope::new("Work", "INBOX"));
        assert_eq!(handle.to_string(), "mailbox \"INBOX\" of account \"Work\"");
    }
}
