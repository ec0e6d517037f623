//! The operations exposed to callers.

use mailbridge_script::Bridge;
use serde::Serialize;
use tracing::{info, warn};

use crate::batch::{BatchItem, BatchResult, reconcile};
use crate::error::{Error, Result};
use crate::model::{
    Account, ListQuery, MailboxNode, MailboxPath, MessageId, MessageRecord, MessageRef, Scope,
    SearchQuery, Selection, Snapshot, StatusChange,
};
use crate::parse;
use crate::resolver::{AccountHandle, MailboxHandle, Resolver, validate_name};
use crate::scripts::{self, SUMMARY_FIELDS};

/// Result of [`Mailer::move_messages`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveOutcome {
    /// New identifier in the destination for each requested identifier.
    pub moved: BatchResult<MessageId>,
    /// Scope the new identifiers belong to.
    pub destination: Scope,
    /// Whether the account uses Gmail labels, where a move may leave a copy
    /// under the source label.
    pub gmail_labels: bool,
}

impl MoveOutcome {
    /// References to the moved messages in the destination, in request order.
    #[must_use]
    pub fn refs(&self) -> Vec<MessageRef> {
        self.moved
            .successes()
            .map(|(_, &id)| MessageRef {
                scope: self.destination.clone(),
                id,
            })
            .collect()
    }

    /// The moved messages as a selection in the destination.
    #[must_use]
    pub fn selection(&self) -> Selection {
        Selection::new(
            self.destination.clone(),
            self.moved.successes().map(|(_, &id)| id),
        )
    }
}

/// Mail operations over one bridge.
///
/// Each call resolves its account and mailbox fresh, then issues at most one
/// script for the operation itself.
#[derive(Debug)]
pub struct Mailer<B> {
    bridge: B,
}

impl<B: Bridge> Mailer<B> {
    /// Creates a mailer over `bridge`.
    pub const fn new(bridge: B) -> Self {
        Self { bridge }
    }

    /// Returns the bridge.
    pub const fn bridge(&self) -> &B {
        &self.bridge
    }

    fn resolver(&self) -> Resolver<'_, B> {
        Resolver::new(&self.bridge)
    }

    /// Resolves a scope to a mailbox that can hold messages.
    async fn message_mailbox(&self, scope: &Scope) -> Result<(AccountHandle, MailboxHandle)> {
        if scope.mailbox.is_root() {
            return Err(Error::invalid(
                "mailbox_path",
                format!(
                    "account \"{}\" top level holds no messages; name a mailbox",
                    scope.account
                ),
            ));
        }
        let account = self.resolver().resolve_account(&scope.account).await?;
        let mailbox = self.resolver().resolve_mailbox(&account, &scope.mailbox).await?;
        Ok((account, mailbox))
    }

    /// Lists every configured account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bridge`] if the client cannot be queried.
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let accounts = self.resolver().accounts().await?;
        info!(count = accounts.len(), "listed accounts");
        Ok(accounts)
    }

    /// Lists the mailbox tree of an account.
    ///
    /// Without `include_nested` only top-level mailboxes are returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] or [`Error::Bridge`].
    pub async fn list_mailboxes(
        &self,
        account: &str,
        include_nested: bool,
    ) -> Result<Vec<MailboxNode>> {
        let account = self.resolver().resolve_account(account).await?;
        let target = format!("mailboxes of account \"{}\"", account.name());
        let records = parse::execute(
            &self.bridge,
            &scripts::mailbox_tree(account.name(), include_nested),
            &target,
        )
        .await?;
        let tree = parse::mailbox_tree(&records).map_err(|e| Error::bridge(&target, e))?;
        info!(account = account.name(), mailboxes = records.len(), "listed mailboxes");
        Ok(tree)
    }

    /// Lists message summaries, most recent first.
    ///
    /// The offset and limit select a window in the client's own listing
    /// order, and only that window is sorted by date. Ordering across pages
    /// therefore holds only when the client lists newest first, which Mail
    /// does for its default sort. Messages without a received date sort last.
    ///
    /// A zero limit returns an empty snapshot without listing.
    ///
    /// # Errors
    ///
    /// Returns resolution errors or [`Error::Bridge`].
    pub async fn list_messages(&self, scope: &Scope, query: &ListQuery) -> Result<Snapshot> {
        let (_, mailbox) = self.message_mailbox(scope).await?;
        if query.limit.is_zero() {
            return Ok(empty_snapshot(&mailbox));
        }
        self.snapshot(&mailbox, &scripts::list_messages(&mailbox, query), query.limit.get())
            .await
    }

    /// Lists summaries whose sender and subject contain the given text.
    ///
    /// # Errors
    ///
    /// Returns resolution errors or [`Error::Bridge`].
    pub async fn search_messages(&self, scope: &Scope, query: &SearchQuery) -> Result<Snapshot> {
        let (_, mailbox) = self.message_mailbox(scope).await?;
        if query.limit.is_zero() {
            return Ok(empty_snapshot(&mailbox));
        }
        self.snapshot(&mailbox, &scripts::search_messages(&mailbox, query), query.limit.get())
            .await
    }

    async fn snapshot(
        &self,
        mailbox: &MailboxHandle,
        script: &mailbridge_script::Script,
        limit: u32,
    ) -> Result<Snapshot> {
        let records = parse::execute(&self.bridge, script, mailbox).await?;
        if usize::try_from(limit).is_ok_and(|limit| records.len() > limit) {
            return Err(Error::bridge(
                mailbox,
                mailbridge_script::BridgeError::mismatch(format!(
                    "{} messages listed for a limit of {limit}",
                    records.len()
                )),
            ));
        }

        let mut messages = records
            .iter()
            .map(|r| parse::summary(r, 0))
            .collect::<mailbridge_script::Result<Vec<MessageRecord>>>()
            .map_err(|e| Error::bridge(mailbox, e))?;
        // `None` orders below every date, so undated messages end up last.
        messages.sort_by(|a, b| b.date_received.cmp(&a.date_received));

        info!(%mailbox, count = messages.len(), "listed messages");
        Ok(Snapshot {
            scope: mailbox.scope(),
            messages,
        })
    }

    /// Reads messages with recipients and content.
    ///
    /// Content longer than `content_limit` characters is cut and marked.
    ///
    /// # Errors
    ///
    /// Returns resolution errors or [`Error::Bridge`]. Individual messages
    /// that cannot be read are failures inside the result.
    pub async fn read_messages(
        &self,
        selection: &Selection,
        content_limit: Option<usize>,
    ) -> Result<BatchResult<MessageRecord>> {
        let (_, mailbox) = self.message_mailbox(selection.scope()).await?;
        if selection.is_empty() {
            return Ok(BatchResult::empty());
        }

        let records = parse::execute(
            &self.bridge,
            &scripts::read_messages(&mailbox, selection.ids()),
            &mailbox,
        )
        .await?;
        let result = reconcile(selection.ids(), &records, |r| {
            let mut message = parse::summary(r, 2)?;
            let mut body = parse::body(r, 2 + SUMMARY_FIELDS)?;
            if let Some(limit) = content_limit {
                body = body.truncate(limit);
            }
            message.body = Some(body);
            Ok(message)
        })
        .map_err(|e| Error::bridge(&mailbox, e))?;

        log_batch("read", &mailbox, &result);
        Ok(result)
    }

    /// Moves messages to `destination` in the same account.
    ///
    /// Successful items carry the identifier each message now has in the
    /// destination. Old identifiers are invalid afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when the destination is the source
    /// or the account top level, resolution errors for either mailbox, and
    /// [`Error::Bridge`].
    pub async fn move_messages(
        &self,
        selection: &Selection,
        destination: &MailboxPath,
    ) -> Result<MoveOutcome> {
        let scope = selection.scope();
        if destination.is_root() {
            return Err(Error::invalid("destination_mailbox", "must name a mailbox"));
        }
        if destination == &scope.mailbox {
            return Err(Error::invalid(
                "destination_mailbox",
                format!("\"{destination}\" is the mailbox the messages are already in"),
            ));
        }

        let (account, source) = self.message_mailbox(scope).await?;
        let target = self.resolver().resolve_mailbox(&account, destination).await?;
        let gmail_labels = account.account().is_gmail();
        if gmail_labels {
            warn!(account = account.name(), "moving messages in a Gmail account");
        }

        let moved = if selection.is_empty() {
            BatchResult::empty()
        } else {
            let records = parse::execute(
                &self.bridge,
                &scripts::move_messages(&source, &target, selection.ids()),
                &source,
            )
            .await?;
            reconcile(selection.ids(), &records, |r| {
                r.expect_len(3)?;
                r.u64(2).map(MessageId)
            })
            .map_err(|e| Error::bridge(&source, e))?
        };

        log_batch("move", &source, &moved);
        Ok(MoveOutcome {
            moved,
            destination: target.scope(),
            gmail_labels,
        })
    }

    /// Sets read and flagged status. Setting a state a message already has
    /// succeeds.
    ///
    /// With nothing to change every item succeeds without touching the client.
    ///
    /// # Errors
    ///
    /// Returns resolution errors or [`Error::Bridge`].
    pub async fn set_messages_status(
        &self,
        selection: &Selection,
        change: StatusChange,
    ) -> Result<BatchResult<()>> {
        let (_, mailbox) = self.message_mailbox(selection.scope()).await?;
        if change.is_empty() {
            return Ok(BatchResult::from_items(
                selection
                    .ids()
                    .iter()
                    .map(|&id| BatchItem { id, outcome: Ok(()) })
                    .collect(),
            ));
        }
        if selection.is_empty() {
            return Ok(BatchResult::empty());
        }

        let records = parse::execute(
            &self.bridge,
            &scripts::set_status(&mailbox, selection.ids(), change),
            &mailbox,
        )
        .await?;
        let result = reconcile(selection.ids(), &records, |_| Ok(()))
            .map_err(|e| Error::bridge(&mailbox, e))?;

        log_batch("status", &mailbox, &result);
        Ok(result)
    }

    /// Creates a mailbox and returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty name or one containing
    /// `/`, resolution errors for the parent, and [`Error::Bridge`].
    pub async fn create_mailbox(
        &self,
        account: &str,
        name: &str,
        parent: Option<&MailboxPath>,
    ) -> Result<MailboxPath> {
        validate_name("mailbox name", name)?;
        let account = self.resolver().resolve_account(account).await?;
        let created = self.resolver().create_mailbox(&account, name, parent).await?;
        info!(mailbox = %created, "created mailbox");
        Ok(created.path().clone())
    }

    /// Renames a mailbox and returns its new path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an unusable name or the root,
    /// resolution errors, and [`Error::Bridge`].
    pub async fn rename_mailbox(
        &self,
        account: &str,
        path: &MailboxPath,
        new_name: &str,
    ) -> Result<MailboxPath> {
        if path.is_root() {
            return Err(Error::invalid("mailbox_path", "the account top level cannot be renamed"));
        }
        validate_name("new_name", new_name)?;
        let account = self.resolver().resolve_account(account).await?;
        let mailbox = self.resolver().resolve_mailbox(&account, path).await?;
        let renamed = self.resolver().rename_mailbox(&mailbox, new_name).await?;
        info!(from = %mailbox, to = %renamed, "renamed mailbox");
        Ok(renamed.path().clone())
    }
}

fn empty_snapshot(mailbox: &MailboxHandle) -> Snapshot {
    Snapshot {
        scope: mailbox.scope(),
        messages: Vec::new(),
    }
}

fn log_batch<T>(operation: &str, mailbox: &MailboxHandle, result: &BatchResult<T>) {
    info!(
        %mailbox,
        requested = result.len(),
        succeeded = result.success_count(),
        failed = result.failure_count(),
        "{operation} batch finished"
    );
}
