//! JSON-lines request handling.
//!
//! Each input line is `{"id": .., "op": "<operation>", "params": {..}}`.
//! Each response line is `{"id": .., "result": ..}` or
//! `{"id": .., "error": {"kind": .., "message": ..}}`.

use anyhow::Context;
use mailbridge_core::quirks::GMAIL_MOVE_WARNING;
use mailbridge_core::{
    Limit, ListQuery, MailboxPath, Mailer, MessageId, Scope, SearchQuery, Selection, StatusChange,
};
use mailbridge_script::Bridge;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// A request as it arrives on the wire.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Value,
    op: String,
    #[serde(default)]
    params: Value,
}

/// A typed operation request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", content = "params", rename_all = "snake_case")]
pub enum Request {
    /// List accounts.
    ListAccounts {},
    /// List an account's mailbox tree.
    ListMailboxes {
        /// Account name.
        account_name: String,
        /// Include nested mailboxes.
        #[serde(default = "enabled")]
        include_nested: bool,
    },
    /// List message summaries.
    ListMessages {
        /// Account name.
        account_name: String,
        /// Mailbox path.
        mailbox_path: String,
        /// Maximum number of messages.
        limit: Option<i64>,
        /// Messages to skip.
        #[serde(default)]
        offset: u32,
        /// Only unread messages.
        #[serde(default)]
        unread_only: bool,
        /// Only flagged messages.
        #[serde(default)]
        flagged_only: bool,
    },
    /// Search by sender and subject.
    SearchMessages {
        /// Account name.
        account_name: String,
        /// Mailbox path.
        mailbox_path: String,
        /// Sender substring.
        sender_contains: Option<String>,
        /// Subject substring.
        subject_contains: Option<String>,
        /// Maximum number of messages.
        limit: Option<i64>,
        /// Messages to skip.
        #[serde(default)]
        offset: u32,
    },
    /// Read messages with content.
    ReadMessages {
        /// Account name.
        account_name: String,
        /// Mailbox the identifiers were listed from.
        mailbox_path: String,
        /// Identifiers to read.
        message_ids: Vec<MessageId>,
        /// Maximum content characters per message.
        content_limit: Option<usize>,
    },
    /// Move messages to another mailbox.
    MoveMessages {
        /// Account name.
        account_name: String,
        /// Mailbox the identifiers were listed from.
        mailbox_path: String,
        /// Identifiers to move.
        message_ids: Vec<MessageId>,
        /// Destination mailbox path.
        destination_mailbox: String,
    },
    /// Set read and flagged status.
    SetMessagesStatus {
        /// Account name.
        account_name: String,
        /// Mailbox the identifiers were listed from.
        mailbox_path: String,
        /// Identifiers to update.
        message_ids: Vec<MessageId>,
        /// New read status.
        read_status: Option<bool>,
        /// New flagged status.
        flagged_status: Option<bool>,
    },
    /// Create a mailbox.
    CreateMailbox {
        /// Account name.
        account_name: String,
        /// Name of the new mailbox.
        mailbox_name: String,
        /// Parent mailbox path; the top level when absent.
        parent_mailbox: Option<String>,
    },
    /// Rename a mailbox.
    RenameMailbox {
        /// Account name.
        account_name: String,
        /// Mailbox to rename.
        mailbox_path: String,
        /// New name.
        new_name: String,
    },
}

const fn enabled() -> bool {
    true
}

/// A response line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Request id, echoed back.
    pub id: Value,
    /// Operation result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Failure description sent to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Error classification.
    pub kind: String,
    /// Human-readable description naming the object concerned.
    pub message: String,
}

impl ErrorBody {
    fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Routes requests to a [`Mailer`].
pub struct Dispatcher<B> {
    mailer: Mailer<B>,
    default_limit: Limit,
}

impl<B: Bridge> Dispatcher<B> {
    /// Creates a dispatcher.
    pub const fn new(mailer: Mailer<B>, default_limit: Limit) -> Self {
        Self { mailer, default_limit }
    }

    /// Answers requests from `input` until it closes. Requests are handled
    /// one at a time; blank lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only when reading or writing fails.
    pub async fn serve<R, W>(&self, input: R, mut output: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        let mut served = 0_u64;
        while let Some(line) = lines.next_line().await.context("reading request")? {
            if line.trim().is_empty() {
                continue;
            }
            let response = self.handle_line(&line).await;
            let mut out = serde_json::to_string(&response)?;
            out.push('\n');
            output.write_all(out.as_bytes()).await.context("writing response")?;
            output.flush().await?;
            served += 1;
        }
        info!(served, "input closed");
        Ok(())
    }

    /// Handles one input line.
    pub async fn handle_line(&self, line: &str) -> Response {
        let envelope: Envelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("malformed request line: {e}");
                return failure(
                    Value::Null,
                    ErrorBody::new("invalid_argument", format!("malformed request: {e}")),
                );
            }
        };

        let params = match envelope.params {
            Value::Null => Value::Object(serde_json::Map::new()),
            params => params,
        };
        let tagged = json!({ "op": envelope.op, "params": params });
        let request: Request = match serde_json::from_value(tagged) {
            Ok(request) => request,
            Err(e) => {
                return failure(
                    envelope.id,
                    ErrorBody::new("invalid_argument", format!("{}: {e}", envelope.op)),
                );
            }
        };

        debug!(op = %envelope.op, "handling request");
        match self.handle(request).await {
            Ok(result) => Response {
                id: envelope.id,
                result: Some(result),
                error: None,
            },
            Err(e) => {
                warn!(op = %envelope.op, "request failed: {e:#}");
                failure(envelope.id, classify(&e))
            }
        }
    }

    /// Executes a typed request.
    ///
    /// # Errors
    ///
    /// Returns the operation's error.
    pub async fn handle(&self, request: Request) -> anyhow::Result<Value> {
        let value = match request {
            Request::ListAccounts {} => serde_json::to_value(self.mailer.list_accounts().await?)?,
            Request::ListMailboxes {
                account_name,
                include_nested,
            } => {
                let tree = self
                    .mailer
                    .list_mailboxes(&account_name, include_nested)
                    .await?;
                serde_json::to_value(tree)?
            }
            Request::ListMessages {
                account_name,
                mailbox_path,
                limit,
                offset,
                unread_only,
                flagged_only,
            } => {
                let query = ListQuery {
                    limit: self.limit(limit)?,
                    offset,
                    unread_only,
                    flagged_only,
                };
                let snapshot = self
                    .mailer
                    .list_messages(&Scope::new(account_name, mailbox_path.as_str()), &query)
                    .await?;
                serde_json::to_value(snapshot)?
            }
            Request::SearchMessages {
                account_name,
                mailbox_path,
                sender_contains,
                subject_contains,
                limit,
                offset,
            } => {
                let query = SearchQuery {
                    sender_contains,
                    subject_contains,
                    limit: self.limit(limit)?,
                    offset,
                };
                let snapshot = self
                    .mailer
                    .search_messages(&Scope::new(account_name, mailbox_path.as_str()), &query)
                    .await?;
                serde_json::to_value(snapshot)?
            }
            Request::ReadMessages {
                account_name,
                mailbox_path,
                message_ids,
                content_limit,
            } => {
                let scope = Scope::new(account_name, mailbox_path.as_str());
                let selection = Selection::new(scope, message_ids);
                serde_json::to_value(self.mailer.read_messages(&selection, content_limit).await?)?
            }
            Request::MoveMessages {
                account_name,
                mailbox_path,
                message_ids,
                destination_mailbox,
            } => {
                let scope = Scope::new(account_name, mailbox_path.as_str());
                let selection = Selection::new(scope, message_ids);
                let outcome = self
                    .mailer
                    .move_messages(&selection, &MailboxPath::parse(&destination_mailbox))
                    .await?;
                let mut value = serde_json::to_value(&outcome)?;
                if outcome.gmail_labels {
                    value["warning"] = Value::from(GMAIL_MOVE_WARNING);
                }
                value
            }
            Request::SetMessagesStatus {
                account_name,
                mailbox_path,
                message_ids,
                read_status,
                flagged_status,
            } => {
                let scope = Scope::new(account_name, mailbox_path.as_str());
                let selection = Selection::new(scope, message_ids);
                let change = StatusChange {
                    read: read_status,
                    flagged: flagged_status,
                };
                serde_json::to_value(self.mailer.set_messages_status(&selection, change).await?)?
            }
            Request::CreateMailbox {
                account_name,
                mailbox_name,
                parent_mailbox,
            } => {
                let parent = parent_mailbox.as_deref().map(MailboxPath::parse);
                let path = self
                    .mailer
                    .create_mailbox(&account_name, &mailbox_name, parent.as_ref())
                    .await?;
                json!({ "path": path })
            }
            Request::RenameMailbox {
                account_name,
                mailbox_path,
                new_name,
            } => {
                let path = self
                    .mailer
                    .rename_mailbox(&account_name, &MailboxPath::parse(&mailbox_path), &new_name)
                    .await?;
                json!({ "path": path })
            }
        };
        Ok(value)
    }

    fn limit(&self, requested: Option<i64>) -> mailbridge_core::Result<Limit> {
        requested.map_or(Ok(self.default_limit), Limit::new)
    }
}

fn failure(id: Value, error: ErrorBody) -> Response {
    Response {
        id,
        result: None,
        error: Some(error),
    }
}

fn classify(error: &anyhow::Error) -> ErrorBody {
    let kind = error
        .downcast_ref::<mailbridge_core::Error>()
        .map_or("internal", |e| e.kind().as_str());
    ErrorBody::new(kind, error.to_string())
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
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::Mutex;

    use mailbridge_script::wire::encode_record;
    use mailbridge_script::{BridgeError, Script};

    #[derive(Default)]
    struct ScriptedBridge {
        outputs: Mutex<VecDeque<mailbridge_script::Result<String>>>,
        sent: Mutex<Vec<Script>>,
    }

    impl ScriptedBridge {
        fn with(outputs: &[&[&[&str]]]) -> Self {
            let bridge = Self::default();
            for records in outputs {
                let raw = records.iter().map(|&r| encode_record(r)).collect();
                bridge.outputs.lock().unwrap().push_back(Ok(raw));
            }
            bridge
        }
    }

    impl Bridge for ScriptedBridge {
        fn execute(
            &self,
            script: &Script,
        ) -> impl Future<Output = mailbridge_script::Result<String>> + Send {
            self.sent.lock().unwrap().push(script.clone());
            let output = self
                .outputs
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BridgeError::mismatch("no scripted output left")));
            std::future::ready(output)
        }
    }

    const WORK: &[&str] = &["Work", "true", "imap", "mail.example.com", "me@example.com"];
    const GMAIL: &[&str] = &["Personal", "true", "imap", "imap.gmail.com", "me@gmail.com"];

    fn dispatcher(outputs: &[&[&[&str]]]) -> Dispatcher<ScriptedBridge> {
        Dispatcher::new(Mailer::new(ScriptedBridge::with(outputs)), Limit::default())
    }

    #[tokio::test]
    async fn serve_answers_each_line() {
        let d = dispatcher(&[&[WORK], &[&["found"]], &[&["ok", "3"]]]);
        let input = tokio_test::io::Builder::new()
            .read(b"\n")
            .read(
                br#"{"id": 5, "op": "set_messages_status", "params": {"account_name": "Work", "mailbox_path": "INBOX", "message_ids": [3], "read_status": true}}"#,
            )
            .read(b"\n")
            .build();
        let output = tokio_test::io::Builder::new()
            .write(b"{\"id\":5,\"result\":[{\"id\":3,\"success\":null}]}\n")
            .build();
        d.serve(tokio::io::BufReader::new(input), output).await.unwrap();
    }

    mod request_tests {
        use super::*;

        #[test]
        fn parses_snake_case_ops() {
            let request: Request = serde_json::from_value(json!({
                "op": "move_messages",
                "params": {
                    "account_name": "Work",
                    "mailbox_path": "INBOX",
                    "message_ids": [7, 9],
                    "destination_mailbox": "Archive"
                }
            }))
            .unwrap();
            assert_eq!(
                request,
                Request::MoveMessages {
                    account_name: "Work".into(),
                    mailbox_path: "INBOX".into(),
                    message_ids: vec![MessageId(7), MessageId(9)],
                    destination_mailbox: "Archive".into(),
                }
            );
        }

        #[test]
        fn defaults_apply() {
            let request: Request = serde_json::from_value(json!({
                "op": "list_mailboxes",
                "params": { "account_name": "Work" }
            }))
            .unwrap();
            assert_eq!(
                request,
                Request::ListMailboxes {
                    account_name: "Work".into(),
                    include_nested: true,
                }
            );
        }
    }

    mod line_tests {
        use super::*;

        #[tokio::test]
        async fn list_accounts_without_params() {
            let d = dispatcher(&[&[WORK]]);
            let response = d.handle_line(r#"{"id": 1, "op": "list_accounts"}"#).await;
            assert_eq!(response.id, json!(1));
            let result = response.result.unwrap();
            assert_eq!(result[0]["name"], "Work");
            assert_eq!(result[0]["email_addresses"][0], "me@example.com");
        }

        #[tokio::test]
        async fn malformed_line_is_invalid_argument() {
            let d = dispatcher(&[]);
            let response = d.handle_line("{oops").await;
            assert_eq!(response.id, Value::Null);
            assert_eq!(response.error.unwrap().kind, "invalid_argument");
        }

        #[tokio::test]
        async fn unknown_op_keeps_id() {
            let d = dispatcher(&[]);
            let response = d.handle_line(r#"{"id": "a", "op": "delete_everything"}"#).await;
            assert_eq!(response.id, json!("a"));
            assert_eq!(response.error.unwrap().kind, "invalid_argument");
        }

        #[tokio::test]
        async fn negative_limit_is_invalid_argument() {
            let d = dispatcher(&[]);
            let response = d
                .handle_line(
                    r#"{"id": 2, "op": "list_messages", "params": {"account_name": "Work", "mailbox_path": "INBOX", "limit": -1}}"#,
                )
                .await;
            let error = response.error.unwrap();
            assert_eq!(error.kind, "invalid_argument");
            assert!(error.message.contains("limit"));
        }

        #[tokio::test]
        async fn missing_account_is_not_found() {
            let d = dispatcher(&[&[WORK]]);
            let response = d
                .handle_line(
                    r#"{"id": 3, "op": "list_mailboxes", "params": {"account_name": "Home"}}"#,
                )
                .await;
            let error = response.error.unwrap();
            assert_eq!(error.kind, "not_found");
            assert!(error.message.contains("Home"));
        }

        #[tokio::test]
        async fn gmail_move_carries_warning() {
            let d = dispatcher(&[&[GMAIL], &[&["found"]], &[&["found"]], &[&["ok", "4", "40"]]]);
            let response = d
                .handle_line(
                    r#"{"id": 4, "op": "move_messages", "params": {"account_name": "Personal", "mailbox_path": "INBOX", "message_ids": [4], "destination_mailbox": "Receipts"}}"#,
                )
                .await;
            let result = response.result.unwrap();
            assert_eq!(result["moved"][0]["success"], 40);
            assert_eq!(result["destination"]["mailbox"], "Receipts");
            assert_eq!(result["warning"], GMAIL_MOVE_WARNING);
        }

        #[tokio::test]
        async fn status_response_serializes() {
            let d = dispatcher(&[&[WORK], &[&["found"]], &[&["ok", "3"]]]);
            let response = d
                .handle_line(
                    r#"{"id": 5, "op": "set_messages_status", "params": {"account_name": "Work", "mailbox_path": "INBOX", "message_ids": [3], "read_status": true}}"#,
                )
                .await;
            let line = serde_json::to_string(&response).unwrap();
            assert_eq!(line, r#"{"id":5,"result":[{"id":3,"success":null}]}"#);
        }
    }
}
