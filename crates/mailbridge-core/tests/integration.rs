//! Integration tests for the mailer.
//!
//! These tests use a mock bridge that returns predefined script output and
//! captures every script sent, so no mail client is needed.

#![allow(clippy::unwrap_used, clippy::similar_names)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use proptest::prelude::*;

use mailbridge_core::{
    Error, ErrorKind, ItemError, Limit, ListQuery, Mailer, MailboxPath, MessageId, Scope,
    SearchQuery, Selection, StatusChange,
};
use mailbridge_script::wire::encode_record;
use mailbridge_script::{Bridge, BridgeError, Script, literal};

/// Mock bridge that returns predefined outputs in order.
#[derive(Default)]
struct MockBridge {
    /// Outputs to return (in order).
    responses: Mutex<VecDeque<mailbridge_script::Result<String>>>,
    /// Captured scripts sent by the mailer.
    sent: Mutex<Vec<Script>>,
}

impl MockBridge {
    fn new() -> Self {
        Self::default()
    }

    fn respond(self, records: &[Vec<String>]) -> Self {
        let raw = records.iter().map(|r| encode_record(r)).collect();
        self.responses.lock().unwrap().push_back(Ok(raw));
        self
    }

    fn fail(self, error: BridgeError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    fn sent(&self) -> Vec<Script> {
        self.sent.lock().unwrap().clone()
    }
}

impl Bridge for MockBridge {
    fn execute(
        &self,
        script: &Script,
    ) -> impl Future<Output = mailbridge_script::Result<String>> + Send {
        self.sent.lock().unwrap().push(script.clone());
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected script {}:\n{}", script.label(), script.body()));
        std::future::ready(response)
    }
}

fn rec(fields: &[&str]) -> Vec<String> {
    fields.iter().map(ToString::to_string).collect()
}

fn accounts() -> Vec<Vec<String>> {
    vec![
        rec(&["Work", "true", "imap", "mail.example.com", "me@example.com"]),
        rec(&["Personal", "true", "imap", "imap.gmail.com", "me@gmail.com"]),
    ]
}

fn found() -> Vec<Vec<String>> {
    vec![rec(&["found"])]
}

/// Summary fields: id, subject, sender, date parts, read, flagged.
fn summary(id: u64, subject: &str, day: u32, read: bool) -> Vec<String> {
    vec![
        id.to_string(),
        subject.to_string(),
        "ann@example.com".to_string(),
        "2024".to_string(),
        "3".to_string(),
        day.to_string(),
        "36000".to_string(),
        read.to_string(),
        "false".to_string(),
    ]
}

fn read_ok(id: u64, subject: &str, content: &str) -> Vec<String> {
    let mut fields = rec(&["ok", &id.to_string()]);
    fields.extend(summary(id, subject, 1, true));
    fields.extend(rec(&["1", "bob@example.com", "0", content]));
    fields
}

fn item_err(id: u64, code: i32, message: &str) -> Vec<String> {
    rec(&["err", &id.to_string(), &code.to_string(), message])
}

fn inbox() -> Scope {
    Scope::new("Work", "INBOX")
}

fn ids(raw: &[u64]) -> Vec<MessageId> {
    raw.iter().copied().map(MessageId).collect()
}

#[tokio::test]
async fn test_list_unread_with_limit() {
    let bridge = MockBridge::new().respond(&accounts()).respond(&found()).respond(&[
        summary(4, "older", 1, false),
        summary(8, "newer", 5, false),
    ]);
    let mailer = Mailer::new(bridge);

    let query = ListQuery {
        limit: Limit::new(2).unwrap(),
        unread_only: true,
        ..ListQuery::default()
    };
    let snapshot = mailer.list_messages(&inbox(), &query).await.unwrap();

    assert_eq!(snapshot.scope, inbox());
    assert_eq!(snapshot.messages.len(), 2);
    assert!(snapshot.messages.iter().all(|m| !m.is_read));
    assert_eq!(snapshot.messages[0].subject, "newer");
    assert_eq!(snapshot.messages[1].subject, "older");

    let sent = mailer.bridge().sent();
    assert_eq!(sent.len(), 3);
    assert!(sent[2].body().contains("whose read status is false"));
    assert!(sent[2].body().contains("set endIdx to 2\n"));
}

#[tokio::test]
async fn test_list_more_than_limit_is_protocol_mismatch() {
    let bridge = MockBridge::new().respond(&accounts()).respond(&found()).respond(&[
        summary(1, "a", 1, false),
        summary(2, "b", 2, false),
    ]);
    let mailer = Mailer::new(bridge);

    let query = ListQuery {
        limit: Limit::new(1).unwrap(),
        ..ListQuery::default()
    };
    let err = mailer.list_messages(&inbox(), &query).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolMismatch);
    assert!(err.to_string().contains("INBOX"));
}

#[tokio::test]
async fn test_zero_limit_lists_nothing() {
    let bridge = MockBridge::new().respond(&accounts()).respond(&found());
    let mailer = Mailer::new(bridge);

    let query = ListQuery {
        limit: Limit::new(0).unwrap(),
        ..ListQuery::default()
    };
    let snapshot = mailer.list_messages(&inbox(), &query).await.unwrap();
    assert!(snapshot.messages.is_empty());
    assert_eq!(mailer.bridge().sent().len(), 2);
}

#[tokio::test]
async fn test_zero_limit_still_resolves_mailbox() {
    let bridge = MockBridge::new()
        .respond(&accounts())
        .respond(&[rec(&["missing", "1"])]);
    let mailer = Mailer::new(bridge);

    let query = SearchQuery {
        limit: Limit::new(0).unwrap(),
        ..SearchQuery::default()
    };
    let err = mailer.search_messages(&Scope::new("Work", "Nope"), &query).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_search_filters_are_quoted() {
    let bridge = MockBridge::new()
        .respond(&accounts())
        .respond(&found())
        .respond(&[summary(5, "Invoice \"March\"", 2, true)]);
    let mailer = Mailer::new(bridge);

    let query = SearchQuery {
        sender_contains: Some("billing".into()),
        subject_contains: Some("Invoice \"March\"".into()),
        ..SearchQuery::default()
    };
    let snapshot = mailer.search_messages(&inbox(), &query).await.unwrap();
    assert_eq!(snapshot.messages[0].subject, "Invoice \"March\"");

    let body = mailer.bridge().sent()[2].body().to_string();
    assert!(body.contains(r#"sender contains "billing" and subject contains "Invoice \"March\"""#));
}

#[tokio::test]
async fn test_nested_mailbox_failure_names_segment() {
    let bridge = MockBridge::new()
        .respond(&accounts())
        .respond(&[rec(&["missing", "2"])]);
    let mailer = Mailer::new(bridge);

    let scope = Scope::new("Work", "Archive/2024/Q1");
    let err = mailer.list_messages(&scope, &ListQuery::default()).await.unwrap_err();
    match &err {
        Error::MailboxNotFound {
            account,
            segment,
            position,
            ..
        } => {
            assert_eq!(account, "Work");
            assert_eq!(segment, "2024");
            assert_eq!(*position, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("\"2024\" (segment 2)"));

    let probe = mailer.bridge().sent()[1].body().to_string();
    assert!(probe.starts_with(r#"set segs to {"Archive", "2024", "Q1"}"#));
}

#[tokio::test]
async fn test_account_match_is_exact() {
    let bridge = MockBridge::new().respond(&accounts());
    let mailer = Mailer::new(bridge);

    let err = mailer
        .list_messages(&Scope::new("work", "INBOX"), &ListQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AccountNotFound { ref account } if account == "work"));
}

#[tokio::test]
async fn test_duplicate_account_names_are_ambiguous() {
    let bridge = MockBridge::new().respond(&[
        rec(&["Work", "true", "imap", "a.example.com"]),
        rec(&["Work", "false", "imap", "b.example.com"]),
    ]);
    let mailer = Mailer::new(bridge);

    let err = mailer.list_mailboxes("Work", true).await.unwrap_err();
    assert!(matches!(err, Error::AmbiguousAccount { matches: 2, .. }));
}

#[tokio::test]
async fn test_move_with_stale_identifier() {
    let bridge = MockBridge::new()
        .respond(&accounts())
        .respond(&found())
        .respond(&found())
        .respond(&[
            rec(&["ok", "7", "107"]),
            item_err(9, -1728, "Can’t get message 1 of mailbox \"INBOX\" whose id = 9."),
        ]);
    let mailer = Mailer::new(bridge);

    let selection = Selection::new(inbox(), ids(&[7, 9]));
    let outcome = mailer
        .move_messages(&selection, &MailboxPath::parse("Archive"))
        .await
        .unwrap();

    assert_eq!(outcome.moved.len(), 2);
    assert_eq!(outcome.moved.items()[0].id, MessageId(7));
    assert_eq!(outcome.moved.items()[0].outcome, Ok(MessageId(107)));
    assert!(matches!(
        outcome.moved.items()[1].outcome,
        Err(ItemError::NotFound { .. })
    ));
    assert_eq!(outcome.destination, Scope::new("Work", "Archive"));
    assert!(!outcome.gmail_labels);

    let json = serde_json::to_value(&outcome.moved).unwrap();
    assert_eq!(json[0]["success"], 107);
    assert_eq!(json[1]["failure"]["kind"], "not_found");
}

#[tokio::test]
async fn test_move_then_read_new_identifiers() {
    let bridge = MockBridge::new()
        .respond(&accounts())
        .respond(&found())
        .respond(&found())
        .respond(&[rec(&["ok", "7", "107"]), rec(&["ok", "9", "109"])])
        .respond(&accounts())
        .respond(&found())
        .respond(&[read_ok(107, "first", "one"), read_ok(109, "second", "two")]);
    let mailer = Mailer::new(bridge);

    let outcome = mailer
        .move_messages(&Selection::new(inbox(), ids(&[7, 9])), &MailboxPath::parse("Archive"))
        .await
        .unwrap();
    let read = mailer.read_messages(&outcome.selection(), None).await.unwrap();

    assert_eq!(read.len(), 2);
    assert_eq!(read.success_count(), 2);
    assert_eq!(read.items()[0].id, MessageId(107));
    assert_eq!(read.items()[1].outcome.as_ref().unwrap().subject, "second");

    let sent = mailer.bridge().sent();
    let read_script = sent.last().unwrap().body();
    assert!(read_script.contains("set idList to {107, 109}"));
    assert!(read_script.contains(r#"set mb to mailbox "Archive" of account "Work""#));
}

#[tokio::test]
async fn test_move_to_source_is_rejected() {
    let mailer = Mailer::new(MockBridge::new());
    let err = mailer
        .move_messages(&Selection::new(inbox(), ids(&[1])), &MailboxPath::parse("/INBOX/"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(mailer.bridge().sent().is_empty());
}

#[tokio::test]
async fn test_move_in_gmail_account_reports_labels() {
    let bridge = MockBridge::new()
        .respond(&accounts())
        .respond(&found())
        .respond(&found())
        .respond(&[rec(&["moved", "3", "-1728", "moved message not found in destination"])]);
    let mailer = Mailer::new(bridge);

    let selection = Selection::new(Scope::new("Personal", "INBOX"), ids(&[3]));
    let outcome = mailer
        .move_messages(&selection, &MailboxPath::parse("[Gmail]/All Mail"))
        .await
        .unwrap();
    assert!(outcome.gmail_labels);
    assert!(matches!(
        outcome.moved.items()[0].outcome,
        Err(ItemError::Unlocated { .. })
    ));
    assert!(outcome.refs().is_empty());
}

#[tokio::test]
async fn test_set_status_is_idempotent() {
    let bridge = MockBridge::new()
        .respond(&accounts())
        .respond(&found())
        .respond(&[rec(&["ok", "3"])]);
    let mailer = Mailer::new(bridge);

    let change = StatusChange {
        read: Some(true),
        flagged: None,
    };
    let result = mailer
        .set_messages_status(&Selection::new(inbox(), ids(&[3])), change)
        .await
        .unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.items()[0].outcome, Ok(()));
    assert!(
        mailer.bridge().sent()[2]
            .body()
            .contains("set read status of msg to true")
    );
}

#[tokio::test]
async fn test_set_status_without_changes_skips_client() {
    let bridge = MockBridge::new().respond(&accounts()).respond(&found());
    let mailer = Mailer::new(bridge);

    let result = mailer
        .set_messages_status(&Selection::new(inbox(), ids(&[3, 4])), StatusChange::default())
        .await
        .unwrap();
    assert_eq!(result.success_count(), 2);
    assert_eq!(mailer.bridge().sent().len(), 2);
}

#[tokio::test]
async fn test_read_truncates_content_and_keeps_recipients() {
    let bridge = MockBridge::new()
        .respond(&accounts())
        .respond(&found())
        .respond(&[
            read_ok(5, "Report", "0123456789"),
            item_err(6, -10000, "AppleEvent handler failed."),
        ]);
    let mailer = Mailer::new(bridge);

    let result = mailer
        .read_messages(&Selection::new(inbox(), ids(&[5, 6])), Some(4))
        .await
        .unwrap();
    let message = result.items()[0].outcome.as_ref().unwrap();
    let body = message.body.as_ref().unwrap();
    assert_eq!(body.content, "0123...");
    assert!(body.truncated);
    assert_eq!(body.to, ["bob@example.com"]);
    assert!(body.cc.is_empty());
    assert!(matches!(
        result.items()[1].outcome,
        Err(ItemError::ScriptError { code: Some(-10000), .. })
    ));
}

#[tokio::test]
async fn test_wrong_echo_is_fatal() {
    let bridge = MockBridge::new()
        .respond(&accounts())
        .respond(&found())
        .respond(&[read_ok(6, "swapped", "x"), read_ok(5, "swapped", "y")]);
    let mailer = Mailer::new(bridge);

    let err = mailer
        .read_messages(&Selection::new(inbox(), ids(&[5, 6])), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolMismatch);
}

#[tokio::test]
async fn test_bridge_errors_name_their_target() {
    let mailer = Mailer::new(MockBridge::new().fail(BridgeError::NotRunning {
        application: "Mail".into(),
        message: "Mail got an error: Application isn’t running.".into(),
    }));
    let err = mailer.list_accounts().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotRunning);
    assert!(err.to_string().starts_with("account list"));

    let mailer = Mailer::new(
        MockBridge::new()
            .respond(&accounts())
            .respond(&found())
            .fail(BridgeError::Timeout(Duration::from_secs(120))),
    );
    let err = mailer
        .read_messages(&Selection::new(inbox(), ids(&[1])), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.to_string().contains("INBOX"));
}

#[tokio::test]
async fn test_mailbox_name_round_trip() {
    let name = "Q\"1\u{1f}\u{1e}\u{10}\\ end";
    let bridge = MockBridge::new()
        .respond(&accounts())
        .respond(&[rec(&["created"])])
        .respond(&accounts())
        .respond(&[rec(&["3", "0", name])])
        .respond(&accounts())
        .respond(&found())
        .respond(&[]);
    let mailer = Mailer::new(bridge);

    let created = mailer.create_mailbox("Work", name, None).await.unwrap();
    assert_eq!(created.segments(), [name]);

    let tree = mailer.list_mailboxes("Work", false).await.unwrap();
    assert_eq!(tree[0].name, name);
    assert_eq!(tree[0].path, created);

    let scope = Scope::new("Work", tree[0].path.clone());
    mailer.list_messages(&scope, &ListQuery::default()).await.unwrap();

    let sent = mailer.bridge().sent();
    let quoted = literal::string(name);
    assert!(sent[1].body().contains(&format!("{{name:{quoted}}} at account \"Work\"")));
    assert!(sent[5].body().starts_with(&format!("set segs to {{{quoted}}}")));
    assert!(sent[6].body().contains(&format!("set mb to mailbox {quoted} of account \"Work\"")));
}

#[tokio::test]
async fn test_create_and_rename_validate_names() {
    let mailer = Mailer::new(MockBridge::new());
    assert!(matches!(
        mailer.create_mailbox("Work", "a/b", None).await,
        Err(Error::InvalidArgument { .. })
    ));
    assert!(matches!(
        mailer.create_mailbox("Work", " ", Some(&MailboxPath::parse("Archive"))).await,
        Err(Error::InvalidArgument { .. })
    ));
    assert!(matches!(
        mailer.rename_mailbox("Work", &MailboxPath::root(), "x").await,
        Err(Error::InvalidArgument { .. })
    ));
    assert!(matches!(
        mailer.rename_mailbox("Work", &MailboxPath::parse("Archive"), "2024/Q1").await,
        Err(Error::InvalidArgument { .. })
    ));
    assert!(mailer.bridge().sent().is_empty());
}

#[tokio::test]
async fn test_listed_path_with_delimiter_resolves_to_same_mailbox() {
    let bridge = MockBridge::new()
        .respond(&accounts())
        .respond(&[rec(&["3", "0", "Clients/Acme"])])
        .respond(&accounts())
        .respond(&found())
        .respond(&[summary(1, "kickoff", 2, false)]);
    let mailer = Mailer::new(bridge);

    let tree = mailer.list_mailboxes("Work", false).await.unwrap();
    let json = serde_json::to_value(&tree[0]).unwrap();
    assert_eq!(json["path"], r"Clients\/Acme");

    let path: MailboxPath = serde_json::from_value(json["path"].clone()).unwrap();
    assert_eq!(path, tree[0].path);

    let snapshot = mailer
        .list_messages(&Scope::new("Work", path), &ListQuery::default())
        .await
        .unwrap();
    assert_eq!(snapshot.scope.mailbox.segments(), ["Clients/Acme"]);

    let sent = mailer.bridge().sent();
    assert!(sent[3].body().starts_with(r#"set segs to {"Clients/Acme"}"#));
    assert!(sent[4].body().contains(r#"set mb to mailbox "Clients/Acme" of account "Work""#));
}

#[tokio::test]
async fn test_undated_messages_list_last() {
    let mut draft = summary(3, "draft", 1, true);
    draft[3..7].fill(String::new());
    let bridge = MockBridge::new().respond(&accounts()).respond(&found()).respond(&[
        draft,
        summary(4, "older", 1, false),
        summary(8, "newer", 5, false),
    ]);
    let mailer = Mailer::new(bridge);

    let snapshot = mailer
        .list_messages(&Scope::new("Work", "Drafts"), &ListQuery::default())
        .await
        .unwrap();
    let subjects: Vec<&str> = snapshot.messages.iter().map(|m| m.subject.as_str()).collect();
    assert_eq!(subjects, ["newer", "older", "draft"]);
    assert_eq!(snapshot.messages[2].date_received, None);
}

#[tokio::test]
async fn test_create_under_parent_and_rename() {
    let bridge = MockBridge::new()
        .respond(&accounts())
        .respond(&found())
        .respond(&[rec(&["created"])])
        .respond(&accounts())
        .respond(&found())
        .respond(&[rec(&["renamed"])]);
    let mailer = Mailer::new(bridge);

    let created = mailer
        .create_mailbox("Work", "2024", Some(&MailboxPath::parse("Archive")))
        .await
        .unwrap();
    assert_eq!(created.to_string(), "Archive/2024");

    let renamed = mailer.rename_mailbox("Work", &created, "2025").await.unwrap();
    assert_eq!(renamed.to_string(), "Archive/2025");

    let sent = mailer.bridge().sent();
    assert!(sent[2].body().contains(r#"at mailbox "Archive" of account "Work""#));
    let rename = r#"set name of mailbox "2024" of mailbox "Archive" of account "Work" to "2025""#;
    assert!(sent[5].body().contains(rename));
}

#[tokio::test]
async fn test_duplicate_mailbox_is_script_error() {
    let bridge = MockBridge::new().respond(&accounts()).fail(BridgeError::Script {
        code: Some(-10000),
        message: "Mail got an error: AppleEvent handler failed.".into(),
    });
    let mailer = Mailer::new(bridge);

    let err = mailer.create_mailbox("Work", "INBOX", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ScriptError);
    assert!(err.to_string().contains("INBOX"));
}

#[tokio::test]
async fn test_list_mailboxes_tree() {
    let bridge = MockBridge::new().respond(&accounts()).respond(&[
        rec(&["12", "3", "INBOX"]),
        rec(&["40", "0", "Archive"]),
        rec(&["20", "0", "Archive", "2024"]),
    ]);
    let mailer = Mailer::new(bridge);

    let tree = mailer.list_mailboxes("Work", true).await.unwrap();
    assert_eq!(tree.len(), 2);
    assert_eq!(tree[0].unread_count, 3);
    assert_eq!(tree[1].children[0].path.to_string(), "Archive/2024");
    assert!(mailer.bridge().sent()[1].body().contains("return my walk(acct, {}, true)"));
}

proptest! {
    #[test]
    fn prop_batch_returns_one_entry_per_identifier(
        raw_ids in proptest::collection::vec(1_u64..1000, 0..20),
        failures in proptest::collection::vec(any::<bool>(), 20),
        reported in 0_usize..=20,
    ) {
        let reported = reported.min(raw_ids.len());
        let records: Vec<Vec<String>> = raw_ids[..reported]
            .iter()
            .zip(&failures)
            .map(|(&id, &fail)| {
                if fail {
                    item_err(id, -1728, "Can’t get message.")
                } else {
                    rec(&["ok", &id.to_string()])
                }
            })
            .collect();

        let mut bridge = MockBridge::new().respond(&accounts()).respond(&found());
        if !raw_ids.is_empty() {
            bridge = bridge.respond(&records);
        }
        let mailer = Mailer::new(bridge);
        let selection = Selection::new(inbox(), ids(&raw_ids));
        let change = StatusChange { read: None, flagged: Some(true) };

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let result = runtime
            .block_on(mailer.set_messages_status(&selection, change))
            .unwrap();

        prop_assert_eq!(result.len(), raw_ids.len());
        let returned: Vec<MessageId> = result.iter().map(|item| item.id).collect();
        prop_assert_eq!(returned, ids(&raw_ids));
        for (i, item) in result.iter().enumerate() {
            if i >= reported {
                prop_assert_eq!(&item.outcome, &Err(ItemError::Dropped));
            } else if failures[i] {
                let is_not_found = matches!(item.outcome, Err(ItemError::NotFound { .. }));
                prop_assert!(is_not_found);
            } else {
                prop_assert_eq!(&item.outcome, &Ok(()));
            }
        }
    }
}
