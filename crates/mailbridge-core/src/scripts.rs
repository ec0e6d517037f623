//! AppleScript builders for every operation.
//!
//! User-supplied strings reach a script only through [`literal`]. Values
//! leave it only through `my rec(...)`, so both directions of the exchange
//! are escaped. Scripts that touch messages iterate inside the client: one
//! bridge call covers a whole listing or batch.

use std::fmt::Write;
use std::time::Duration;

use mailbridge_script::{Script, literal};

use crate::model::{ListQuery, MessageId, SearchQuery, StatusChange};
use crate::resolver::MailboxHandle;

/// Largest integer AppleScript represents without switching to reals.
const SCRIPT_INT_MAX: u64 = 536_870_911;

/// Fields produced by the `summary` handler.
pub const SUMMARY_FIELDS: usize = 9;

/// Pause before looking for a moved message in its destination again.
const MOVE_LOOKUP_DELAY: Duration = Duration::from_millis(200);

/// Pauses one move script may take while waiting for moved messages to show
/// up in the destination. The budget is shared by every item, so a whole
/// batch waits at most `MOVE_LOOKUP_DELAY * MOVE_LOOKUP_DELAYS`; items still
/// missing once it is spent are reported as moved but unlocated.
const MOVE_LOOKUP_DELAYS: u32 = 50;

/// `summary(msg)`: id, subject, sender, date parts and status flags.
///
/// Date parts are taken outside the `tell` block so they do not depend on
/// the client's date formatting. Drafts and outgoing messages have no
/// received date and report four empty date fields.
const SUMMARY_HANDLER: &str = r#"
on summary(msg)
    set d to missing value
    tell application "Mail"
        set msgId to id of msg
        set subj to subject of msg
        set sndr to sender of msg
        try
            set d to date received of msg
        end try
        set isRead to read status of msg
        set isFlagged to flagged status of msg
    end tell
    if d is missing value then
        set dateParts to {"", "", "", ""}
    else
        set dateParts to {year of d, (month of d) as integer, day of d, time of d}
    end if
    return {msgId, subj, sndr} & dateParts & {isRead, isFlagged}
end summary
"#;

/// `body(msg)`: counted to list, counted cc list, content.
const BODY_HANDLER: &str = r#"
on body(msg)
    tell application "Mail"
        set toList to address of every to recipient of msg
        set ccList to address of every cc recipient of msg
        set txt to content of msg
    end tell
    return {count of toList} & toList & {count of ccList} & ccList & {txt}
end body
"#;

fn account_reference(account: &str) -> String {
    format!("account {}", literal::string(account))
}

/// Lists every account: name, enabled, type, server, then addresses.
pub fn accounts() -> Script {
    Script::new(
        "list_accounts",
        r#"
set out to ""
tell application "Mail"
    repeat with acct in every account
        set srv to ""
        try
            set srv to server name of acct
        end try
        set fields to {name of acct, enabled of acct, (account type of acct) as text, srv}
        set out to out & my rec(fields & (email addresses of acct))
    end repeat
end tell
return out
"#,
    )
}

/// Walks `segments` under `account` one child at a time.
///
/// Emits `found`, or `missing <position>` naming the first segment (1-based)
/// that is not a child of the mailbox before it. Names compare
/// case-sensitively.
pub fn probe_mailbox(account: &str, segments: &[String]) -> Script {
    let mut body = String::from("set segs to ");
    literal::write_string_list(&mut body, segments);
    let _ = write!(
        body,
        r#"
tell application "Mail" to set current to {}
set position to 0
repeat with segRef in segs
    set position to position + 1
    set seg to contents of segRef
    set found to missing value
    tell application "Mail" to set children to every mailbox of current
    repeat with child in children
        tell application "Mail" to set childName to name of child
        considering case
            if childName is seg then set found to contents of child
        end considering
        if found is not missing value then exit repeat
    end repeat
    if found is missing value then return my rec({{"missing", position}})
    set current to found
end repeat
return my rec({{"found"}})
"#,
        account_reference(account)
    );
    Script::new("resolve_mailbox", body)
}

/// Lists mailboxes in pre-order as `total, unread, segment...` records.
pub fn mailbox_tree(account: &str, include_nested: bool) -> Script {
    let body = format!(
        r#"
on walk(container, prefix, nested)
    set out to ""
    tell application "Mail" to set children to every mailbox of container
    repeat with child in children
        tell application "Mail"
            set childName to name of child
            set total to count of messages of child
            set unread to unread count of child
        end tell
        set segs to prefix & {{childName}}
        set out to out & my rec({{total, unread}} & segs)
        if nested then set out to out & my walk(contents of child, segs, nested)
    end repeat
    return out
end walk

tell application "Mail" to set acct to {}
return my walk(acct, {{}}, {})
"#,
        account_reference(account),
        literal::boolean(include_nested)
    );
    Script::new("list_mailboxes", body).long_running()
}

/// Lists one page of summaries from `collection`, an expression evaluating
/// to a list of messages inside a `tell` block.
fn page(
    label: &'static str,
    mailbox: &MailboxHandle,
    collection: &str,
    offset: u32,
    limit: u32,
) -> Script {
    let start = (u64::from(offset) + 1).min(SCRIPT_INT_MAX);
    let end = (u64::from(offset) + u64::from(limit)).min(SCRIPT_INT_MAX);
    let body = format!(
        r#"{SUMMARY_HANDLER}
tell application "Mail"
    set mb to {mailbox}
    set msgList to ({collection})
end tell
set endIdx to {end}
if endIdx > (count of msgList) then set endIdx to count of msgList
set out to ""
repeat with i from {start} to endIdx
    set out to out & my rec(my summary(item i of msgList))
end repeat
return out
"#,
        mailbox = mailbox.reference()
    );
    Script::new(label, body).long_running()
}

/// Lists summaries with the query's status filters.
pub fn list_messages(mailbox: &MailboxHandle, query: &ListQuery) -> Script {
    let mut conditions = Vec::new();
    if query.unread_only {
        conditions.push("read status is false".to_string());
    }
    if query.flagged_only {
        conditions.push("flagged status is true".to_string());
    }
    page(
        "list_messages",
        mailbox,
        &collection(&conditions),
        query.offset,
        query.limit.get(),
    )
}

/// Lists summaries whose sender and subject contain the given text.
pub fn search_messages(mailbox: &MailboxHandle, query: &SearchQuery) -> Script {
    let mut conditions = Vec::new();
    if let Some(sender) = query.sender_contains.as_deref() {
        conditions.push(format!("sender contains {}", literal::string(sender)));
    }
    if let Some(subject) = query.subject_contains.as_deref() {
        conditions.push(format!("subject contains {}", literal::string(subject)));
    }
    page(
        "search_messages",
        mailbox,
        &collection(&conditions),
        query.offset,
        query.limit.get(),
    )
}

fn collection(conditions: &[String]) -> String {
    if conditions.is_empty() {
        "every message of mb".to_string()
    } else {
        format!("every message of mb whose {}", conditions.join(" and "))
    }
}

/// Wraps a per-item `action` in the batch loop.
///
/// `action` runs with `msgId` bound and must leave the success record's
/// payload list in `payload`. Failures before `set moved to true` report
/// `err`, failures after it report `moved`.
fn batch(
    label: &'static str,
    handlers: &str,
    setup: &str,
    ids: &[MessageId],
    action: &str,
) -> Script {
    let mut id_list = String::new();
    literal::write_integer_list(&mut id_list, ids.iter().map(|id| id.get()));
    let body = format!(
        r#"{handlers}
set idList to {id_list}
set out to ""
tell application "Mail"
{setup}
end tell
repeat with idRef in idList
    set msgId to contents of idRef
    set moved to false
    try
{action}
        set out to out & my rec({{"ok", msgId}} & payload)
    on error errMsg number errNum
        if moved then
            set out to out & my rec({{"moved", msgId, errNum, errMsg}})
        else
            set out to out & my rec({{"err", msgId, errNum, errMsg}})
        end if
    end try
end repeat
return out
"#
    );
    Script::new(label, body).long_running()
}

/// Reads summaries, recipients and content for each identifier.
pub fn read_messages(mailbox: &MailboxHandle, ids: &[MessageId]) -> Script {
    batch(
        "read_messages",
        &format!("{SUMMARY_HANDLER}{BODY_HANDLER}"),
        &format!("    set mb to {}", mailbox.reference()),
        ids,
        r#"        tell application "Mail" to set msg to first message of mb whose id is msgId
        set payload to my summary(msg) & my body(msg)"#,
    )
}

/// Moves each identifier and reports the identifier it received in the
/// destination, located by its `Message-ID` header.
pub fn move_messages(
    source: &MailboxHandle,
    destination: &MailboxHandle,
    ids: &[MessageId],
) -> Script {
    let setup = format!(
        "    set srcMb to {}\n    set destMb to {}\n    set lookupDelays to {MOVE_LOOKUP_DELAYS}",
        source.reference(),
        destination.reference()
    );
    let pause = MOVE_LOOKUP_DELAY.as_secs_f64();
    let action = format!(
        r#"        tell application "Mail"
            set msg to first message of srcMb whose id is msgId
            set headerId to message id of msg
            move msg to destMb
        end tell
        set moved to true
        set newId to missing value
        repeat
            try
                tell application "Mail"
                    set newId to id of (first message of destMb whose message id is headerId)
                end tell
                exit repeat
            on error
                if lookupDelays is 0 then exit repeat
                set lookupDelays to lookupDelays - 1
                delay {pause}
            end try
        end repeat
        if newId is missing value then error "moved message not found in destination" number -1728
        set payload to {{newId}}"#
    );
    batch("move_messages", "", &setup, ids, &action)
}

/// Applies the requested read and flagged states to each identifier.
pub fn set_status(mailbox: &MailboxHandle, ids: &[MessageId], change: StatusChange) -> Script {
    let mut action = String::from("        tell application \"Mail\"\n");
    action.push_str("            set msg to first message of mb whose id is msgId\n");
    if let Some(read) = change.read {
        let _ = writeln!(
            action,
            "            set read status of msg to {}",
            literal::boolean(read)
        );
    }
    if let Some(flagged) = change.flagged {
        let _ = writeln!(
            action,
            "            set flagged status of msg to {}",
            literal::boolean(flagged)
        );
    }
    action.push_str("        end tell\n        set payload to {}");
    batch(
        "set_messages_status",
        "",
        &format!("    set mb to {}", mailbox.reference()),
        ids,
        &action,
    )
}

/// Creates mailbox `name` inside `parent`.
pub fn create_mailbox(parent: &MailboxHandle, name: &str) -> Script {
    let body = format!(
        r#"
tell application "Mail"
    make new mailbox with properties {{name:{}}} at {}
end tell
return my rec({{"created"}})
"#,
        literal::string(name),
        parent.reference()
    );
    Script::new("create_mailbox", body)
}

/// Renames `mailbox` to `new_name`.
pub fn rename_mailbox(mailbox: &MailboxHandle, new_name: &str) -> Script {
    let body = format!(
        r#"
tell application "Mail"
    set name of {} to {}
end tell
return my rec({{"renamed"}})
"#,
        mailbox.reference(),
        literal::string(new_name)
    );
    Script::new("rename_mailbox", body)
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
    use crate::model::{Limit, MailboxPath};

    fn inbox() -> MailboxHandle {
        MailboxHandle::new("Work", MailboxPath::parse("INBOX"))
    }

    fn ids(raw: &[u64]) -> Vec<MessageId> {
        raw.iter().copied().map(MessageId).collect()
    }

    mod escaping_tests {
        use super::*;

        #[test]
        fn account_name_with_quote_is_escaped() {
            let script = mailbox_tree("Bob's \"Mail\"", true);
            assert!(script.body().contains(r#"account "Bob's \"Mail\"""#));
        }

        #[test]
        fn probe_segments_are_literals() {
            let segments = vec!["A\"b".to_string(), "c\\d".to_string()];
            let script = probe_mailbox("Work", &segments);
            assert!(script.body().starts_with(r#"set segs to {"A\"b", "c\\d"}"#));
        }

        #[test]
        fn search_text_is_escaped() {
            let query = SearchQuery {
                sender_contains: Some("\" & (do shell script \"x\") & \"".into()),
                ..SearchQuery::default()
            };
            let script = search_messages(&inbox(), &query);
            let expected = r#"sender contains "\" & (do shell script \"x\") & \"""#;
            assert!(script.body().contains(expected));
        }

        #[test]
        fn control_characters_never_reach_source() {
            let script = create_mailbox(&inbox(), "a\u{1f}b");
            assert!(!script.body().contains('\u{1f}'));
            assert!(script.body().contains("(character id 31)"));
        }
    }

    mod listing_tests {
        use super::*;

        #[test]
        fn filters_combine() {
            let query = ListQuery {
                limit: Limit::new(2).unwrap(),
                unread_only: true,
                flagged_only: true,
                ..ListQuery::default()
            };
            let script = list_messages(&inbox(), &query);
            assert!(script.body().contains(
                "every message of mb whose read status is false and flagged status is true"
            ));
            assert!(script.body().contains("set endIdx to 2\n"));
            assert!(script.body().contains("repeat with i from 1 to endIdx"));
            assert!(script.is_long_running());
        }

        #[test]
        fn offset_shifts_window() {
            let query = ListQuery {
                limit: Limit::new(10).unwrap(),
                offset: 20,
                ..ListQuery::default()
            };
            let script = list_messages(&inbox(), &query);
            assert!(script.body().contains("set endIdx to 30\n"));
            assert!(script.body().contains("repeat with i from 21 to endIdx"));
        }

        #[test]
        fn huge_window_is_clamped() {
            let query = ListQuery {
                limit: Limit::new(i64::from(u32::MAX)).unwrap(),
                offset: u32::MAX,
                ..ListQuery::default()
            };
            let script = list_messages(&inbox(), &query);
            assert!(script.body().contains("set endIdx to 536870911\n"));
        }

        #[test]
        fn search_without_filters_lists_everything() {
            let script = search_messages(&inbox(), &SearchQuery::default());
            assert!(script.body().contains("set msgList to (every message of mb)"));
        }
    }

    mod batch_tests {
        use super::*;

        #[test]
        fn one_script_iterates_all_ids() {
            let script = read_messages(&inbox(), &ids(&[7, 9, 11]));
            assert!(script.body().contains("set idList to {7, 9, 11}"));
            assert_eq!(script.body().matches("repeat with idRef in idList").count(), 1);
            assert!(script.body().contains("on error errMsg number errNum"));
        }

        #[test]
        fn move_references_both_mailboxes() {
            let archive = MailboxHandle::new("Work", MailboxPath::parse("Archive/2024"));
            let script = move_messages(&inbox(), &archive, &ids(&[7]));
            assert!(script.body().contains(r#"set srcMb to mailbox "INBOX" of account "Work""#));
            assert!(script.body().contains(
                r#"set destMb to mailbox "2024" of mailbox "Archive" of account "Work""#
            ));
            assert!(script.body().contains("set moved to true"));
        }

        #[test]
        fn move_lookup_budget_is_shared_by_the_batch() {
            let archive = MailboxHandle::new("Work", MailboxPath::parse("Archive"));
            let script = move_messages(&inbox(), &archive, &ids(&[1, 2, 3, 4, 5]));
            let body = script.body();
            assert_eq!(body.matches("set lookupDelays to 50").count(), 1);
            let setup_at = body.find("set lookupDelays to 50").unwrap();
            assert!(setup_at < body.find("repeat with idRef in idList").unwrap());
            assert!(body.contains("set lookupDelays to lookupDelays - 1"));
            assert!(body.contains("delay 0.2\n"));
            assert!(!body.contains(" times"));
        }

        #[test]
        fn move_lookup_wait_fits_inside_long_timeout() {
            let budget = MOVE_LOOKUP_DELAY * MOVE_LOOKUP_DELAYS;
            assert_eq!(budget, Duration::from_secs(10));
            assert!(budget < mailbridge_script::DEFAULT_LONG_TIMEOUT / 4);
        }

        #[test]
        fn status_sets_only_requested_fields() {
            let change = StatusChange {
                read: Some(true),
                flagged: None,
            };
            let script = set_status(&inbox(), &ids(&[3]), change);
            assert!(script.body().contains("set read status of msg to true"));
            assert!(!script.body().contains("flagged status"));
        }
    }

    #[test]
    fn create_targets_parent() {
        let parent = MailboxHandle::new("Work", MailboxPath::parse("Projects"));
        let script = create_mailbox(&parent, "Alpha");
        let expected = r#"make new mailbox with properties {name:"Alpha"} at mailbox "Projects""#;
        assert!(script.body().contains(expected));
        assert!(script.body().contains(r#"at mailbox "Projects" of account "Work""#));
    }

    #[test]
    fn create_at_root_targets_account() {
        let root = MailboxHandle::new("Work", MailboxPath::root());
        let script = create_mailbox(&root, "Alpha");
        assert!(script.body().contains(r#"at account "Work""#));
    }
}
