//! Typed decoding of script records.
//!
//! Field layouts mirror the builders in [`crate::scripts`]. Any record that
//! does not fit its layout is a protocol mismatch: it means the script and
//! this parser disagree, which retrying cannot fix.

use std::fmt::Display;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use mailbridge_script::wire::parse_records;
use mailbridge_script::{Bridge, Record, Result, Script};

use crate::error::Error;
use crate::model::{Account, MailboxNode, MailboxPath, MessageBody, MessageId, MessageRecord};
use crate::scripts::SUMMARY_FIELDS;

/// Runs `script` and decodes its records, attributing failures to `target`.
pub async fn execute<B: Bridge>(
    bridge: &B,
    script: &Script,
    target: impl Display,
) -> crate::Result<Vec<Record>> {
    let raw = bridge
        .execute(script)
        .await
        .map_err(|e| Error::bridge(&target, e))?;
    parse_records(&raw).map_err(|e| Error::bridge(&target, e))
}

/// Decodes account records: name, enabled, type, server, addresses.
pub fn accounts(records: &[Record]) -> Result<Vec<Account>> {
    records
        .iter()
        .map(|r| {
            r.expect_len(4)?;
            Ok(Account {
                name: r.text(0)?.to_string(),
                enabled: r.bool(1)?,
                account_type: r.text(2)?.to_string(),
                server_name: r.text(3)?.to_string(),
                email_addresses: r.fields()[4..].to_vec(),
            })
        })
        .collect()
}

/// Rebuilds the mailbox tree from pre-order `total, unread, segment...`
/// records.
pub fn mailbox_tree(records: &[Record]) -> Result<Vec<MailboxNode>> {
    let mut roots: Vec<MailboxNode> = Vec::new();
    for r in records {
        r.expect_len(3)?;
        let path = MailboxPath::from_segments(r.fields()[2..].to_vec());
        let node = MailboxNode {
            name: r.text(r.len() - 1)?.to_string(),
            path: path.clone(),
            message_count: r.u32(0)?,
            unread_count: r.u32(1)?,
            children: Vec::new(),
        };

        let mut siblings = &mut roots;
        for segment in &path.segments()[..path.depth() - 1] {
            let Some(parent) = siblings.iter_mut().rev().find(|n| &n.name == segment) else {
                return Err(r.mismatch(format!("mailbox \"{path}\" listed before its parent")));
            };
            siblings = &mut parent.children;
        }
        siblings.push(node);
    }
    Ok(roots)
}

/// Decodes a summary starting at field `at`.
pub fn summary(r: &Record, at: usize) -> Result<MessageRecord> {
    r.expect_len(at + SUMMARY_FIELDS)?;
    Ok(MessageRecord {
        id: MessageId(r.u64(at)?),
        subject: r.text(at + 1)?.to_string(),
        sender: r.text(at + 2)?.to_string(),
        date_received: date(r, at + 3)?,
        is_read: r.bool(at + 7)?,
        is_flagged: r.bool(at + 8)?,
        body: None,
    })
}

/// Decodes year, month, day and seconds since midnight. Four empty fields
/// mean the message has no date.
fn date(r: &Record, at: usize) -> Result<Option<NaiveDateTime>> {
    if r.fields()[at..at + 4].iter().all(String::is_empty) {
        return Ok(None);
    }
    let year = i32::try_from(r.u32(at)?).map_err(|_| r.mismatch("year out of range"))?;
    let day = NaiveDate::from_ymd_opt(year, r.u32(at + 1)?, r.u32(at + 2)?)
        .ok_or_else(|| r.mismatch(format!("field {at} does not start a valid date")))?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(r.u32(at + 3)?, 0)
        .ok_or_else(|| r.mismatch(format!("field {} is not a time of day", at + 3)))?;
    Ok(Some(day.and_time(time)))
}

/// Decodes `count, to..., count, cc..., content` starting at field `at`.
pub fn body(r: &Record, at: usize) -> Result<MessageBody> {
    let (to, at) = counted_list(r, at)?;
    let (cc, at) = counted_list(r, at)?;
    let content = r.text(at)?.to_string();
    if r.len() != at + 1 {
        return Err(r.mismatch(format!("{} trailing fields after content", r.len() - at - 1)));
    }
    Ok(MessageBody {
        to,
        cc,
        content,
        truncated: false,
    })
}

fn counted_list(r: &Record, at: usize) -> Result<(Vec<String>, usize)> {
    let n = r.usize(at)?;
    let end = at + 1 + n;
    r.expect_len(end)?;
    Ok((r.fields()[at + 1..end].to_vec(), end))
}

/// Decodes a mailbox probe: `None` when found, else the missing segment's
/// 1-based position.
pub fn probe(records: &[Record], depth: usize) -> Result<Option<usize>> {
    let r = single(records)?;
    match r.tag() {
        "found" => Ok(None),
        "missing" => {
            r.expect_len(2)?;
            let position = r.usize(1)?;
            if position == 0 || position > depth {
                return Err(r.mismatch(format!(
                    "segment {position} is outside a path of depth {depth}"
                )));
            }
            Ok(Some(position))
        }
        other => Err(r.mismatch(format!("unknown probe result {other:?}"))),
    }
}

/// Checks that the output is exactly one `tag` acknowledgement.
pub fn ack(records: &[Record], tag: &str) -> Result<()> {
    let r = single(records)?;
    if r.tag() == tag {
        Ok(())
    } else {
        Err(r.mismatch(format!("expected {tag:?}, found {:?}", r.tag())))
    }
}

fn single(records: &[Record]) -> Result<&Record> {
    match records {
        [r] => Ok(r),
        _ => Err(mailbridge_script::BridgeError::mismatch(format!(
            "expected one record, found {}",
            records.len()
        ))),
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
    use mailbridge_script::BridgeError;
    use mailbridge_script::wire::encode_record;

    fn records(lines: &[&[&str]]) -> Vec<Record> {
        let raw: String = lines.iter().map(|&l| encode_record(l)).collect();
        parse_records(&raw).unwrap()
    }

    const SUMMARY: [&str; 9] = [
        "42",
        "Hello",
        "ann@example.com",
        "2024",
        "3",
        "1",
        "34200",
        "false",
        "true",
    ];

    mod summary_tests {
        use super::*;

        #[test]
        fn decodes_all_fields() {
            let recs = records(&[&SUMMARY]);
            let m = summary(&recs[0], 0).unwrap();
            assert_eq!(m.id, MessageId(42));
            assert_eq!(m.subject, "Hello");
            assert_eq!(m.sender, "ann@example.com");
            assert_eq!(m.date_received.unwrap().to_string(), "2024-03-01 09:30:00");
            assert!(!m.is_read);
            assert!(m.is_flagged);
            assert!(m.body.is_none());
        }

        #[test]
        fn separator_inside_subject_survives() {
            let mut fields = SUMMARY;
            fields[1] = "a\u{1f}b\u{1e}c\u{10}d";
            let recs = records(&[&fields]);
            assert_eq!(summary(&recs[0], 0).unwrap().subject, "a\u{1f}b\u{1e}c\u{10}d");
        }

        #[test]
        fn non_numeric_id_is_mismatch() {
            let mut fields = SUMMARY;
            fields[0] = "forty-two";
            let recs = records(&[&fields]);
            assert!(matches!(summary(&recs[0], 0), Err(BridgeError::ProtocolMismatch(_))));
        }

        #[test]
        fn empty_date_fields_mean_no_date() {
            let mut fields = SUMMARY;
            fields[3..7].copy_from_slice(&["", "", "", ""]);
            let recs = records(&[&fields]);
            let m = summary(&recs[0], 0).unwrap();
            assert_eq!(m.date_received, None);
            assert_eq!(m.subject, "Hello");
        }

        #[test]
        fn partly_empty_date_is_mismatch() {
            let mut fields = SUMMARY;
            fields[5] = "";
            let recs = records(&[&fields]);
            assert!(matches!(summary(&recs[0], 0), Err(BridgeError::ProtocolMismatch(_))));
        }

        #[test]
        fn impossible_date_is_mismatch() {
            let mut fields = SUMMARY;
            fields[4] = "13";
            let recs = records(&[&fields]);
            assert!(summary(&recs[0], 0).is_err());
        }

        #[test]
        fn short_record_is_mismatch() {
            let recs = records(&[&SUMMARY[..8]]);
            assert!(summary(&recs[0], 0).is_err());
        }
    }

    mod body_tests {
        use super::*;

        #[test]
        fn counted_lists() {
            let recs = records(&[&["2", "a@x", "b@x", "1", "c@x", "Hi there"]]);
            let b = body(&recs[0], 0).unwrap();
            assert_eq!(b.to, ["a@x", "b@x"]);
            assert_eq!(b.cc, ["c@x"]);
            assert_eq!(b.content, "Hi there");
        }

        #[test]
        fn empty_lists_and_content() {
            let recs = records(&[&["0", "0", ""]]);
            let b = body(&recs[0], 0).unwrap();
            assert!(b.to.is_empty() && b.cc.is_empty());
            assert_eq!(b.content, "");
        }

        #[test]
        fn count_past_end_is_mismatch() {
            let recs = records(&[&["5", "a@x"]]);
            assert!(body(&recs[0], 0).is_err());
        }

        #[test]
        fn trailing_fields_are_mismatch() {
            let recs = records(&[&["0", "0", "text", "extra"]]);
            assert!(body(&recs[0], 0).is_err());
        }
    }

    mod tree_tests {
        use super::*;

        #[test]
        fn builds_nested_tree() {
            let recs = records(&[
                &["10", "2", "INBOX"],
                &["5", "0", "Archive"],
                &["3", "0", "Archive", "2023"],
                &["2", "1", "Archive", "2024"],
                &["1", "1", "Archive", "2024", "Q1"],
                &["0", "0", "Sent"],
            ]);
            let tree = mailbox_tree(&recs).unwrap();
            assert_eq!(tree.len(), 3);
            let archive = &tree[1];
            assert_eq!(archive.children.len(), 2);
            assert_eq!(archive.children[1].path.to_string(), "Archive/2024");
            assert_eq!(archive.children[1].children[0].name, "Q1");
            assert_eq!(archive.children[1].children[0].unread_count, 1);
        }

        #[test]
        fn orphan_is_mismatch() {
            let recs = records(&[&["1", "0", "Missing", "Child"]]);
            assert!(mailbox_tree(&recs).is_err());
        }

        #[test]
        fn name_with_delimiter_kept_as_one_segment() {
            let recs = records(&[&["1", "0", "a/b"]]);
            let tree = mailbox_tree(&recs).unwrap();
            assert_eq!(tree[0].name, "a/b");
            assert_eq!(tree[0].path.segments(), ["a/b"]);
        }
    }

    #[test]
    fn accounts_collect_addresses() {
        let recs = records(&[
            &["Work", "true", "imap", "mail.example.com", "me@example.com", "alias@example.com"],
            &["Old", "false", "pop", ""],
        ]);
        let list = accounts(&recs).unwrap();
        assert_eq!(list[0].email_addresses, ["me@example.com", "alias@example.com"]);
        assert!(!list[1].enabled);
        assert!(list[1].email_addresses.is_empty());
    }

    #[test]
    fn probe_results() {
        assert_eq!(probe(&records(&[&["found"]]), 2).unwrap(), None);
        assert_eq!(probe(&records(&[&["missing", "2"]]), 2).unwrap(), Some(2));
        assert!(probe(&records(&[&["missing", "3"]]), 2).is_err());
        assert!(probe(&[], 2).is_err());
    }

    #[test]
    fn ack_requires_exact_tag() {
        assert!(ack(&records(&[&["created"]]), "created").is_ok());
        assert!(ack(&records(&[&["renamed"]]), "created").is_err());
        assert!(ack(&records(&[&["created"], &["created"]]), "created").is_err());
    }
}
