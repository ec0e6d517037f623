//! Per-item batch results and their reconciliation against the request.
//!
//! A batch script walks the identifier list inside the client and emits one
//! record per identifier, in order:
//!
//! ```text
//! ok    <id> <payload...>        the item succeeded
//! err   <id> <errno> <message>   the item failed, the batch continued
//! moved <id> <errno> <message>   moved, but the new identifier was not found
//! ```
//!
//! [`reconcile`] turns those records into a [`BatchResult`] with exactly one
//! entry per requested identifier.

use mailbridge_script::{BridgeError, Record};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use tracing::warn;

use crate::model::MessageId;

/// AppleScript error numbers meaning the message no longer exists.
const NOT_FOUND_CODES: &[i32] = &[-1728, -1719];

/// Why a single item of a batch failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemError {
    /// The identifier did not resolve to a message (deleted, moved, stale).
    #[error("message not found: {message}")]
    NotFound {
        /// Client message.
        message: String,
    },

    /// The client refused the action for this item.
    #[error("script error{}: {message}", code_suffix(.code))]
    ScriptError {
        /// AppleScript error number.
        code: Option<i32>,
        /// Client message.
        message: String,
    },

    /// The script produced no record for this item.
    #[error("protocol mismatch: no result reported for this message")]
    Dropped,

    /// The message was moved but its new identifier could not be found.
    /// Re-list the destination to address it.
    #[error("message moved but its new identifier is unknown: {message}")]
    Unlocated {
        /// Client message from the lookup.
        message: String,
    },
}

#[allow(clippy::ref_option)]
fn code_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" ({c})")).unwrap_or_default()
}

impl ItemError {
    /// Classifies a client error reported for one item.
    #[must_use]
    pub fn from_script(code: i32, message: String) -> Self {
        if NOT_FOUND_CODES.contains(&code) {
            Self::NotFound { message }
        } else {
            Self::ScriptError {
                code: Some(code),
                message,
            }
        }
    }
}

/// Outcome for one requested identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem<T> {
    /// The identifier as requested.
    pub id: MessageId,
    /// What happened to it.
    pub outcome: Result<T, ItemError>,
}

impl<T: Serialize> Serialize for BatchItem<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("id", &self.id)?;
        match &self.outcome {
            Ok(value) => map.serialize_entry("success", value)?,
            Err(e) => map.serialize_entry("failure", e)?,
        }
        map.end()
    }
}

/// One outcome per requested identifier, in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult<T> {
    items: Vec<BatchItem<T>>,
}

impl<T> BatchResult<T> {
    /// Builds a result from items already in request order.
    #[must_use]
    pub const fn from_items(items: Vec<BatchItem<T>>) -> Self {
        Self { items }
    }

    /// Result for an empty request.
    #[must_use]
    pub const fn empty() -> Self {
        Self { items: Vec::new() }
    }

    /// Items in request order.
    #[must_use]
    pub fn items(&self) -> &[BatchItem<T>] {
        &self.items
    }

    /// Consumes the result, returning its items.
    #[must_use]
    pub fn into_items(self) -> Vec<BatchItem<T>> {
        self.items
    }

    /// Iterates over items.
    pub fn iter(&self) -> std::slice::Iter<'_, BatchItem<T>> {
        self.items.iter()
    }

    /// Number of items (always the number of requested identifiers).
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if no identifiers were requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of successful items.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_ok()).count()
    }

    /// Number of failed items.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    /// Successful items as `(requested id, value)`.
    pub fn successes(&self) -> impl Iterator<Item = (MessageId, &T)> {
        self.items
            .iter()
            .filter_map(|i| i.outcome.as_ref().ok().map(|v| (i.id, v)))
    }

    /// Failed items as `(requested id, error)`.
    pub fn failures(&self) -> impl Iterator<Item = (MessageId, &ItemError)> {
        self.items
            .iter()
            .filter_map(|i| i.outcome.as_ref().err().map(|e| (i.id, e)))
    }
}

impl<'a, T> IntoIterator for &'a BatchResult<T> {
    type Item = &'a BatchItem<T>;
    type IntoIter = std::slice::Iter<'a, BatchItem<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Serialize> Serialize for BatchResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.items.len()))?;
        for item in &self.items {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

/// Reconciles per-item records against the requested identifiers.
///
/// Record `i` must echo identifier `i` in its second field. Successful
/// records are decoded with `decode`. Identifiers the script reported
/// nothing for are padded with [`ItemError::Dropped`].
///
/// # Errors
///
/// Returns [`BridgeError::ProtocolMismatch`] if there are more records than
/// identifiers, a record echoes the wrong identifier, carries an unknown tag,
/// or a success payload fails to decode.
pub fn reconcile<T>(
    ids: &[MessageId],
    records: &[Record],
    mut decode: impl FnMut(&Record) -> mailbridge_script::Result<T>,
) -> mailbridge_script::Result<BatchResult<T>> {
    if records.len() > ids.len() {
        return Err(BridgeError::mismatch(format!(
            "{} results reported for {} requested messages",
            records.len(),
            ids.len()
        )));
    }

    let mut items = Vec::with_capacity(ids.len());
    for (position, &id) in ids.iter().enumerate() {
        let Some(record) = records.get(position) else {
            warn!(%id, position, "no result reported for message; padding with failure");
            items.push(BatchItem {
                id,
                outcome: Err(ItemError::Dropped),
            });
            continue;
        };

        record.expect_len(2)?;
        let echoed = MessageId(record.u64(1)?);
        if echoed != id {
            return Err(record.mismatch(format!("reports message {echoed}, expected {id}")));
        }

        let outcome = match record.tag() {
            "ok" => Ok(decode(record)?),
            "err" => {
                record.expect_len(4)?;
                Err(ItemError::from_script(record.i32(2)?, record.text(3)?.to_string()))
            }
            "moved" => {
                record.expect_len(4)?;
                Err(ItemError::Unlocated {
                    message: record.text(3)?.to_string(),
                })
            }
            other => return Err(record.mismatch(format!("unknown result tag {other:?}"))),
        };

        if let Err(e) = &outcome {
            warn!(%id, "batch item failed: {e}");
        }
        items.push(BatchItem { id, outcome });
    }

    Ok(BatchResult { items })
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
    use mailbridge_script::wire::{encode_record, parse_records};

    fn ids(raw: &[u64]) -> Vec<MessageId> {
        raw.iter().copied().map(MessageId).collect()
    }

    fn new_id(record: &Record) -> mailbridge_script::Result<MessageId> {
        record.u64(2).map(MessageId)
    }

    fn records(lines: &[&[&str]]) -> Vec<Record> {
        let raw: String = lines.iter().map(|&l| encode_record(l)).collect();
        parse_records(&raw).unwrap()
    }

    mod reconcile_tests {
        use super::*;

        #[test]
        fn all_succeed_in_order() {
            let recs = records(&[&["ok", "7", "107"], &["ok", "9", "109"]]);
            let result = reconcile(&ids(&[7, 9]), &recs, new_id).unwrap();
            assert_eq!(result.len(), 2);
            assert_eq!(result.items()[0].outcome, Ok(MessageId(107)));
            assert_eq!(result.items()[1].outcome, Ok(MessageId(109)));
        }

        #[test]
        fn stale_identifier_is_item_failure() {
            let recs = records(&[
                &["ok", "7", "107"],
                &["err", "9", "-1728", "Can’t get message 1 whose id = 9."],
            ]);
            let result = reconcile(&ids(&[7, 9]), &recs, new_id).unwrap();
            assert_eq!(result.len(), 2);
            assert_eq!(result.success_count(), 1);
            assert!(matches!(
                result.items()[1].outcome,
                Err(ItemError::NotFound { .. })
            ));
        }

        #[test]
        fn other_errors_keep_code() {
            let recs = records(&[&["err", "3", "-10000", "Mail got an error"]]);
            let result = reconcile(&ids(&[3]), &recs, new_id).unwrap();
            assert_eq!(
                result.items()[0].outcome,
                Err(ItemError::ScriptError {
                    code: Some(-10000),
                    message: "Mail got an error".into()
                })
            );
        }

        #[test]
        fn moved_without_new_id_is_unlocated() {
            let recs = records(&[&["moved", "3", "-1719", "Invalid index."]]);
            let result = reconcile(&ids(&[3]), &recs, new_id).unwrap();
            assert!(matches!(result.items()[0].outcome, Err(ItemError::Unlocated { .. })));
        }

        #[test]
        fn missing_records_are_padded() {
            let recs = records(&[&["ok", "1", "11"]]);
            let result = reconcile(&ids(&[1, 2, 3]), &recs, new_id).unwrap();
            assert_eq!(result.len(), 3);
            assert_eq!(result.items()[1].id, MessageId(2));
            assert_eq!(result.items()[1].outcome, Err(ItemError::Dropped));
            assert_eq!(result.items()[2].outcome, Err(ItemError::Dropped));
        }

        #[test]
        fn extra_records_are_mismatch() {
            let recs = records(&[&["ok", "1", "11"], &["ok", "2", "12"]]);
            assert!(matches!(
                reconcile(&ids(&[1]), &recs, new_id),
                Err(BridgeError::ProtocolMismatch(_))
            ));
        }

        #[test]
        fn out_of_order_echo_is_mismatch() {
            let recs = records(&[&["ok", "9", "109"], &["ok", "7", "107"]]);
            assert!(reconcile(&ids(&[7, 9]), &recs, new_id).is_err());
        }

        #[test]
        fn non_numeric_payload_is_mismatch() {
            let recs = records(&[&["ok", "7", "abc"]]);
            assert!(matches!(
                reconcile(&ids(&[7]), &recs, new_id),
                Err(BridgeError::ProtocolMismatch(_))
            ));
        }

        #[test]
        fn unknown_tag_is_mismatch() {
            let recs = records(&[&["maybe", "7"]]);
            assert!(reconcile(&ids(&[7]), &recs, new_id).is_err());
        }

        #[test]
        fn duplicates_handled_independently() {
            let recs = records(&[
                &["ok", "5", "15"],
                &["err", "5", "-1728", "Can’t get message."],
            ]);
            let result = reconcile(&ids(&[5, 5]), &recs, new_id).unwrap();
            assert_eq!(result.success_count(), 1);
            assert_eq!(result.failure_count(), 1);
        }
    }

    mod serialize_tests {
        use super::*;

        #[test]
        fn items_serialize_as_success_or_failure() {
            let result = BatchResult::from_items(vec![
                BatchItem {
                    id: MessageId(7),
                    outcome: Ok(MessageId(107)),
                },
                BatchItem {
                    id: MessageId(9),
                    outcome: Err(ItemError::NotFound {
                        message: "gone".into(),
                    }),
                },
            ]);
            let json = serde_json::to_value(&result).unwrap();
            assert_eq!(json[0]["id"], 7);
            assert_eq!(json[0]["success"], 107);
            assert_eq!(json[1]["failure"]["kind"], "not_found");
            assert!(json[1].get("success").is_none());
        }

        #[test]
        fn unit_success_serializes_as_null() {
            let result = BatchResult::from_items(vec![BatchItem {
                id: MessageId(3),
                outcome: Ok(()),
            }]);
            let json = serde_json::to_value(&result).unwrap();
            assert!(json[0]["success"].is_null());
            assert!(json[0].get("success").is_some());
        }
    }

    #[test]
    fn successes_and_failures_split() {
        let result = BatchResult::from_items(vec![
            BatchItem { id: MessageId(1), outcome: Ok(10_u32) },
            BatchItem { id: MessageId(2), outcome: Err(ItemError::Dropped) },
        ]);
        assert_eq!(result.successes().collect::<Vec<_>>(), [(MessageId(1), &10)]);
        assert_eq!(result.failures().map(|(id, _)| id).collect::<Vec<_>>(), [MessageId(2)]);
    }
}
