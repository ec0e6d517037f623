//! Delimited wire format between scripts and the parser.
//!
//! Scripts emit records of fields. Fields are separated by U+001F, every
//! record is terminated by U+001E, and the three control characters the
//! format reserves are escaped inside field text:
//!
//! | Raw      | Escaped        |
//! |----------|----------------|
//! | U+0010   | U+0010 `e`     |
//! | U+001F   | U+0010 `f`     |
//! | U+001E   | U+0010 `r`     |
//!
//! The AppleScript half of the codec is [`APPLESCRIPT_ENCODER`]; the Rust
//! half is [`decode_field`] and [`parse_records`]. [`encode_record`] mirrors
//! the AppleScript encoder and exists so both halves can be tested against
//! each other.

use crate::error::{BridgeError, Result};

/// Separates fields within a record.
pub const FIELD_SEP: char = '\u{1f}';

/// Terminates a record.
pub const RECORD_SEP: char = '\u{1e}';

/// Introduces an escape sequence inside a field.
pub const ESCAPE: char = '\u{10}';

/// AppleScript handlers implementing the encoder half of the format.
///
/// `rec(fields)` returns one encoded record, terminator included. Missing
/// values encode as empty fields.
pub const APPLESCRIPT_ENCODER: &str = r#"
on swap(t, needle, replacement)
    set saved to AppleScript's text item delimiters
    set AppleScript's text item delimiters to needle
    set parts to text items of t
    set AppleScript's text item delimiters to replacement
    set t to parts as text
    set AppleScript's text item delimiters to saved
    return t
end swap

on wireText(v)
    if v is missing value then return ""
    set t to v as text
    set t to my swap(t, character id 16, (character id 16) & "e")
    set t to my swap(t, character id 31, (character id 16) & "f")
    set t to my swap(t, character id 30, (character id 16) & "r")
    return t
end wireText

on rec(fields)
    set encoded to {}
    repeat with f in fields
        set end of encoded to my wireText(contents of f)
    end repeat
    set saved to AppleScript's text item delimiters
    set AppleScript's text item delimiters to character id 31
    set t to encoded as text
    set AppleScript's text item delimiters to saved
    return t & (character id 30)
end rec
"#;

/// Escapes one field.
#[must_use]
pub fn encode_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ESCAPE => {
                out.push(ESCAPE);
                out.push('e');
            }
            FIELD_SEP => {
                out.push(ESCAPE);
                out.push('f');
            }
            RECORD_SEP => {
                out.push(ESCAPE);
                out.push('r');
            }
            c => out.push(c),
        }
    }
    out
}

/// Encodes a full record, terminator included.
#[must_use]
pub fn encode_record<S: AsRef<str>>(fields: &[S]) -> String {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(FIELD_SEP);
        }
        out.push_str(&encode_field(field.as_ref()));
    }
    out.push(RECORD_SEP);
    out
}

/// Reverses [`encode_field`].
///
/// # Errors
///
/// Returns [`BridgeError::ProtocolMismatch`] on a dangling escape or an
/// unknown escape letter.
pub fn decode_field(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('e') => out.push(ESCAPE),
            Some('f') => out.push(FIELD_SEP),
            Some('r') => out.push(RECORD_SEP),
            Some(other) => {
                return Err(BridgeError::mismatch(format!(
                    "unknown escape sequence U+0010 {other:?}"
                )));
            }
            None => return Err(BridgeError::mismatch("dangling escape at end of field")),
        }
    }
    Ok(out)
}

/// Splits raw script output into decoded records.
///
/// Empty output yields no records.
///
/// # Errors
///
/// Returns [`BridgeError::ProtocolMismatch`] if the output does not end with
/// a record terminator or a field fails to decode.
pub fn parse_records(raw: &str) -> Result<Vec<Record>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let Some(body) = raw.strip_suffix(RECORD_SEP) else {
        let start = raw.char_indices().rev().nth(39).map_or(0, |(i, _)| i);
        let tail = &raw[start..];
        return Err(BridgeError::mismatch(format!(
            "output does not end with a record terminator (tail: {tail:?})"
        )));
    };

    body.split(RECORD_SEP)
        .enumerate()
        .map(|(index, line)| {
            let fields = line
                .split(FIELD_SEP)
                .map(decode_field)
                .collect::<Result<Vec<_>>>()?;
            Ok(Record { index, fields })
        })
        .collect()
}

/// One decoded record with strict typed accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    index: usize,
    fields: Vec<String>,
}

impl Record {
    /// Creates a record from already-decoded fields.
    #[must_use]
    pub const fn new(index: usize, fields: Vec<String>) -> Self {
        Self { index, fields }
    }

    /// Position of this record in the output.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// All fields.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// The first field, used as a record tag by most scripts.
    #[must_use]
    pub fn tag(&self) -> &str {
        self.fields.first().map_or("", String::as_str)
    }

    /// Fails unless the record has at least `n` fields.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ProtocolMismatch`] when fields are missing.
    pub fn expect_len(&self, n: usize) -> Result<&Self> {
        if self.fields.len() < n {
            return Err(self.mismatch(format!(
                "expected at least {n} fields, found {}",
                self.fields.len()
            )));
        }
        Ok(self)
    }

    /// Returns field `i` as text.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ProtocolMismatch`] if the field is absent.
    pub fn text(&self, i: usize) -> Result<&str> {
        self.fields
            .get(i)
            .map(String::as_str)
            .ok_or_else(|| self.mismatch(format!("missing field {i}")))
    }

    /// Returns field `i` parsed as an unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ProtocolMismatch`] if the field is absent or not
    /// a plain decimal number.
    pub fn u64(&self, i: usize) -> Result<u64> {
        let raw = self.text(i)?;
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(self.mismatch(format!("field {i} is not a number: {raw:?}")));
        }
        raw.parse()
            .map_err(|_| self.mismatch(format!("field {i} is out of range: {raw:?}")))
    }

    /// Returns field `i` parsed as a `u32`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ProtocolMismatch`] on a non-numeric or
    /// out-of-range value.
    pub fn u32(&self, i: usize) -> Result<u32> {
        let value = self.u64(i)?;
        u32::try_from(value)
            .map_err(|_| self.mismatch(format!("field {i} is out of range: {value}")))
    }

    /// Returns field `i` parsed as a `usize`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ProtocolMismatch`] on a non-numeric or
    /// out-of-range value.
    pub fn usize(&self, i: usize) -> Result<usize> {
        let value = self.u64(i)?;
        usize::try_from(value)
            .map_err(|_| self.mismatch(format!("field {i} is out of range: {value}")))
    }

    /// Returns field `i` parsed as a signed integer (AppleScript error numbers).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ProtocolMismatch`] on a non-numeric value.
    pub fn i32(&self, i: usize) -> Result<i32> {
        let raw = self.text(i)?;
        let digits = raw.strip_prefix('-').unwrap_or(raw);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(self.mismatch(format!("field {i} is not a number: {raw:?}")));
        }
        raw.parse()
            .map_err(|_| self.mismatch(format!("field {i} is out of range: {raw:?}")))
    }

    /// Returns field `i` parsed as an AppleScript boolean.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ProtocolMismatch`] unless the field is exactly
    /// `true` or `false`.
    pub fn bool(&self, i: usize) -> Result<bool> {
        match self.text(i)? {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(self.mismatch(format!("field {i} is not a boolean: {other:?}"))),
        }
    }

    /// Builds a protocol mismatch error naming this record.
    #[must_use]
    pub fn mismatch(&self, message: impl std::fmt::Display) -> BridgeError {
        BridgeError::mismatch(format!("record {}: {message}", self.index))
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
    use proptest::prelude::*;

    fn record(fields: &[&str]) -> Record {
        Record::new(0, fields.iter().map(ToString::to_string).collect())
    }

    mod codec_tests {
        use super::*;

        #[test]
        fn plain_field_unchanged() {
            assert_eq!(encode_field("Quarterly report"), "Quarterly report");
        }

        #[test]
        fn reserved_characters_escaped() {
            assert_eq!(
                encode_field("a\u{1f}b\u{1e}c\u{10}d"),
                "a\u{10}fb\u{10}rc\u{10}ed"
            );
        }

        #[test]
        fn decode_rejects_dangling_escape() {
            assert!(matches!(
                decode_field("abc\u{10}"),
                Err(BridgeError::ProtocolMismatch(_))
            ));
        }

        #[test]
        fn decode_rejects_unknown_escape() {
            assert!(matches!(
                decode_field("\u{10}x"),
                Err(BridgeError::ProtocolMismatch(_))
            ));
        }

        #[test]
        fn subject_with_separator_keeps_field_boundaries() {
            let raw = encode_record(&["42", "Re: a\u{1f}b", "bob@example.com"]);
            let records = parse_records(&raw).unwrap();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].fields(), &["42", "Re: a\u{1f}b", "bob@example.com"]);
        }
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn empty_output_has_no_records() {
            assert!(parse_records("").unwrap().is_empty());
        }

        #[test]
        fn multiple_records_are_indexed() {
            let raw = format!("{}{}", encode_record(&["a", "1"]), encode_record(&["b", "2"]));
            let records = parse_records(&raw).unwrap();
            assert_eq!(records.len(), 2);
            assert_eq!(records[1].index(), 1);
            assert_eq!(records[1].tag(), "b");
        }

        #[test]
        fn unterminated_output_is_mismatch() {
            let raw = format!("{}partial", encode_record(&["a"]));
            assert!(matches!(
                parse_records(&raw),
                Err(BridgeError::ProtocolMismatch(_))
            ));
        }

        #[test]
        fn empty_fields_survive() {
            let records = parse_records(&encode_record(&["", "", ""])).unwrap();
            assert_eq!(records[0].len(), 3);
            assert!(records[0].fields().iter().all(String::is_empty));
        }
    }

    mod accessor_tests {
        use super::*;

        #[test]
        fn numbers_parse_strictly() {
            let r = record(&["42", " 42", "4x", "", "-3"]);
            assert_eq!(r.u64(0).unwrap(), 42);
            assert!(r.u64(1).is_err());
            assert!(r.u64(2).is_err());
            assert!(r.u64(3).is_err());
            assert!(r.u64(4).is_err());
            assert_eq!(r.i32(4).unwrap(), -3);
        }

        #[test]
        fn u32_out_of_range() {
            let r = record(&["4294967296"]);
            assert!(r.u32(0).is_err());
            assert_eq!(r.u64(0).unwrap(), 4_294_967_296);
        }

        #[test]
        fn booleans_parse_strictly() {
            let r = record(&["true", "false", "True", "yes"]);
            assert!(r.bool(0).unwrap());
            assert!(!r.bool(1).unwrap());
            assert!(r.bool(2).is_err());
            assert!(r.bool(3).is_err());
        }

        #[test]
        fn missing_field_is_mismatch() {
            let r = record(&["only"]);
            assert!(matches!(r.text(1), Err(BridgeError::ProtocolMismatch(_))));
            assert!(r.expect_len(2).is_err());
            assert!(r.expect_len(1).is_ok());
        }

        #[test]
        fn mismatch_names_record() {
            let r = Record::new(3, vec!["x".into()]);
            let err = r.u64(0).unwrap_err();
            assert!(err.to_string().contains("record 3"));
        }
    }

    proptest! {
        #[test]
        fn field_round_trip(s in "\\PC*|[\\x10\\x1e\\x1fa-z]*") {
            prop_assert_eq!(decode_field(&encode_field(&s)).unwrap(), s);
        }

        #[test]
        fn record_round_trip(
            fields in proptest::collection::vec("[\\x10\\x1e\\x1fa-z ]{0,8}", 1..6)
        ) {
            let raw = encode_record(&fields);
            let records = parse_records(&raw).unwrap();
            prop_assert_eq!(records.len(), 1);
            prop_assert_eq!(records[0].fields(), fields.as_slice());
        }
    }
}
