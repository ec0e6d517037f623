//! AppleScript literal serialization.
//!
//! User-supplied text is only ever embedded into a script through these
//! helpers, so a name containing quotes or control characters cannot break
//! out of its string literal.

use std::fmt::Write;

/// Writes `s` as an AppleScript string expression.
///
/// Printable text becomes a double-quoted literal with `\` and `"` escaped.
/// Tab, line feed and carriage return use their backslash escapes. Any other
/// control character is spliced in as `(character id N)`, which keeps the
/// script source free of raw control bytes.
pub fn write_string(buf: &mut String, s: &str) {
    buf.push('"');
    for c in s.chars() {
        match c {
            '\\' => buf.push_str("\\\\"),
            '"' => buf.push_str("\\\""),
            '\t' => buf.push_str("\\t"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            c if c.is_control() => {
                let _ = write!(buf, "\" & (character id {}) & \"", u32::from(c));
            }
            c => buf.push(c),
        }
    }
    buf.push('"');
}

/// Returns `s` as an AppleScript string expression.
#[must_use]
pub fn string(s: &str) -> String {
    let mut buf = String::with_capacity(s.len() + 2);
    write_string(&mut buf, s);
    buf
}

/// Writes an AppleScript list of string expressions: `{"a", "b"}`.
pub fn write_string_list<S: AsRef<str>>(buf: &mut String, items: &[S]) {
    buf.push('{');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            buf.push_str(", ");
        }
        write_string(buf, item.as_ref());
    }
    buf.push('}');
}

/// Writes an AppleScript list of integers: `{7, 9}`.
pub fn write_integer_list<I>(buf: &mut String, items: I)
where
    I: IntoIterator,
    I::Item: std::fmt::Display,
{
    buf.push('{');
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            buf.push_str(", ");
        }
        let _ = write!(buf, "{item}");
    }
    buf.push('}');
}

/// Returns an AppleScript boolean literal.
#[must_use]
pub const fn boolean(value: bool) -> &'static str {
    if value { "true" } else { "false" }
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

    /// Evaluates the subset of AppleScript that `write_string` produces:
    /// quoted literals joined by `&` with `(character id N)` splices.
    fn evaluate(expr: &str) -> Option<String> {
        let mut out = String::new();
        let mut rest = expr.trim();
        loop {
            if let Some(body) = rest.strip_prefix('"') {
                let mut chars = body.char_indices();
                let end = loop {
                    let (i, c) = chars.next()?;
                    match c {
                        '"' => break i,
                        '\\' => match chars.next()?.1 {
                            '\\' => out.push('\\'),
                            '"' => out.push('"'),
                            't' => out.push('\t'),
                            'n' => out.push('\n'),
                            'r' => out.push('\r'),
                            _ => return None,
                        },
                        c if c.is_control() => return None,
                        c => out.push(c),
                    }
                };
                rest = body[end + 1..].trim_start();
            } else if let Some(splice) = rest.strip_prefix("(character id ") {
                let close = splice.find(')')?;
                let code: u32 = splice[..close].parse().ok()?;
                out.push(char::from_u32(code)?);
                rest = splice[close + 1..].trim_start();
            } else {
                return None;
            }

            if rest.is_empty() {
                return Some(out);
            }
            rest = rest.strip_prefix('&')?.trim_start();
        }
    }

    mod string_tests {
        use super::*;

        #[test]
        fn plain_text() {
            assert_eq!(string("INBOX"), "\"INBOX\"");
        }

        #[test]
        fn empty() {
            assert_eq!(string(""), "\"\"");
        }

        #[test]
        fn quotes_and_backslashes() {
            assert_eq!(string(r#"a"b\c"#), r#""a\"b\\c""#);
        }

        #[test]
        fn whitespace_escapes() {
            assert_eq!(string("a\tb\nc\rd"), r#""a\tb\nc\rd""#);
        }

        #[test]
        fn control_characters_are_spliced() {
            assert_eq!(
                string("a\u{1f}b"),
                "\"a\" & (character id 31) & \"b\""
            );
        }

        #[test]
        fn injection_attempt_stays_inside_literal() {
            let hostile = "x\" \n do shell script \"rm -rf ~";
            let quoted = string(hostile);
            assert_eq!(evaluate(&quoted).as_deref(), Some(hostile));
            assert!(!quoted.contains('\n'));
        }

        #[test]
        fn unicode_passes_through() {
            assert_eq!(string("Archiv/Überweisung"), "\"Archiv/Überweisung\"");
        }
    }

    mod list_tests {
        use super::*;

        #[test]
        fn string_list() {
            let mut buf = String::new();
            write_string_list(&mut buf, &["Archive", "20\"24"]);
            assert_eq!(buf, r#"{"Archive", "20\"24"}"#);
        }

        #[test]
        fn empty_string_list() {
            let mut buf = String::new();
            write_string_list::<&str>(&mut buf, &[]);
            assert_eq!(buf, "{}");
        }

        #[test]
        fn integer_list() {
            let mut buf = String::new();
            write_integer_list(&mut buf, [7_u64, 9, 12]);
            assert_eq!(buf, "{7, 9, 12}");
        }

        #[test]
        fn booleans() {
            assert_eq!(boolean(true), "true");
            assert_eq!(boolean(false), "false");
        }
    }

    proptest! {
        #[test]
        fn quoted_strings_evaluate_to_input(s in "\\PC*|[\\x00-\\x1f\"\\\\]*") {
            let quoted = string(&s);
            prop_assert_eq!(evaluate(&quoted), Some(s));
        }
    }
}
