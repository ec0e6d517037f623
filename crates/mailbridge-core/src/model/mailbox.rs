//! Mailbox path and tree types.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Slash-delimited mailbox path within one account.
///
/// A segment may itself contain `/`: the textual form escapes it as `\/`, so
/// [`Display`](std::fmt::Display) and [`MailboxPath::parse`] round-trip.
///
/// The empty path denotes the account itself: its top-level mailbox list.
/// Paths are resolved against the client on every call and never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MailboxPath(Vec<String>);

impl MailboxPath {
    /// Segment delimiter in the textual form.
    pub const DELIMITER: char = '/';

    /// Escapes a delimiter or backslash inside a segment's textual form.
    pub const ESCAPE: char = '\\';

    /// The account root.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Parses `"Archive/2024"` into segments. Empty segments are dropped, so
    /// `""` and `"/"` both denote the root.
    ///
    /// `\/` and `\\` stand for a literal delimiter and backslash inside a
    /// segment; any other backslash is kept as written.
    #[must_use]
    pub fn parse(path: &str) -> Self {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = path.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                Self::ESCAPE => match chars.peek() {
                    Some(&next) if matches!(next, Self::DELIMITER | Self::ESCAPE) => {
                        current.push(next);
                        chars.next();
                    }
                    _ => current.push(c),
                },
                Self::DELIMITER => {
                    if !current.is_empty() {
                        segments.push(std::mem::take(&mut current));
                    }
                }
                _ => current.push(c),
            }
        }
        if !current.is_empty() {
            segments.push(current);
        }
        Self(segments)
    }

    /// Builds a path from already-split segments, kept byte-for-byte.
    #[must_use]
    pub const fn from_segments(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Path segments, outermost first.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns true for the account root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Nesting depth (root is 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Last segment, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Path of the containing mailbox (root stays root).
    #[must_use]
    pub fn parent(&self) -> Self {
        let mut segments = self.0.clone();
        segments.pop();
        Self(segments)
    }

    /// Path of a direct child.
    #[must_use]
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }
}

impl std::fmt::Display for MailboxPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", Self::DELIMITER)?;
            }
            for c in segment.chars() {
                if matches!(c, Self::DELIMITER | Self::ESCAPE) {
                    write!(f, "{}", Self::ESCAPE)?;
                }
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

impl From<&str> for MailboxPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl Serialize for MailboxPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MailboxPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// A mailbox in an account's mailbox tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailboxNode {
    /// Display name (last path segment).
    pub name: String,
    /// Full path from the account root.
    pub path: MailboxPath,
    /// Total messages.
    pub message_count: u32,
    /// Unread messages.
    pub unread_count: u32,
    /// Nested mailboxes, in client order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MailboxNode>,
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

    mod path_tests {
        use super::*;

        #[test]
        fn parse_nested() {
            let path = MailboxPath::parse("Archive/2024");
            assert_eq!(path.segments(), &["Archive", "2024"]);
            assert_eq!(path.depth(), 2);
            assert_eq!(path.name(), Some("2024"));
        }

        #[test]
        fn parse_root_forms() {
            assert!(MailboxPath::parse("").is_root());
            assert!(MailboxPath::parse("/").is_root());
            assert_eq!(MailboxPath::root().name(), None);
        }

        #[test]
        fn parse_drops_empty_segments() {
            assert_eq!(MailboxPath::parse("/Archive//2024/"), MailboxPath::parse("Archive/2024"));
        }

        #[test]
        fn display_joins_segments() {
            assert_eq!(MailboxPath::parse("Archive/2024").to_string(), "Archive/2024");
            assert_eq!(MailboxPath::root().to_string(), "");
        }

        #[test]
        fn parent_and_child() {
            let path = MailboxPath::parse("Archive/2024");
            assert_eq!(path.parent(), MailboxPath::parse("Archive"));
            assert_eq!(path.parent().parent(), MailboxPath::root());
            assert_eq!(MailboxPath::root().parent(), MailboxPath::root());
            assert_eq!(path.parent().child("2025").to_string(), "Archive/2025");
        }

        #[test]
        fn segments_keep_reserved_characters() {
            let path = MailboxPath::from_segments(vec!["a\u{1f}b".into(), "c\u{10}".into()]);
            assert_eq!(path.segments()[0], "a\u{1f}b");
            assert_eq!(path.name(), Some("c\u{10}"));
        }

        #[test]
        fn delimiter_inside_segment_is_escaped() {
            let path = MailboxPath::from_segments(vec!["Clients/Acme".into(), "a\\b".into()]);
            assert_eq!(path.to_string(), r"Clients\/Acme/a\\b");
            assert_eq!(MailboxPath::parse(&path.to_string()), path);
        }

        #[test]
        fn lone_backslash_is_literal() {
            let path = MailboxPath::parse(r"C:\Temp/x\");
            assert_eq!(path.segments(), [r"C:\Temp", r"x\"]);
        }

        #[test]
        fn escaped_delimiter_survives_json() {
            let path = MailboxPath::from_segments(vec!["Clients/Acme".into()]);
            let json = serde_json::to_string(&path).unwrap();
            let back: MailboxPath = serde_json::from_str(&json).unwrap();
            assert_eq!(back.segments(), ["Clients/Acme"]);
        }

        #[test]
        fn serde_uses_text_form() {
            let path = MailboxPath::parse("Archive/2024");
            let json = serde_json::to_string(&path).unwrap();
            assert_eq!(json, "\"Archive/2024\"");
            let back: MailboxPath = serde_json::from_str(&json).unwrap();
            assert_eq!(back, path);
        }
    }

    mod node_tests {
        use super::*;

        fn node(path: &str, children: Vec<MailboxNode>) -> MailboxNode {
            let path = MailboxPath::parse(path);
            MailboxNode {
                name: path.name().unwrap_or_default().to_string(),
                path,
                message_count: 0,
                unread_count: 0,
                children,
            }
        }

        #[test]
        fn leaf_serializes_without_children() {
            let json = serde_json::to_value(node("INBOX", vec![])).unwrap();
            assert!(json.get("children").is_none());
            assert_eq!(json["path"], "INBOX");
        }
    }
}
