//! Script execution against the mail client's automation interface.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::literal;
use crate::wire::APPLESCRIPT_ENCODER;

/// AppleScript error numbers meaning the application is not reachable.
const NOT_RUNNING_CODES: &[i32] = &[-600, -609, -10810];

/// AppleScript error number for an Apple event that timed out.
const EVENT_TIMEOUT_CODE: i32 = -1712;

/// Characters of raw output included in debug logs.
const LOG_PREVIEW_CHARS: usize = 500;

/// A complete script ready for execution.
///
/// The wire encoder handlers are always part of the source, so script
/// bodies can call `my rec(...)` directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    label: &'static str,
    body: String,
    long_running: bool,
}

impl Script {
    /// Creates a script from its body. `label` names the operation in logs.
    #[must_use]
    pub fn new(label: &'static str, body: impl Into<String>) -> Self {
        Self {
            label,
            body: body.into(),
            long_running: false,
        }
    }

    /// Marks the script as long-running (listing, search, batches).
    #[must_use]
    pub const fn long_running(mut self) -> Self {
        self.long_running = true;
        self
    }

    /// Operation label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }

    /// Script body without the encoder handlers.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Whether the long timeout applies.
    #[must_use]
    pub const fn is_long_running(&self) -> bool {
        self.long_running
    }

    /// Full source: encoder handlers followed by the body.
    #[must_use]
    pub fn source(&self) -> String {
        format!("{APPLESCRIPT_ENCODER}\n{}", self.body)
    }
}

/// Executes scripts and returns their raw textual output.
///
/// Implementations block the calling task until the script finishes or its
/// timeout elapses. Calls are expected to be issued one at a time.
pub trait Bridge {
    /// Runs `script` and returns its output with the interpreter's trailing
    /// newline removed.
    fn execute(&self, script: &Script) -> impl Future<Output = Result<String>> + Send;
}

/// Bridge that runs scripts through `osascript`.
///
/// Executions are serialized: the automation interface handles one script
/// at a time and interleaved scripts can corrupt each other's output.
#[derive(Debug)]
pub struct OsascriptBridge {
    config: BridgeConfig,
    gate: Mutex<()>,
}

impl OsascriptBridge {
    /// Creates a bridge with the given configuration.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            gate: Mutex::new(()),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Statement run before every script: launch the client or fail fast.
    fn prologue(&self) -> String {
        let app = literal::string(&self.config.application);
        if self.config.launch {
            format!("if application {app} is not running then tell application {app} to launch\n")
        } else {
            let message = literal::string(&format!("{} is not running", self.config.application));
            format!("if application {app} is not running then error {message} number -600\n")
        }
    }

    async fn run(&self, source: String, timeout: Duration) -> Result<String> {
        let mut child = Command::new(&self.config.program)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Io(std::io::Error::other("stdin not captured")))?;

        let exchange = async move {
            stdin.write_all(source.as_bytes()).await?;
            drop(stdin);
            Ok::<_, std::io::Error>(child.wait_with_output().await?)
        };

        let output = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| BridgeError::Timeout(timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&self.config.application, &stderr, timeout));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| BridgeError::mismatch("script output is not valid UTF-8"))?;
        Ok(strip_trailing_newline(stdout))
    }
}

impl Bridge for OsascriptBridge {
    async fn execute(&self, script: &Script) -> Result<String> {
        let _turn = self.gate.lock().await;

        let timeout = if script.is_long_running() {
            self.config.long_timeout
        } else {
            self.config.timeout
        };
        let source = format!("{}{}", self.prologue(), script.source());
        debug!(script = script.label(), ?timeout, "executing script:\n{}", script.body());

        match self.run(source, timeout).await {
            Ok(output) => {
                debug!(
                    script = script.label(),
                    bytes = output.len(),
                    "script output: {:?}",
                    preview(&output)
                );
                Ok(output)
            }
            Err(e) => {
                error!(script = script.label(), "script failed: {e}");
                Err(e)
            }
        }
    }
}

/// Maps interpreter stderr to a [`BridgeError`].
///
/// `osascript` reports failures as `NNN:NNN: execution error: <message> (<code>)`.
#[must_use]
pub fn classify_failure(application: &str, stderr: &str, timeout: Duration) -> BridgeError {
    let trimmed = stderr.trim();
    let message = trimmed
        .split_once("execution error: ")
        .map_or(trimmed, |(_, rest)| rest);

    let (message, code) = match message.rsplit_once(" (") {
        Some((text, tail)) => match tail.strip_suffix(')').and_then(|n| n.parse::<i32>().ok()) {
            Some(code) => (text, Some(code)),
            None => (message, None),
        },
        None => (message, None),
    };

    let message = if message.is_empty() {
        "unknown AppleScript error".to_string()
    } else {
        message.to_string()
    };

    match code {
        Some(c) if NOT_RUNNING_CODES.contains(&c) => BridgeError::NotRunning {
            application: application.to_string(),
            message,
        },
        Some(EVENT_TIMEOUT_CODE) => BridgeError::Timeout(timeout),
        code => BridgeError::Script { code, message },
    }
}

fn strip_trailing_newline(mut output: String) -> String {
    if output.ends_with('\n') {
        output.pop();
    }
    output
}

fn preview(output: &str) -> &str {
    output
        .char_indices()
        .nth(LOG_PREVIEW_CHARS)
        .map_or(output, |(i, _)| &output[..i])
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

    const TIMEOUT: Duration = Duration::from_secs(30);

    mod classify_tests {
        use super::*;

        #[test]
        fn script_error_with_code() {
            let err = classify_failure(
                "Mail",
                "120:140: execution error: Mail got an error: Can’t get mailbox \"Nope\". (-1728)\n",
                TIMEOUT,
            );
            match err {
                BridgeError::Script { code, message } => {
                    assert_eq!(code, Some(-1728));
                    assert_eq!(message, "Mail got an error: Can’t get mailbox \"Nope\".");
                }
                other => panic!("unexpected: {other:?}"),
            }
        }

        #[test]
        fn not_running() {
            let err = classify_failure(
                "Mail",
                "0:10: execution error: Mail is not running (-600)",
                TIMEOUT,
            );
            match err {
                BridgeError::NotRunning { application, .. } => assert_eq!(application, "Mail"),
                other => panic!("unexpected: {other:?}"),
            }
        }

        #[test]
        fn event_timeout() {
            let err = classify_failure(
                "Mail",
                "execution error: Mail got an error: AppleEvent timed out. (-1712)",
                TIMEOUT,
            );
            assert!(matches!(err, BridgeError::Timeout(d) if d == TIMEOUT));
        }

        #[test]
        fn syntax_error_without_code() {
            let err =
                classify_failure("Mail", "12:15: syntax error: Expected end of line.", TIMEOUT);
            match err {
                BridgeError::Script { code, message } => {
                    assert_eq!(code, None);
                    assert!(message.contains("syntax error"));
                }
                other => panic!("unexpected: {other:?}"),
            }
        }

        #[test]
        fn empty_stderr() {
            let err = classify_failure("Mail", "  \n", TIMEOUT);
            match err {
                BridgeError::Script { code, message } => {
                    assert_eq!(code, None);
                    assert_eq!(message, "unknown AppleScript error");
                }
                other => panic!("unexpected: {other:?}"),
            }
        }

        #[test]
        fn parenthesized_text_is_not_a_code() {
            let err = classify_failure("Mail", "execution error: bad thing (really)", TIMEOUT);
            match err {
                BridgeError::Script { code, message } => {
                    assert_eq!(code, None);
                    assert_eq!(message, "bad thing (really)");
                }
                other => panic!("unexpected: {other:?}"),
            }
        }
    }

    mod script_tests {
        use super::*;

        #[test]
        fn source_includes_encoder() {
            let script = Script::new("probe", "return my rec({\"ok\"})");
            assert!(script.source().contains("on rec(fields)"));
            assert!(script.source().ends_with("return my rec({\"ok\"})"));
            assert!(!script.is_long_running());
            assert!(script.long_running().is_long_running());
        }

        #[test]
        fn prologue_launches_by_default() {
            let bridge = OsascriptBridge::new(BridgeConfig::new());
            assert!(bridge.prologue().contains("to launch"));
        }

        #[test]
        fn prologue_fails_fast_without_launch() {
            let bridge = OsascriptBridge::new(BridgeConfig::builder().launch(false).build());
            let prologue = bridge.prologue();
            assert!(prologue.contains("number -600"));
            assert!(!prologue.contains("launch"));
        }

        #[test]
        fn trailing_newline_stripped_once() {
            assert_eq!(strip_trailing_newline("abc\n\n".into()), "abc\n");
            assert_eq!(strip_trailing_newline("abc".into()), "abc");
        }

        #[test]
        fn preview_truncates_on_char_boundary() {
            let long = "é".repeat(LOG_PREVIEW_CHARS + 10);
            assert_eq!(preview(&long).chars().count(), LOG_PREVIEW_CHARS);
        }
    }

    #[tokio::test]
    async fn missing_interpreter_is_io_error() {
        let bridge = OsascriptBridge::new(
            BridgeConfig::builder()
                .program("/nonexistent/mailbridge-osascript")
                .build(),
        );
        let err = bridge.execute(&Script::new("probe", "return \"\"")).await.unwrap_err();
        assert!(matches!(err, BridgeError::Io(_)));
    }
}
