//! Error types for claude-query.
//!
//! All fallible operations in this crate return [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`.
//!
//! Errors fall into four broad categories, exposed through [`Error::kind`]:
//!
//! | Kind | Raised | Variants |
//! |------|--------|----------|
//! | [`ErrorKind::InvalidRequest`] | before any process is spawned | `InvalidRequest`, `Config`, `AlreadyStarted` |
//! | [`ErrorKind::Transport`] | while connecting or streaming | `CliNotFound`, `VersionMismatch`, `SpawnFailed`, `ProcessExited`, `Io`, `Transport`, `Timeout` |
//! | [`ErrorKind::Protocol`] | on malformed stream content | `Protocol`, `Json` |
//! | [`ErrorKind::Cancelled`] | on token cancellation | `Cancelled` |
//!
//! Transport and protocol errors are terminal for a stream. Nothing in this
//! crate retries.
//!
//! # Example
//!
//! ```rust
//! use claude_query::{Error, ErrorKind, Result};
//!
//! fn might_fail() -> Result<()> {
//!     Err(Error::InvalidRequest("prompt must not be empty".into()))
//! }
//!
//! assert_eq!(might_fail().unwrap_err().kind(), ErrorKind::InvalidRequest);
//! ```

/// Maximum number of characters of a raw frame kept in [`Error::Protocol`].
const MAX_LINE_EXCERPT: usize = 200;

/// All errors that can be produced by claude-query.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The query request is malformed (empty prompt, unknown model, bad option).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A client configuration value is absent or out of range.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// [`Client::open`](crate::Client::open) was called on a client whose
    /// query has already been started.
    #[error("Query already started; a client can be opened only once")]
    AlreadyStarted,

    /// The Claude Code CLI binary was not found.
    ///
    /// Install it with: `npm install -g @anthropic-ai/claude-code`
    #[error("Claude Code CLI not found. Install: npm install -g @anthropic-ai/claude-code")]
    CliNotFound,

    /// The discovered CLI version is below the minimum required.
    #[error("CLI version {found} below minimum {required}")]
    VersionMismatch {
        /// The version that was discovered on the system.
        found: String,
        /// The minimum version required.
        required: String,
    },

    /// The OS failed to spawn the CLI process.
    #[error("Failed to spawn Claude process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// The CLI process exited with a non-zero (or missing) status code.
    ///
    /// `code` is `None` when the process was killed by a signal.
    #[error("Claude process exited with code {code:?}: {stderr}")]
    ProcessExited {
        /// The exit code, or `None` if the process was killed by a signal.
        code: Option<i32>,
        /// Tail of the captured stderr output.
        stderr: String,
    },

    /// A frame of the message stream is not a well-formed message.
    #[error("Protocol error: {message} (line: {line})")]
    Protocol {
        /// Human-readable description of the failure.
        message: String,
        /// The offending raw frame, truncated to 200 characters.
        line: String,
    },

    /// Transparent wrapper around [`std::io::Error`].
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transparent wrapper around [`serde_json::Error`].
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The connection to the CLI failed or was lost.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An async operation exceeded its deadline.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The operation was cancelled via a [`CancellationToken`](tokio_util::sync::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,
}

/// Convenience alias so callers can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input; raised before any network or process activity.
    InvalidRequest,
    /// Connection-level failure; terminal for the stream.
    Transport,
    /// Malformed stream content; terminal for the stream.
    Protocol,
    /// Cooperative cancellation by the caller.
    Cancelled,
}

// ── Helpers ──────────────────────────────────────────────────────────────────

impl Error {
    /// Build a [`Error::Protocol`], truncating `line` to a short excerpt.
    pub fn protocol(message: impl Into<String>, line: &str) -> Self {
        let line = match line.char_indices().nth(MAX_LINE_EXCERPT) {
            Some((idx, _)) => format!("{}...", &line[..idx]),
            None => line.to_owned(),
        };
        Self::Protocol {
            message: message.into(),
            line,
        }
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) | Self::Config(_) | Self::AlreadyStarted => {
                ErrorKind::InvalidRequest
            }
            Self::Protocol { .. } | Self::Json(_) => ErrorKind::Protocol,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::CliNotFound
            | Self::VersionMismatch { .. }
            | Self::SpawnFailed(_)
            | Self::ProcessExited { .. }
            | Self::Io(_)
            | Self::Transport(_)
            | Self::Timeout(_) => ErrorKind::Transport,
        }
    }

    /// Returns `true` for connection-level failures.
    #[inline]
    #[must_use]
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// Returns `true` for malformed stream content.
    #[inline]
    #[must_use]
    pub fn is_protocol(&self) -> bool {
        self.kind() == ErrorKind::Protocol
    }

    /// Returns `true` if this error indicates the operation was cancelled.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_not_found_display_has_install_hint() {
        let e = Error::CliNotFound;
        assert!(
            e.to_string().contains("npm install -g @anthropic-ai/claude-code"),
            "message should include install hint, got: {e}"
        );
    }

    #[test]
    fn invalid_request_display() {
        let e = Error::InvalidRequest("prompt must not be empty".into());
        assert!(e.to_string().contains("prompt must not be empty"));
    }

    #[test]
    fn process_exited_display_with_code() {
        let e = Error::ProcessExited {
            code: Some(1),
            stderr: "fatal error".to_owned(),
        };
        let s = e.to_string();
        assert!(s.contains('1'));
        assert!(s.contains("fatal error"));
    }

    #[test]
    fn protocol_keeps_short_lines() {
        let e = Error::protocol("unexpected token", "{bad json}");
        match &e {
            Error::Protocol { message, line } => {
                assert_eq!(message, "unexpected token");
                assert_eq!(line, "{bad json}");
            }
            other => panic!("expected Protocol, got {other:?}"),
        }
        assert!(e.to_string().contains("{bad json}"));
    }

    #[test]
    fn protocol_truncates_long_lines_on_char_boundary() {
        let raw = "é".repeat(500);
        let Error::Protocol { line, .. } = Error::protocol("too long", &raw) else {
            panic!("expected Protocol");
        };
        assert!(line.ends_with("..."));
        assert_eq!(line.trim_end_matches("...").chars().count(), 200);
    }

    #[test]
    fn kind_classification() {
        assert_eq!(
            Error::InvalidRequest("x".into()).kind(),
            ErrorKind::InvalidRequest
        );
        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::InvalidRequest);
        assert_eq!(Error::AlreadyStarted.kind(), ErrorKind::InvalidRequest);
        assert_eq!(Error::Transport("x".into()).kind(), ErrorKind::Transport);
        assert_eq!(Error::Timeout("x".into()).kind(), ErrorKind::Transport);
        assert_eq!(Error::CliNotFound.kind(), ErrorKind::Transport);
        assert_eq!(Error::protocol("x", "y").kind(), ErrorKind::Protocol);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn io_and_json_errors_convert() {
        let io = Error::from(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe broken",
        ));
        assert!(io.is_transport());
        assert!(io.to_string().contains("I/O error"));

        let json: serde_json::Error =
            serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let e = Error::from(json);
        assert!(e.is_protocol());
        assert!(e.to_string().contains("JSON error"));
    }

    #[test]
    fn is_cancelled_only_for_cancelled() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Timeout("x".into()).is_cancelled());
        assert!(!Error::Cancelled.is_transport());
    }
}
