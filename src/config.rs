//! Client configuration: `ClientConfig` with typed builder pattern.
//!
//! [`ClientConfig`] says *how* to run a query: where the CLI lives, which
//! directory and environment it runs in, and the timeouts and cancellation
//! that bound it. *What* to ask lives in [`QueryRequest`](crate::QueryRequest).
//! Every field has a default, so `ClientConfig::builder().build()` is a
//! complete configuration.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use claude_query::ClientConfig;
//!
//! let config = ClientConfig::builder()
//!     .read_timeout(Some(Duration::from_secs(120)))
//!     .build();
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

use crate::errors::{Error, Result};

/// Callback receiving each line the CLI writes to stderr.
pub type StderrCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Configuration for running a query through the Claude Code CLI.
///
/// Use [`ClientConfig::builder()`] to construct.
#[derive(TypedBuilder)]
pub struct ClientConfig {
    // ── Process ──────────────────────────────────────────────────────────
    /// Path to the Claude CLI binary. If `None`, auto-discovered via
    /// [`find_cli()`](crate::discovery::find_cli).
    #[builder(default, setter(strip_option, into))]
    pub cli_path: Option<PathBuf>,

    /// Working directory for the CLI process. Defaults to the current one.
    #[builder(default, setter(strip_option, into))]
    pub cwd: Option<PathBuf>,

    /// Extra environment variables for the CLI process. These override the
    /// defaults from [`to_env()`](Self::to_env).
    #[builder(default)]
    pub env: HashMap<String, String>,

    // ── Timeouts ─────────────────────────────────────────────────────────
    /// Deadline for establishing the connection. `None` = wait forever.
    ///
    /// Default: `Some(30s)`.
    #[builder(default_code = "Some(Duration::from_secs(30))")]
    pub connect_timeout: Option<Duration>,

    /// Deadline for the process to exit on close; on expiry it is killed.
    /// `None` = wait forever.
    ///
    /// Default: `Some(10s)`.
    #[builder(default_code = "Some(Duration::from_secs(10))")]
    pub close_timeout: Option<Duration>,

    /// Per-message receive deadline. `None` = wait forever (default).
    ///
    /// Meant for detecting a hung process, not for bounding the query:
    /// a single turn can legitimately take minutes.
    #[builder(default)]
    pub read_timeout: Option<Duration>,

    // ── Cancellation ─────────────────────────────────────────────────────
    /// Optional cancellation token. When cancelled, the stream yields
    /// [`Error::Cancelled`] and releases the connection.
    #[builder(default, setter(strip_option))]
    pub cancellation_token: Option<CancellationToken>,

    // ── Stderr ───────────────────────────────────────────────────────────
    /// Optional callback for CLI stderr output.
    #[builder(default, setter(strip_option))]
    pub stderr_callback: Option<StderrCallback>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("cli_path", &self.cli_path)
            .field("cwd", &self.cwd)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("connect_timeout", &self.connect_timeout)
            .field("close_timeout", &self.close_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("cancellable", &self.cancellation_token.is_some())
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    /// Validate the configuration.
    ///
    /// Checks that `cwd`, if set, is an existing directory, and that no
    /// timeout is zero. Called by [`Client::new()`](crate::Client::new).
    pub fn validate(&self) -> Result<()> {
        if let Some(ref cwd) = self.cwd {
            if !cwd.exists() {
                return Err(Error::Config(format!(
                    "working directory does not exist: {}",
                    cwd.display()
                )));
            }
            if !cwd.is_dir() {
                return Err(Error::Config(format!(
                    "working directory is not a directory: {}",
                    cwd.display()
                )));
            }
        }

        let timeouts = [
            ("connect_timeout", self.connect_timeout),
            ("close_timeout", self.close_timeout),
            ("read_timeout", self.read_timeout),
        ];
        for (name, timeout) in timeouts {
            if timeout == Some(Duration::ZERO) {
                return Err(Error::Config(format!(
                    "{name} must be non-zero (use None to wait forever)"
                )));
            }
        }
        Ok(())
    }

    /// Build the environment for the CLI process.
    ///
    /// Defaults (overridable through `env`):
    /// - `CLAUDE_CODE_SDK_ORIGINATOR=claude_query_rs`
    /// - `CI=true`: headless mode
    /// - `TERM=dumb`: no ANSI escapes in output
    #[must_use]
    pub fn to_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::from([
            ("CLAUDE_CODE_SDK_ORIGINATOR".to_owned(), "claude_query_rs".to_owned()),
            ("CI".to_owned(), "true".to_owned()),
            ("TERM".to_owned(), "dumb".to_owned()),
        ]);
        env.extend(self.env.clone());
        env
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
