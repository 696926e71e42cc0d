#![warn(missing_docs)]
//! # claude-query
//!
//! Streaming one-shot queries against the [Claude Code CLI].
//!
//! A query is a prompt plus a model identifier. The CLI runs it and streams
//! back NDJSON messages; this crate turns that output into an ordered stream
//! of typed [`Message`]s, recognises the session announced by the
//! `system`/`init` message, and forwards each message to a sink.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use claude_query::{ClientConfig, ConsoleSink, QueryRequest, run_query};
//!
//! #[tokio::main]
//! async fn main() -> claude_query::Result<()> {
//!     let request = QueryRequest::builder()
//!         .prompt("Hi")
//!         .model("claude-3-5-haiku-20241022")
//!         .build()?;
//!     // Prints "Session started with ID: …" and every message as JSON.
//!     run_query(request, ClientConfig::default(), ConsoleSink::stdout()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Layers
//!
//! | Layer | Type | Role |
//! |-------|------|------|
//! | request | [`QueryRequest`] | validated, immutable prompt + model + options |
//! | transport | [`Transport`], [`CliTransport`] | spawns the CLI, frames stdout |
//! | stream | [`MessageStream`] | decodes frames, releases the transport |
//! | session | [`SessionTracker`] | records the session id once |
//! | dispatch | [`Dispatcher`], [`MessageSink`] | delivers messages in order |
//! | client | [`Client`] | ties it together, tracks [`QueryState`] |
//!
//! ## Timeouts
//!
//! All timeouts are configurable via [`ClientConfig`]:
//!
//! | Timeout | Default | Purpose |
//! |---------|---------|---------|
//! | `connect_timeout` | 30s | Deadline for spawning the CLI |
//! | `close_timeout` | 10s | Deadline for the process to exit; kills on expiry |
//! | `read_timeout` | None | Per-message recv deadline (detects hung processes) |
//!
//! Set any `Option<Duration>` to `None` to wait indefinitely.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events and never installs a subscriber.
//!
//! ## Feature flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `testing` | Enables `testing` utilities (`MockTransport`, `ScenarioBuilder`, builders) |
//!
//! [Claude Code CLI]: https://www.anthropic.com/claude-code

pub mod client;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod errors;
pub mod request;
pub mod session;
pub mod stream;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ── Top-level re-exports ────────────────────────────────────────────────────

// Core
pub use client::Client;
pub use config::{ClientConfig, StderrCallback};
pub use errors::{Error, ErrorKind, Result};
pub use request::{IntoModel, Model, QueryRequest, QueryRequestBuilder};

// Streaming and dispatch
pub use dispatch::{ConsoleSink, Dispatcher, MessageSink, QueryOutcome};
pub use session::{Session, SessionTracker};
pub use stream::{MessageStream, QueryState};

// Content types
pub use types::content::{ContentBlock, TextBlock, ThinkingBlock, ToolResultBlock, ToolUseBlock};

// Message types
pub use types::messages::{
    AssistantMessage, AssistantMessageInner, Message, RateLimitEvent, ResultMessage, StreamEvent,
    SystemMessage, UnknownMessage, Usage, UserMessage,
};

// Discovery
pub use discovery::{check_cli_version, ensure_cli_version, find_cli};

// Transport
pub use transport::{CliTransport, Transport};

// Cancellation
pub use tokio_util::sync::CancellationToken;

// ── Top-level free functions ────────────────────────────────────────────────

/// Start a query and return its message stream.
///
/// Spawns the CLI for `request` and connects. Dropping the stream early
/// stops the process.
///
/// # Example
///
/// ```rust,no_run
/// use claude_query::{query_stream, ClientConfig, QueryRequest};
/// use tokio_stream::StreamExt;
///
/// # async fn example() -> claude_query::Result<()> {
/// let request = QueryRequest::builder()
///     .prompt("Explain async/await in Rust")
///     .model("sonnet")
///     .build()?;
/// let mut stream = query_stream(request, ClientConfig::default()).await?;
///
/// while let Some(msg) = stream.next().await {
///     if let Some(text) = msg?.assistant_text() {
///         print!("{text}");
///     }
/// }
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns [`Error`] if the configuration is invalid, the CLI cannot be
/// found, or connecting fails.
#[must_use = "the future must be awaited to run the query"]
pub async fn query_stream(request: QueryRequest, config: ClientConfig) -> Result<MessageStream> {
    Client::new(request, config)?.open().await
}

/// Run a query to completion and collect every message.
///
/// # Errors
///
/// Everything [`query_stream()`] returns, plus the first error the stream
/// yields. Messages received before the error are discarded.
#[must_use = "the future must be awaited to run the query"]
pub async fn query(request: QueryRequest, config: ClientConfig) -> Result<Vec<Message>> {
    use tokio_stream::StreamExt;

    let mut stream = query_stream(request, config).await?;
    let mut messages = Vec::new();
    while let Some(msg) = stream.next().await {
        messages.push(msg?);
    }
    Ok(messages)
}

/// Run a query and deliver every message to `sink`.
///
/// The sink is told about the session once, when the init message arrives,
/// and then receives every message in order.
///
/// # Errors
///
/// Everything [`query_stream()`] returns, plus the first error the stream
/// yields. Messages before the error have already reached the sink.
#[must_use = "the future must be awaited to run the query"]
pub async fn run_query<S: MessageSink>(
    request: QueryRequest,
    config: ClientConfig,
    sink: S,
) -> Result<QueryOutcome> {
    let stream = query_stream(request, config).await?;
    Dispatcher::new(sink).run(stream).await
}

// ── Tests ────────────────────────────────────────────────────────────────────
