//! Message dispatch: delivering a stream's messages to a sink.
//!
//! A [`Dispatcher`] sits between a [`MessageStream`] and a caller-supplied
//! [`MessageSink`]. Every message first passes the [`SessionTracker`], and
//! the sink hears about the session once, before the message that announced
//! it. Messages are then handed over unchanged, in arrival order.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> claude_query::Result<()> {
//! use claude_query::{Client, ClientConfig, ConsoleSink, Dispatcher, QueryRequest};
//!
//! let request = QueryRequest::builder()
//!     .prompt("Hi")
//!     .model("claude-3-5-haiku-20241022")
//!     .build()?;
//! let client = Client::new(request, ClientConfig::default())?;
//! let stream = client.open().await?;
//!
//! let outcome = Dispatcher::new(ConsoleSink::stdout()).run(stream).await?;
//! println!("delivered {} messages", outcome.delivered);
//! # Ok(())
//! # }
//! ```

use std::io::Write;
use std::sync::Mutex;

use tokio_stream::StreamExt;

use crate::errors::Result;
use crate::session::{Session, SessionTracker};
use crate::stream::MessageStream;
use crate::types::messages::Message;

// ── Sink ─────────────────────────────────────────────────────────────────────

/// Receiver of a query's messages.
///
/// Any `Fn(Message) + Send + Sync` closure is a sink; it ignores the session
/// notification.
pub trait MessageSink: Send + Sync {
    /// Called once, when the session is first observed, before the
    /// init message itself is passed to [`on_message`](Self::on_message).
    fn on_session_start(&self, session: &Session) {
        let _ = session;
    }

    /// Called for every message, in stream order.
    fn on_message(&self, message: Message);
}

impl<F> MessageSink for F
where
    F: Fn(Message) + Send + Sync,
{
    fn on_message(&self, message: Message) {
        self(message);
    }
}

/// Sink that prints the session line and each message as compact JSON.
///
/// Output for a typical query:
///
/// ```text
/// Session started with ID: 3f2c…
/// {"type":"system","subtype":"init","session_id":"3f2c…",…}
/// {"type":"assistant",…}
/// {"type":"result",…}
/// ```
///
/// The init message is reported twice: once as the session line and
/// once as its own JSON line.
pub struct ConsoleSink<W: Write + Send> {
    out: Mutex<W>,
}

impl ConsoleSink<std::io::Stdout> {
    /// Sink writing to standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    /// Sink writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            out: Mutex::new(writer),
        }
    }

    /// Consume the sink and return its writer.
    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_line(&self, line: std::fmt::Arguments<'_>) {
        let mut out = self
            .out
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = out.write_fmt(line).and_then(|()| out.write_all(b"\n")) {
            tracing::warn!(error = %e, "console sink write failed");
        }
    }
}

impl<W: Write + Send> std::fmt::Debug for ConsoleSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSink").finish_non_exhaustive()
    }
}

impl<W: Write + Send> MessageSink for ConsoleSink<W> {
    fn on_session_start(&self, session: &Session) {
        self.write_line(format_args!("Session started with ID: {}", session.id));
    }

    fn on_message(&self, message: Message) {
        self.write_line(format_args!("{message}"));
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────────────

/// Summary of a dispatch run that reached the end of its stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutcome {
    /// The session announced by the stream, if any.
    pub session: Option<Session>,
    /// Number of messages handed to the sink.
    pub delivered: usize,
}

/// Forwards messages to a [`MessageSink`] after session inspection.
#[derive(Debug)]
pub struct Dispatcher<S: MessageSink> {
    sink: S,
    tracker: SessionTracker,
    delivered: usize,
}

impl<S: MessageSink> Dispatcher<S> {
    /// Dispatcher delivering to `sink`.
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            tracker: SessionTracker::new(),
            delivered: 0,
        }
    }

    /// Deliver one message.
    pub fn dispatch(&mut self, message: Message) {
        if let Some(session) = self.tracker.observe(&message) {
            self.sink.on_session_start(session);
        }
        self.sink.on_message(message);
        self.delivered += 1;
    }

    /// The session observed so far.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.tracker.session()
    }

    /// Number of messages delivered so far.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Borrow the sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume the dispatcher and return the sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Drive `stream` to its end, delivering every message.
    ///
    /// Each run starts with no session and a zero count, so a dispatcher can
    /// be reused for the next query. On a stream error, every message
    /// received before it has already been delivered; the error is returned
    /// as is.
    pub async fn run(&mut self, mut stream: MessageStream) -> Result<QueryOutcome> {
        self.tracker = SessionTracker::new();
        self.delivered = 0;
        while let Some(item) = stream.next().await {
            self.dispatch(item?);
        }
        Ok(QueryOutcome {
            session: self.tracker.session().cloned(),
            delivered: self.delivered,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
