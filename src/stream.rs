//! The message stream: decoded, ordered messages from a connected transport.
//!
//! [`MessageStream`] is what [`Client::open()`](crate::Client::open) returns.
//! It pulls JSON frames from the [`Transport`], decodes each into a
//! [`Message`], and hands them out one at a time. The stream is lazy: nothing
//! is read until the consumer polls.
//!
//! # Release
//!
//! The transport is closed exactly once, whichever way the stream ends:
//!
//! - end of input: closed before the stream reports its end, and a failing
//!   close (e.g. a non-zero exit) is yielded as the final error
//! - transport, protocol, timeout or cancellation error: closed before the
//!   error is yielded
//! - dropped early by the consumer: the close is spawned on the current
//!   Tokio runtime

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::errors::{Error, Result};
use crate::transport::Transport;
use crate::types::messages::Message;

type FrameStream = Pin<Box<dyn Stream<Item = Result<serde_json::Value>> + Send>>;

// ── Query state ──────────────────────────────────────────────────────────────

/// Lifecycle of one query.
///
/// ```text
/// Idle → Requesting → Streaming → Completed
///             │            │
///             └────────────┴────→ Failed
/// ```
///
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum QueryState {
    /// Built, not yet opened.
    Idle = 0,
    /// Connecting the transport.
    Requesting = 1,
    /// Connected; messages are being read.
    Streaming = 2,
    /// The stream ended gracefully and the process exited cleanly.
    Completed = 3,
    /// Connecting or streaming failed, timed out, or was cancelled.
    Failed = 4,
}

impl QueryState {
    /// Returns `true` for `Completed` and `Failed`.
    #[must_use]
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Requesting,
            2 => Self::Streaming,
            3 => Self::Completed,
            _ => Self::Failed,
        }
    }
}

impl std::fmt::Display for QueryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Shared, lock-free cell holding a [`QueryState`].
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl Default for StateCell {
    fn default() -> Self {
        Self(Arc::new(AtomicU8::new(QueryState::Idle as u8)))
    }
}

impl StateCell {
    pub(crate) fn get(&self) -> QueryState {
        QueryState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: QueryState) {
        let previous = QueryState::from_u8(self.0.swap(state as u8, Ordering::AcqRel));
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "query state changed");
        }
    }

    /// Move `from → to` atomically. Returns `false` if the state was not `from`.
    pub(crate) fn transition(&self, from: QueryState, to: QueryState) -> bool {
        let moved = self
            .0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            tracing::debug!(from = %from, to = %to, "query state changed");
        }
        moved
    }
}

// ── Frame helpers ────────────────────────────────────────────────────────────

/// Wait for the token to fire, or pend forever if `None`.
///
/// Useful as a `tokio::select!` branch that compiles away when no token is
/// provided.
pub(crate) async fn cancelled_or_pending(token: Option<&CancellationToken>) {
    match token {
        Some(t) => t.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Next frame with an optional per-frame timeout and cancellation token.
///
/// `None` means the transport reached end of input.
async fn next_frame(
    frames: &mut FrameStream,
    timeout: Option<Duration>,
    cancel: Option<&CancellationToken>,
) -> Option<Result<serde_json::Value>> {
    tokio::select! {
        biased;
        _ = cancelled_or_pending(cancel) => Some(Err(Error::Cancelled)),
        frame = async {
            match timeout {
                Some(d) => tokio::time::timeout(d, frames.next())
                    .await
                    .unwrap_or_else(|_| Some(Err(Error::Timeout(format!(
                        "read timed out after {}s",
                        d.as_secs_f64()
                    ))))),
                None => frames.next().await,
            }
        } => frame,
    }
}

// ── Release guard ────────────────────────────────────────────────────────────

/// Owns the transport until it has been closed, exactly once.
struct ReleaseGuard {
    transport: Option<Arc<dyn Transport>>,
    state: StateCell,
}

impl ReleaseGuard {
    async fn release(&mut self) -> Result<Option<i32>> {
        match self.transport.take() {
            Some(transport) => transport.close().await,
            None => Ok(None),
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let Some(transport) = self.transport.take() else {
            return;
        };
        self.state.transition(QueryState::Streaming, QueryState::Failed);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("message stream dropped early, closing transport");
                handle.spawn(async move {
                    if let Err(e) = transport.close().await {
                        tracing::debug!(error = %e, "close after early drop failed");
                    }
                });
            }
            Err(_) => tracing::warn!(
                "message stream dropped outside a Tokio runtime; transport was not closed"
            ),
        }
    }
}

// ── MessageStream ────────────────────────────────────────────────────────────

/// Ordered, finite stream of [`Message`]s for one query.
///
/// Yields `Ok(message)` per frame. The first error is terminal: it is
/// yielded once and the stream ends. See the [module docs](self) for how the
/// transport is released.
pub struct MessageStream {
    inner: Pin<Box<dyn Stream<Item = Result<Message>> + Send>>,
    state: StateCell,
}

impl std::fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream")
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl MessageStream {
    /// Wrap a connected transport. The state cell should read `Streaming`.
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        state: StateCell,
        read_timeout: Option<Duration>,
        cancel: Option<CancellationToken>,
    ) -> Self {
        let mut frames = transport.read_messages();
        let mut guard = ReleaseGuard {
            transport: Some(transport),
            state: state.clone(),
        };
        let cell = state.clone();

        let inner = async_stream::stream! {
            let failure = loop {
                match next_frame(&mut frames, read_timeout, cancel.as_ref()).await {
                    None => break None,
                    Some(Err(e)) => break Some(e),
                    Some(Ok(value)) => match Message::from_value(value) {
                        Ok(message) => {
                            tracing::debug!(kind = message.kind(), "message received");
                            yield Ok(message);
                        }
                        Err(e) => break Some(e),
                    },
                }
            };
            drop(frames);

            let closed = guard.release().await;
            match failure {
                Some(e) => {
                    if let Err(close_err) = closed {
                        tracing::debug!(error = %close_err, "close after stream failure also failed");
                    }
                    tracing::debug!(error = %e, "message stream failed");
                    cell.set(QueryState::Failed);
                    yield Err(e);
                }
                None => match closed {
                    Ok(code) => {
                        tracing::debug!(exit_code = ?code, "message stream completed");
                        cell.set(QueryState::Completed);
                    }
                    Err(e) => {
                        cell.set(QueryState::Failed);
                        yield Err(e);
                    }
                },
            }
        };

        Self {
            inner: Box::pin(inner),
            state,
        }
    }

    /// Current state of the query this stream belongs to.
    #[must_use]
    pub fn state(&self) -> QueryState {
        self.state.get()
    }
}

impl Stream for MessageStream {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
