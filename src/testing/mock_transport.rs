//! In-memory mock transport for deterministic testing.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::errors::{Error, Result};
use crate::transport::Transport;

/// One scripted step of a [`MockTransport`] stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFrame {
    /// A raw NDJSON line, parsed like the CLI's stdout.
    Line(String),
    /// A connection fault; the stream ends after it.
    Fault(String),
    /// Never produce anything again (until the consumer goes away).
    Stall,
}

/// An in-memory transport for deterministic testing.
///
/// Script frames with [`enqueue`](Self::enqueue),
/// [`enqueue_fault`](Self::enqueue_fault) and
/// [`enqueue_stall`](Self::enqueue_stall), then hand the transport to a
/// [`Client`](crate::Client). [`close_count`](Self::close_count) reports how
/// often the connection was released.
pub struct MockTransport {
    frames: Mutex<VecDeque<MockFrame>>,
    ready: AtomicBool,
    closes: AtomicUsize,
    connect_delay: Mutex<Option<Duration>>,
    connect_error: Mutex<Option<String>>,
    recv_delay: Mutex<Option<Duration>>,
    exit_code: Mutex<Option<i32>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("queued", &self.queued_count())
            .field("ready", &self.ready.load(Ordering::Relaxed))
            .field("closes", &self.closes.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create an empty transport that exits cleanly on close.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            ready: AtomicBool::new(false),
            closes: AtomicUsize::new(0),
            connect_delay: Mutex::new(None),
            connect_error: Mutex::new(None),
            recv_delay: Mutex::new(None),
            exit_code: Mutex::new(Some(0)),
        }
    }

    /// Enqueue a raw JSON line.
    pub fn enqueue(&self, json: &str) {
        self.push(MockFrame::Line(json.to_owned()));
    }

    /// Enqueue a serializable value as one JSON line.
    pub fn enqueue_value(&self, value: &impl serde::Serialize) {
        let json = serde_json::to_string(value).expect("serialize");
        self.enqueue(&json);
    }

    /// Enqueue a connection fault.
    pub fn enqueue_fault(&self, message: &str) {
        self.push(MockFrame::Fault(message.to_owned()));
    }

    /// Enqueue a stall: the stream stays open without producing more frames.
    pub fn enqueue_stall(&self) {
        self.push(MockFrame::Stall);
    }

    fn push(&self, frame: MockFrame) {
        self.frames.lock().expect("lock").push_back(frame);
    }

    /// Delay [`connect()`](Transport::connect) by `delay`.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().expect("lock") = Some(delay);
    }

    /// Make [`connect()`](Transport::connect) fail with a transport error.
    pub fn fail_connect(&self, message: &str) {
        *self.connect_error.lock().expect("lock") = Some(message.to_owned());
    }

    /// Delay every frame by `delay`.
    pub fn set_recv_delay(&self, delay: Duration) {
        *self.recv_delay.lock().expect("lock") = Some(delay);
    }

    /// Exit code reported on close. A non-zero code makes close fail with
    /// [`Error::ProcessExited`], like the real CLI transport.
    pub fn set_exit_code(&self, code: Option<i32>) {
        *self.exit_code.lock().expect("lock") = code;
    }

    /// Number of frames not yet handed to a stream.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.frames.lock().expect("lock").len()
    }

    /// Number of times [`close()`](Transport::close) was called.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::Acquire)
    }

    /// Returns `true` once the transport has been closed at least once.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<()> {
        let delay = *self.connect_delay.lock().expect("lock");
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if let Some(message) = self.connect_error.lock().expect("lock").clone() {
            return Err(Error::Transport(message));
        }
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    fn read_messages(&self) -> Pin<Box<dyn Stream<Item = Result<serde_json::Value>> + Send>> {
        let frames: Vec<MockFrame> = self.frames.lock().expect("lock").drain(..).collect();
        let recv_delay = *self.recv_delay.lock().expect("lock");
        let (tx, rx) = mpsc::channel(frames.len().max(1));

        tokio::spawn(async move {
            for frame in frames {
                if let Some(delay) = recv_delay {
                    tokio::time::sleep(delay).await;
                }
                let item = match frame {
                    MockFrame::Line(line) => serde_json::from_str::<serde_json::Value>(&line)
                        .map_err(|e| Error::protocol(e.to_string(), &line)),
                    MockFrame::Fault(message) => {
                        let _ = tx.send(Err(Error::Transport(message))).await;
                        return;
                    }
                    MockFrame::Stall => {
                        tx.closed().await;
                        return;
                    }
                };
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<Option<i32>> {
        self.ready.store(false, Ordering::Release);
        self.closes.fetch_add(1, Ordering::AcqRel);
        match *self.exit_code.lock().expect("lock") {
            Some(code) if code != 0 => Err(Error::ProcessExited {
                code: Some(code),
                stderr: String::new(),
            }),
            code => Ok(code),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[test]
    fn enqueue_increments_count() {
        let t = MockTransport::new();
        t.enqueue(r#"{"type":"system"}"#);
        t.enqueue_fault("boom");
        t.enqueue_stall();
        assert_eq!(t.queued_count(), 3);
    }

    #[tokio::test]
    async fn connect_sets_ready_and_close_counts() {
        let t = MockTransport::new();
        assert!(!t.is_ready());
        t.connect().await.unwrap();
        assert!(t.is_ready());
        assert_eq!(t.close().await.unwrap(), Some(0));
        assert!(!t.is_ready());
        assert_eq!(t.close_count(), 1);
    }

    #[tokio::test]
    async fn connect_failure_is_a_transport_error() {
        let t = MockTransport::new();
        t.fail_connect("refused");
        let err = t.connect().await.unwrap_err();
        assert!(err.is_transport());
        assert!(!t.is_ready());
    }

    #[tokio::test]
    async fn read_messages_yields_lines_then_fault() {
        let t = MockTransport::new();
        t.enqueue(r#"{"type":"system","subtype":"init","session_id":"s1"}"#);
        t.enqueue("not json");
        t.enqueue_fault("reset");
        t.enqueue(r#"{"type":"result"}"#);

        let items: Vec<_> = t.read_messages().collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap()["type"], "system");
        assert!(items[1].as_ref().unwrap_err().is_protocol());
        assert!(matches!(items[2], Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn non_zero_exit_fails_close() {
        let t = MockTransport::new();
        t.set_exit_code(Some(2));
        let err = t.close().await.unwrap_err();
        assert!(matches!(err, Error::ProcessExited { code: Some(2), .. }));
    }
}
