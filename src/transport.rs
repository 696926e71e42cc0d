//! Transport layer: spawning the Claude CLI and reading its message stream.
//!
//! The [`Transport`] trait abstracts the connection between a query and the
//! Claude Code process. [`CliTransport`] is the production implementation: it
//! spawns the CLI in `--print` mode with `--output-format stream-json` and
//! reads NDJSON frames from its stdout.
//!
//! # Architecture
//!
//! `CliTransport::connect()` spawns the CLI, then starts a background reader
//! task that reads NDJSON lines from stdout and forwards parsed JSON values
//! through a `tokio::sync::mpsc` channel. `read_messages()` returns a
//! `ReceiverStream`, so no lock is held on the hot path. A second task drains
//! stderr into the log, the optional callback, and a bounded tail buffer
//! that is attached to [`Error::ProcessExited`].

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::{ClientConfig, StderrCallback};
use crate::errors::{Error, Result};
use crate::request::QueryRequest;

/// Capacity of the frame channel between the reader task and the stream.
const FRAME_CHANNEL_CAPACITY: usize = 256;

/// Number of stderr lines kept for [`Error::ProcessExited`].
const STDERR_TAIL_LINES: usize = 32;

/// How long `close()` waits for the stderr task to flush after exit.
const STDERR_DRAIN: Duration = Duration::from_millis(200);

// ── Transport Trait ──────────────────────────────────────────────────────────

/// Abstraction over the connection that carries one query's message stream.
///
/// Implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection (e.g., spawn the CLI process).
    async fn connect(&self) -> Result<()>;

    /// Return a stream of parsed JSON values, one per frame.
    ///
    /// The stream can be taken once; later calls return an empty stream.
    fn read_messages(&self) -> Pin<Box<dyn Stream<Item = Result<serde_json::Value>> + Send>>;

    /// Returns `true` if the transport is connected and ready.
    fn is_ready(&self) -> bool;

    /// Release the connection and wait for the process to exit.
    ///
    /// Returns the exit code if available. Closing an unconnected or
    /// already closed transport is a no-op.
    async fn close(&self) -> Result<Option<i32>>;
}

// ── CliTransport ─────────────────────────────────────────────────────────────

/// Production transport that spawns the Claude CLI as a subprocess.
///
/// The prompt travels on the command line, so stdin is not used.
pub struct CliTransport {
    cli_path: PathBuf,
    args: Vec<String>,
    cwd: PathBuf,
    env: HashMap<String, String>,
    close_timeout: Option<Duration>,
    // `process` uses `std::sync::Mutex` because the synchronous `Drop` impl
    // needs it.
    process: Mutex<Option<Child>>,
    message_rx: Mutex<Option<mpsc::Receiver<Result<serde_json::Value>>>>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    stderr_handle: Mutex<Option<JoinHandle<()>>>,
    stderr_callback: Option<StderrCallback>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    stdout_eof: Arc<AtomicBool>,
    ready: AtomicBool,
}

impl std::fmt::Debug for CliTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliTransport")
            .field("cli_path", &self.cli_path)
            .field("cwd", &self.cwd)
            .field("ready", &self.ready.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl CliTransport {
    /// Create a new `CliTransport` that runs `cli_path` with `args`.
    ///
    /// This does NOT spawn the process; call [`connect()`](Transport::connect) first.
    #[must_use]
    pub fn new(
        cli_path: PathBuf,
        args: Vec<String>,
        cwd: PathBuf,
        env: HashMap<String, String>,
        stderr_callback: Option<StderrCallback>,
    ) -> Self {
        Self {
            cli_path,
            args,
            cwd,
            env,
            close_timeout: None,
            process: Mutex::new(None),
            message_rx: Mutex::new(None),
            reader_handle: Mutex::new(None),
            stderr_handle: Mutex::new(None),
            stderr_callback,
            stderr_tail: Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES))),
            stdout_eof: Arc::new(AtomicBool::new(false)),
            ready: AtomicBool::new(false),
        }
    }

    /// Set the deadline for the process to exit on [`close()`](Transport::close).
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Create a transport that runs `request` under `config`.
    ///
    /// Resolves the CLI path (falling back to discovery), the working
    /// directory, and the process environment.
    pub fn from_request(request: &QueryRequest, config: &ClientConfig) -> Result<Self> {
        let cli_path = match &config.cli_path {
            Some(p) => p.clone(),
            None => crate::discovery::find_cli()?,
        };

        let cwd = config
            .cwd
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let transport = Self::new(
            cli_path,
            request.to_cli_args(),
            cwd,
            config.to_env(),
            config.stderr_callback.clone(),
        )
        .with_close_timeout(config.close_timeout);
        Ok(transport)
    }

    /// Snapshot of the captured stderr tail, oldest line first.
    #[must_use]
    pub fn stderr_tail(&self) -> String {
        lock(&self.stderr_tail)
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn spawn_reader(
        &self,
        stdout: tokio::process::ChildStdout,
        tx: mpsc::Sender<Result<serde_json::Value>>,
    ) -> JoinHandle<()> {
        let eof = Arc::clone(&self.stdout_eof);
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => {
                        eof.store(true, Ordering::Release);
                        break;
                    }
                    Ok(_) => {
                        let frame = match std::str::from_utf8(&buf) {
                            Ok(line) => {
                                let line = line.trim();
                                if line.is_empty() {
                                    continue;
                                }
                                serde_json::from_str::<serde_json::Value>(line)
                                    .map_err(|e| Error::protocol(e.to_string(), line))
                            }
                            Err(e) => Err(Error::protocol(
                                format!("stdout line is not valid UTF-8: {e}"),
                                &String::from_utf8_lossy(&buf),
                            )),
                        };
                        if tx.send(frame).await.is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => {
                        eof.store(true, Ordering::Release);
                        let _ = tx.send(Err(Error::Io(e))).await;
                        break;
                    }
                }
            }
        })
    }

    fn spawn_stderr(&self, stderr: tokio::process::ChildStderr) -> JoinHandle<()> {
        let callback = self.stderr_callback.clone();
        let tail = Arc::clone(&self.stderr_tail);
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            while matches!(reader.read_until(b'\n', &mut buf).await, Ok(n) if n > 0) {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_owned();
                buf.clear();
                tracing::debug!(target: "claude_query::stderr", "{line}");
                {
                    let mut tail = lock(&tail);
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line.clone());
                }
                if let Some(cb) = &callback {
                    cb(line);
                }
            }
        })
    }

    async fn drain_stderr(&self) {
        let handle = lock(&self.stderr_handle).take();
        if let Some(handle) = handle {
            if tokio::time::timeout(STDERR_DRAIN, handle).await.is_err() {
                tracing::debug!("stderr reader still open after process exit");
            }
        }
    }
}

#[async_trait]
impl Transport for CliTransport {
    async fn connect(&self) -> Result<()> {
        if self.ready.load(Ordering::Acquire) {
            return Err(Error::Transport("transport already connected".into()));
        }

        let mut cmd = tokio::process::Command::new(&self.cli_path);
        cmd.args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for (k, v) in &self.env {
            cmd.env(k, v);
        }

        // A child that inherits these thinks it is nested inside another
        // Claude Code session. Removed after the user env so they stay gone.
        cmd.env_remove("CLAUDECODE");
        cmd.env_remove("CLAUDE_CODE_SSE_PORT");
        cmd.env_remove("CLAUDE_CODE_ENTRYPOINT");

        tracing::debug!(cli = %self.cli_path.display(), args = ?self.args, "spawning CLI");
        let mut child = cmd.spawn().map_err(Error::SpawnFailed)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("failed to capture child stdout".into()))?;

        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let reader = self.spawn_reader(stdout, tx);
        let stderr = child.stderr.take().map(|s| self.spawn_stderr(s));

        *lock(&self.process) = Some(child);
        *lock(&self.message_rx) = Some(rx);
        *lock(&self.reader_handle) = Some(reader);
        *lock(&self.stderr_handle) = stderr;
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    fn read_messages(&self) -> Pin<Box<dyn Stream<Item = Result<serde_json::Value>> + Send>> {
        match lock(&self.message_rx).take() {
            Some(rx) => Box::pin(ReceiverStream::new(rx)),
            None => {
                tracing::debug!("read_messages() called after receiver was already taken");
                Box::pin(tokio_stream::empty())
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<Option<i32>> {
        self.ready.store(false, Ordering::Release);

        let reader = lock(&self.reader_handle).take();
        let Some(mut child) = lock(&self.process).take() else {
            return Ok(None);
        };

        // Stdout still open means the consumer gave up before the end of the
        // stream; there is nothing left to wait for.
        if !self.stdout_eof.load(Ordering::Acquire) {
            tracing::debug!("stream released early, killing CLI process");
            if let Some(handle) = reader {
                handle.abort();
            }
            let _ = child.kill().await;
            self.drain_stderr().await;
            return Ok(None);
        }

        let status = match self.close_timeout {
            Some(d) => match tokio::time::timeout(d, child.wait()).await {
                Ok(Ok(status)) => status,
                Ok(Err(e)) => return Err(Error::Transport(format!("wait failed: {e}"))),
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(Error::Timeout(format!(
                        "close timed out after {}s, process killed",
                        d.as_secs_f64()
                    )));
                }
            },
            None => child
                .wait()
                .await
                .map_err(|e| Error::Transport(format!("wait failed: {e}")))?,
        };

        self.drain_stderr().await;

        if status.success() {
            Ok(status.code())
        } else {
            tracing::warn!(code = ?status.code(), "CLI process exited unsuccessfully");
            Err(Error::ProcessExited {
                code: status.code(),
                stderr: self.stderr_tail(),
            })
        }
    }
}

impl Drop for CliTransport {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.process.lock() {
            if let Some(mut child) = guard.take() {
                let _ = child.start_kill();
            }
        }
    }
}

/// Lock a std mutex, recovering the data if a holder panicked.
#[inline]
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Model;
    use tokio_stream::StreamExt;

    fn unspawned() -> CliTransport {
        CliTransport::new(
            PathBuf::from("/usr/bin/claude"),
            vec![],
            PathBuf::from("/tmp"),
            HashMap::new(),
            None,
        )
    }

    #[cfg(unix)]
    fn shell(script: &str) -> CliTransport {
        CliTransport::new(
            PathBuf::from("/bin/sh"),
            vec!["-c".into(), script.into()],
            std::env::temp_dir(),
            HashMap::from([("CI".to_owned(), "true".to_owned())]),
            None,
        )
        .with_close_timeout(Some(Duration::from_secs(5)))
    }

    #[test]
    fn cli_transport_debug() {
        let debug = format!("{:?}", unspawned());
        assert!(debug.contains("claude"));
        assert!(debug.contains("/tmp"));
    }

    #[test]
    fn cli_transport_not_ready_before_connect() {
        assert!(!unspawned().is_ready());
    }

    #[tokio::test]
    async fn read_messages_is_empty_without_connect() {
        let items: Vec<_> = unspawned().read_messages().collect().await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn close_is_a_no_op_when_not_connected() {
        assert_eq!(unspawned().close().await.unwrap(), None);
    }

    #[test]
    fn from_request_uses_request_args_and_config() {
        let request = QueryRequest::builder()
            .prompt("Hi")
            .model(Model::Claude35Haiku)
            .build()
            .unwrap();
        let config = ClientConfig::builder()
            .cli_path("/opt/claude")
            .cwd("/tmp")
            .build();
        let t = CliTransport::from_request(&request, &config).unwrap();
        assert_eq!(t.cli_path, PathBuf::from("/opt/claude"));
        assert_eq!(t.cwd, PathBuf::from("/tmp"));
        assert_eq!(t.args, request.to_cli_args());
        assert_eq!(t.env["CI"], "true");
        assert_eq!(t.close_timeout, Some(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let t = CliTransport::new(
            PathBuf::from("/definitely/not/claude"),
            vec![],
            std::env::temp_dir(),
            HashMap::new(),
            None,
        );
        let err = t.connect().await.unwrap_err();
        assert!(matches!(err, Error::SpawnFailed(_)));
        assert!(err.is_transport());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reads_frames_in_order_and_exits_cleanly() {
        let t = shell(
            r#"echo '{"type":"system","subtype":"init","session_id":"abc"}'
echo ''
echo '{"type":"result","payload":"Hello"}'"#,
        );
        t.connect().await.unwrap();
        assert!(t.is_ready());

        let frames: Vec<_> = t.read_messages().collect().await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().unwrap()["session_id"], "abc");
        assert_eq!(frames[1].as_ref().unwrap()["payload"], "Hello");

        assert_eq!(t.close().await.unwrap(), Some(0));
        assert!(!t.is_ready());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn malformed_line_is_a_protocol_error() {
        let t = shell(r#"echo 'not json'; echo '{"type":"result"}'"#);
        t.connect().await.unwrap();
        let frames: Vec<_> = t.read_messages().collect().await;
        assert!(frames[0].as_ref().unwrap_err().is_protocol());
        assert!(frames[1].is_ok());
        t.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn invalid_utf8_line_is_a_protocol_error() {
        let t = shell(
            r#"echo '{"type":"system","subtype":"init","session_id":"abc"}'
printf '\377\376\n'
echo '{"type":"result"}'"#,
        );
        t.connect().await.unwrap();
        let frames: Vec<_> = t.read_messages().collect().await;
        assert_eq!(frames.len(), 3);
        assert!(frames[0].is_ok());
        let err = frames[1].as_ref().unwrap_err();
        assert!(err.is_protocol(), "got: {err:?}");
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);
        assert!(frames[2].is_ok());
        t.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn environment_is_passed_through() {
        let t = shell(r#"echo "{\"ci\":\"$CI\"}""#);
        t.connect().await.unwrap();
        let frames: Vec<_> = t.read_messages().collect().await;
        assert_eq!(frames[0].as_ref().unwrap()["ci"], "true");
        t.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_stderr_tail() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let t = CliTransport::new(
            PathBuf::from("/bin/sh"),
            vec!["-c".into(), "echo boom >&2; exit 3".into()],
            std::env::temp_dir(),
            HashMap::new(),
            Some(Arc::new(move |line| sink.lock().unwrap().push(line))),
        );
        t.connect().await.unwrap();
        let frames: Vec<_> = t.read_messages().collect().await;
        assert!(frames.is_empty());

        let err = t.close().await.unwrap_err();
        match err {
            Error::ProcessExited { code, stderr } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("expected ProcessExited, got {other:?}"),
        }
        assert_eq!(lines.lock().unwrap().as_slice(), ["boom".to_owned()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn early_close_kills_running_process() {
        let t = shell(r#"echo '{"type":"system"}'; sleep 30"#);
        t.connect().await.unwrap();
        let mut frames = t.read_messages();
        assert!(frames.next().await.unwrap().is_ok());

        let closed = tokio::time::timeout(Duration::from_secs(5), t.close()).await;
        assert_eq!(closed.expect("close should not wait for sleep").unwrap(), None);
    }
}
