//! The `Client`: one query, from request to message stream.
//!
//! # Lifecycle
//!
//! 1. Create with [`Client::new(request, config)`](Client::new), or
//!    [`Client::with_transport`] to supply your own [`Transport`].
//! 2. Call [`open()`](Client::open) to connect and get the [`MessageStream`].
//! 3. Consume the stream, directly or through a
//!    [`Dispatcher`](crate::Dispatcher).
//!
//! A client runs its query once. [`state()`](Client::state) follows the
//! query through `Idle → Requesting → Streaming → Completed | Failed`.

use std::sync::Arc;

use crate::config::ClientConfig;
use crate::errors::{Error, Result};
use crate::request::QueryRequest;
use crate::stream::{MessageStream, QueryState, StateCell};
use crate::transport::{CliTransport, Transport};

/// Runs one [`QueryRequest`] against the Claude Code CLI.
pub struct Client {
    request: QueryRequest,
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    state: StateCell,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("model", &self.request.model())
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client that spawns the CLI for `request`.
    ///
    /// Validates `config` and resolves the CLI path (from
    /// `config.cli_path`, else via [`find_cli()`](crate::discovery::find_cli)).
    /// Nothing is spawned until [`open()`](Self::open).
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an invalid configuration, [`Error::CliNotFound`]
    /// if discovery fails.
    pub fn new(request: QueryRequest, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = CliTransport::from_request(&request, &config)?;
        Ok(Self::from_parts(request, config, Arc::new(transport)))
    }

    /// Create a client over a caller-supplied transport.
    ///
    /// Useful for testing with a mock transport.
    pub fn with_transport(
        request: QueryRequest,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(request, config, transport))
    }

    fn from_parts(request: QueryRequest, config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            request,
            config,
            transport,
            state: StateCell::default(),
        }
    }

    /// Connect the transport and return the query's message stream.
    ///
    /// Honours `connect_timeout` and the cancellation token while
    /// connecting. On failure the transport is closed and the state becomes
    /// [`QueryState::Failed`].
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyStarted`] if this client was opened before;
    /// [`Error::Timeout`] or [`Error::Cancelled`] while connecting; any
    /// transport error from the connect itself.
    pub async fn open(&self) -> Result<MessageStream> {
        if !self
            .state
            .transition(QueryState::Idle, QueryState::Requesting)
        {
            return Err(Error::AlreadyStarted);
        }

        tracing::debug!(model = %self.request.model(), "opening query");
        if let Err(e) = self.connect().await {
            self.state.set(QueryState::Failed);
            if let Err(close_err) = self.transport.close().await {
                tracing::debug!(error = %close_err, "close after failed connect also failed");
            }
            return Err(e);
        }

        self.state.set(QueryState::Streaming);
        Ok(MessageStream::new(
            Arc::clone(&self.transport),
            self.state.clone(),
            self.config.read_timeout,
            self.config.cancellation_token.clone(),
        ))
    }

    async fn connect(&self) -> Result<()> {
        let cancel = self.config.cancellation_token.as_ref();
        let connect = async {
            match self.config.connect_timeout {
                Some(d) => match tokio::time::timeout(d, self.transport.connect()).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout(format!(
                        "connect timed out after {}s",
                        d.as_secs_f64()
                    ))),
                },
                None => self.transport.connect().await,
            }
        };
        tokio::select! {
            biased;
            _ = crate::stream::cancelled_or_pending(cancel) => Err(Error::Cancelled),
            result = connect => result,
        }
    }

    /// Current state of this client's query.
    #[must_use]
    pub fn state(&self) -> QueryState {
        self.state.get()
    }

    /// The request this client runs.
    #[must_use]
    pub fn request(&self) -> &QueryRequest {
        &self.request
    }

    /// The configuration this client runs with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
