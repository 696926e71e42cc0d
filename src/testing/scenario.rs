//! Scenario builder for scripting whole query streams.

use crate::testing::builders::{result_success, system_init};
use crate::testing::mock_transport::MockTransport;
use crate::types::messages::Message;

/// Fluent builder for a [`MockTransport`] that plays one query.
///
/// # Example
///
/// ```rust,ignore
/// use claude_query::testing::{ScenarioBuilder, assistant_text};
///
/// let transport = ScenarioBuilder::new("session-1")
///     .message(assistant_text("Hello!"))
///     .build();
/// assert_eq!(transport.queued_count(), 3);
/// ```
pub struct ScenarioBuilder {
    session_id: String,
    messages: Vec<Message>,
    fault: Option<String>,
}

impl ScenarioBuilder {
    /// Create a new scenario for the given session ID.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            fault: None,
        }
    }

    /// Add one message after the init message.
    #[must_use]
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Add several messages after the init message.
    #[must_use]
    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Break the connection after the scripted messages instead of finishing
    /// with a result.
    #[must_use]
    pub fn fault(mut self, message: impl Into<String>) -> Self {
        self.fault = Some(message.into());
        self
    }

    /// Build a [`MockTransport`] loaded with:
    /// 1. a `system`/`init` message for the scenario's session
    /// 2. the scripted messages, in order
    /// 3. a successful result, or the fault if one was set
    #[must_use]
    pub fn build(self) -> MockTransport {
        let transport = MockTransport::new();
        transport.enqueue_value(&system_init(&self.session_id));
        for msg in &self.messages {
            transport.enqueue_value(msg);
        }
        match &self.fault {
            Some(fault) => transport.enqueue_fault(fault),
            None => transport.enqueue_value(&result_success(&self.session_id)),
        }
        transport
    }

    /// Build a [`MockTransport`] with only the scripted messages (and the
    /// fault, if set).
    #[must_use]
    pub fn build_raw(self) -> MockTransport {
        let transport = MockTransport::new();
        for msg in &self.messages {
            transport.enqueue_value(msg);
        }
        if let Some(fault) = &self.fault {
            transport.enqueue_fault(fault);
        }
        transport
    }
}
