//! Top-level NDJSON message types produced by the Claude Code CLI.
//!
//! Each stdout line is one [`Message`], discriminated by its `"type"` field.
//! Types this crate does not model are kept verbatim as
//! [`Message::Other`] rather than rejected, so a newer CLI does not break an
//! older client.
//!
//! # Resilience
//!
//! Optional fields are `Option`s skipped on serialisation, and every struct
//! flattens unlisted fields into `extra`. A decoded message also keeps the
//! object it came from in `raw`, which is what [`Display`](fmt::Display)
//! prints, so console output is the CLI's own JSON with key order intact.
//!
//! # Example
//!
//! ```rust
//! use claude_query::Message;
//!
//! let value = serde_json::json!({"type":"system","subtype":"init","session_id":"s1"});
//! let msg = Message::from_value(value).unwrap();
//! assert!(msg.is_init());
//! assert_eq!(msg.session_id(), Some("s1"));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{Error, Result};
use crate::types::content::ContentBlock;

/// `type` values that decode into a dedicated [`Message`] variant.
const KNOWN_TYPES: &[&str] = &[
    "system",
    "assistant",
    "user",
    "result",
    "stream_event",
    "rate_limit_event",
];

// ── Top-level message enum ────────────────────────────────────────────────────

/// One message of the response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// A system-level message; `subtype == "init"` opens the session.
    System(SystemMessage),
    /// A message produced by the assistant.
    Assistant(AssistantMessage),
    /// A user turn echoed into the transcript (e.g. tool results).
    User(UserMessage),
    /// The final result message with cost and usage.
    Result(ResultMessage),
    /// A partial streaming event.
    StreamEvent(StreamEvent),
    /// A rate limit status event.
    RateLimitEvent(RateLimitEvent),
    /// Any well-formed message with a `type` not listed above.
    #[serde(skip)]
    Other(UnknownMessage),
}

impl Message {
    /// Decode one JSON frame into a message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the frame is not an object, has no
    /// string `type`, or has a known `type` with an invalid shape.
    pub fn from_value(value: Value) -> Result<Self> {
        let kind = match value.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            Some(_) => {
                return Err(Error::protocol(
                    "message `type` is not a string",
                    &value.to_string(),
                ));
            }
            None if value.is_object() => {
                return Err(Error::protocol(
                    "message has no `type` field",
                    &value.to_string(),
                ));
            }
            None => {
                return Err(Error::protocol(
                    "message is not a JSON object",
                    &value.to_string(),
                ));
            }
        };

        if KNOWN_TYPES.contains(&kind.as_str()) {
            let mut message = Message::deserialize(&value).map_err(|e| {
                Error::protocol(format!("invalid `{kind}` message: {e}"), &value.to_string())
            })?;
            if let Value::Object(raw) = value {
                message.set_raw(raw);
            }
            return Ok(message);
        }

        match value {
            Value::Object(raw) => Ok(Self::Other(UnknownMessage { kind, raw })),
            _ => Err(Error::protocol(
                "message is not a JSON object",
                &value.to_string(),
            )),
        }
    }

    /// The JSON object this message was decoded from.
    ///
    /// `None` for messages built in code rather than received.
    #[must_use]
    pub fn raw(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::System(m) => m.raw.as_ref(),
            Self::Assistant(m) => m.raw.as_ref(),
            Self::User(m) => m.raw.as_ref(),
            Self::Result(m) => m.raw.as_ref(),
            Self::StreamEvent(m) => m.raw.as_ref(),
            Self::RateLimitEvent(m) => m.raw.as_ref(),
            Self::Other(m) => Some(&m.raw),
        }
    }

    fn set_raw(&mut self, raw: Map<String, Value>) {
        match self {
            Self::System(m) => m.raw = Some(raw),
            Self::Assistant(m) => m.raw = Some(raw),
            Self::User(m) => m.raw = Some(raw),
            Self::Result(m) => m.raw = Some(raw),
            Self::StreamEvent(m) => m.raw = Some(raw),
            Self::RateLimitEvent(m) => m.raw = Some(raw),
            Self::Other(m) => m.raw = raw,
        }
    }

    /// The wire `type` of this message.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::System(_) => "system",
            Self::Assistant(_) => "assistant",
            Self::User(_) => "user",
            Self::Result(_) => "result",
            Self::StreamEvent(_) => "stream_event",
            Self::RateLimitEvent(_) => "rate_limit_event",
            Self::Other(m) => &m.kind,
        }
    }

    /// The `subtype`, for the variants that carry one.
    #[must_use]
    pub fn subtype(&self) -> Option<&str> {
        match self {
            Self::System(m) => m.subtype.as_deref(),
            Self::Result(m) => m.subtype.as_deref(),
            Self::Other(m) => m.raw.get("subtype").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Returns the session ID if present on this message.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::System(m) => m.session_id.as_deref(),
            Self::Assistant(m) => m.session_id.as_deref(),
            Self::User(m) => m.session_id.as_deref(),
            Self::Result(m) => m.session_id.as_deref(),
            Self::StreamEvent(m) => m.session_id.as_deref(),
            Self::RateLimitEvent(m) => m.session_id.as_deref(),
            Self::Other(m) => m.raw.get("session_id").and_then(Value::as_str),
        }
    }

    /// Returns `true` for the `system`/`init` message that opens a session.
    #[inline]
    #[must_use]
    pub fn is_init(&self) -> bool {
        matches!(self, Self::System(s) if s.subtype.as_deref() == Some("init"))
    }

    /// Returns `true` if this is a [`Message::Result`] that indicates an error.
    #[inline]
    #[must_use]
    pub fn is_error_result(&self) -> bool {
        matches!(self, Self::Result(r) if r.is_error == Some(true))
    }

    /// Join the text blocks of an [`Message::Assistant`] with newlines.
    #[must_use]
    pub fn assistant_text(&self) -> Option<String> {
        let Self::Assistant(a) = self else {
            return None;
        };
        let text = a
            .message
            .content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() { None } else { Some(text) }
    }
}

/// Renders the message as one line of compact JSON: the received object
/// when there is one, otherwise the serialised fields.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = match self.raw() {
            Some(raw) => serde_json::to_string(raw),
            None => serde_json::to_string(self),
        };
        match json {
            Ok(line) => f.write_str(&line),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

// ── SystemMessage ─────────────────────────────────────────────────────────────

/// A system-level message. The first one the CLI emits is `system`/`init`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    /// Discriminates system message kinds (e.g. `"init"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    /// Opaque session identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Working directory of the CLI process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    /// Model in use for the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Tool names available in the session.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,

    /// Fields not listed above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// The object as received, when decoded by [`Message::from_value`].
    #[serde(skip)]
    pub raw: Option<Map<String, Value>>,
}

// ── AssistantMessage ──────────────────────────────────────────────────────────

/// An assistant turn containing one or more content blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// The inner Anthropic messages API object.
    pub message: AssistantMessageInner,

    /// Session identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Set when the message belongs to a sub-agent tool call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,

    /// Fields not listed above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// The object as received, when decoded by [`Message::from_value`].
    #[serde(skip)]
    pub raw: Option<Map<String, Value>>,
}

/// The inner structure of an assistant message, mirroring the Anthropic
/// messages API response format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessageInner {
    /// Message ID assigned by the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Content blocks (text, tool use, thinking).
    #[serde(default)]
    pub content: Vec<ContentBlock>,

    /// Model that generated this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Why the model stopped generating (e.g. `"end_turn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    /// Token usage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Fields not listed above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── UserMessage ───────────────────────────────────────────────────────────────

/// A user-turn message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    /// The inner payload, kept verbatim (string or block list content).
    pub message: Value,

    /// Session identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Fields not listed above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// The object as received, when decoded by [`Message::from_value`].
    #[serde(skip)]
    pub raw: Option<Map<String, Value>>,
}

// ── ResultMessage ─────────────────────────────────────────────────────────────

/// The final message of a query, with cost accounting and usage aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    /// Result subtype (e.g. `"success"`, `"error_max_turns"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    /// `true` if the query ended due to an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,

    /// Wall-clock duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// API-only duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_api_ms: Option<u64>,

    /// Number of turns executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u32>,

    /// The final text result, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Session identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Total USD cost of the query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,

    /// Token usage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Fields not listed above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// The object as received, when decoded by [`Message::from_value`].
    #[serde(skip)]
    pub raw: Option<Map<String, Value>>,
}

// ── StreamEvent ──────────────────────────────────────────────────────────────

/// A partial-message streaming event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Event identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// Session identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Opaque event payload.
    #[serde(default)]
    pub event: Value,

    /// Tool use this event belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,

    /// Fields not listed above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// The object as received, when decoded by [`Message::from_value`].
    #[serde(skip)]
    pub raw: Option<Map<String, Value>>,
}

// ── RateLimitEvent ───────────────────────────────────────────────────────────

/// A rate-limit status event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitEvent {
    /// Session identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// All rate-limit fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// The object as received, when decoded by [`Message::from_value`].
    #[serde(skip)]
    pub raw: Option<Map<String, Value>>,
}

// ── UnknownMessage ───────────────────────────────────────────────────────────

/// A message whose `type` has no dedicated variant.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownMessage {
    /// The wire `type`.
    pub kind: String,
    /// The complete JSON object, including `type`.
    pub raw: Map<String, Value>,
}

// ── Usage ─────────────────────────────────────────────────────────────────────

/// Token usage counters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt context.
    #[serde(default)]
    pub input_tokens: u64,

    /// Tokens generated.
    #[serde(default)]
    pub output_tokens: u64,

    /// Input tokens served from the prompt cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,

    /// Input tokens written to the prompt cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,

    /// Fields not listed above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Usage {
    /// Total tokens consumed (input + output), ignoring cache counters.
    #[inline]
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> Message {
        Message::from_value(value).expect("decode")
    }

    #[test]
    fn system_init_from_ndjson() {
        let msg = decode(json!({
            "type": "system",
            "subtype": "init",
            "session_id": "s1",
            "cwd": "/tmp",
            "tools": ["Bash"],
            "model": "claude-3-5-haiku-20241022",
            "permissionMode": "default"
        }));
        assert!(msg.is_init());
        assert_eq!(msg.kind(), "system");
        assert_eq!(msg.subtype(), Some("init"));
        assert_eq!(msg.session_id(), Some("s1"));
        let Message::System(sys) = &msg else {
            panic!("expected System, got {msg:?}");
        };
        assert_eq!(sys.tools, ["Bash"]);
        assert_eq!(sys.extra["permissionMode"], "default");
    }

    #[test]
    fn system_without_subtype_is_not_init() {
        let msg = decode(json!({"type": "system"}));
        assert!(!msg.is_init());
        assert_eq!(msg.session_id(), None);
    }

    #[test]
    fn assistant_text_joins_text_blocks() {
        let msg = decode(json!({
            "type": "assistant",
            "message": {
                "id": "m1",
                "content": [
                    {"type": "text", "text": "line one"},
                    {"type": "tool_use", "id": "t", "name": "Bash", "input": {}},
                    {"type": "text", "text": "line two"}
                ],
                "usage": {"input_tokens": 5, "output_tokens": 3}
            },
            "session_id": "s1"
        }));
        assert_eq!(msg.assistant_text(), Some("line one\nline two".into()));
        let Message::Assistant(a) = &msg else {
            panic!("expected Assistant");
        };
        assert_eq!(a.message.usage.as_ref().map(Usage::total_tokens), Some(8));
    }

    #[test]
    fn assistant_text_none_for_other_variants() {
        let msg = decode(json!({"type": "result", "subtype": "success"}));
        assert_eq!(msg.assistant_text(), None);
    }

    #[test]
    fn result_fields_and_error_flag() {
        let msg = decode(json!({
            "type": "result",
            "subtype": "error_max_turns",
            "is_error": true,
            "num_turns": 3,
            "session_id": "s9"
        }));
        assert!(msg.is_error_result());
        assert_eq!(msg.subtype(), Some("error_max_turns"));
        assert_eq!(msg.session_id(), Some("s9"));

        let ok = decode(json!({"type": "result", "payload": "Hello"}));
        assert!(!ok.is_error_result());
    }

    #[test]
    fn unknown_type_is_kept_verbatim() {
        let raw = json!({"type": "tool_progress", "subtype": "tick", "session_id": "s1", "n": 2});
        let msg = decode(raw.clone());
        assert_eq!(msg.kind(), "tool_progress");
        assert_eq!(msg.subtype(), Some("tick"));
        assert_eq!(msg.session_id(), Some("s1"));
        assert!(!msg.is_init());
        let printed: Value = serde_json::from_str(&msg.to_string()).unwrap();
        assert_eq!(printed, raw);
    }

    #[test]
    fn display_prints_received_json_exactly() {
        for line in [
            r#"{"type":"system","subtype":"init","session_id":"abc","tools":[]}"#,
            r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"hm"}]}}"#,
            r#"{"type":"result","session_id":"abc","subtype":"success","total_cost_usd":0,"is_error":false}"#,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1"}]}}"#,
        ] {
            let msg = decode(serde_json::from_str(line).unwrap());
            assert!(msg.raw().is_some());
            assert_eq!(msg.to_string(), line);
        }
    }

    #[test]
    fn unknown_content_block_does_not_fail_the_message() {
        let msg = decode(json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "redacted_thinking", "data": "x"},
                {"type": "text", "text": "visible"}
            ]}
        }));
        assert_eq!(msg.assistant_text().as_deref(), Some("visible"));
        let Message::Assistant(a) = &msg else {
            panic!("expected Assistant");
        };
        assert_eq!(a.message.content[0].kind(), Some("redacted_thinking"));
    }

    #[test]
    fn built_messages_serialise_their_fields() {
        let msg = Message::System(SystemMessage {
            subtype: Some("init".into()),
            session_id: Some("s1".into()),
            ..Default::default()
        });
        assert!(msg.raw().is_none());
        assert_eq!(msg.to_string(), r#"{"type":"system","subtype":"init","session_id":"s1"}"#);
    }

    #[test]
    fn display_reproduces_the_input() {
        let raw = json!({"type": "result", "payload": "Hello"});
        let printed: Value = serde_json::from_str(&decode(raw.clone()).to_string()).unwrap();
        assert_eq!(printed, raw);

        let raw = json!({"type": "system", "subtype": "init", "session_id": "abc"});
        let printed: Value = serde_json::from_str(&decode(raw.clone()).to_string()).unwrap();
        assert_eq!(printed, raw);
    }

    #[test]
    fn rejects_non_objects() {
        for value in [json!([1, 2]), json!("system"), json!(null)] {
            let err = Message::from_value(value).unwrap_err();
            assert!(err.is_protocol(), "got {err:?}");
        }
    }

    #[test]
    fn rejects_missing_or_non_string_type() {
        let err = Message::from_value(json!({"subtype": "init"})).unwrap_err();
        assert!(err.to_string().contains("no `type`"));
        let err = Message::from_value(json!({"type": 7})).unwrap_err();
        assert!(err.to_string().contains("not a string"));
    }

    #[test]
    fn rejects_known_type_with_bad_shape() {
        let err = Message::from_value(json!({"type": "assistant"})).unwrap_err();
        assert!(err.is_protocol());
        assert!(err.to_string().contains("invalid `assistant` message"));

        let err = Message::from_value(json!({"type": "system", "session_id": 42})).unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn stream_and_rate_limit_events_carry_session() {
        let msg = decode(json!({"type": "stream_event", "uuid": "e1", "session_id": "s1", "event": {"k": 1}}));
        assert_eq!(msg.session_id(), Some("s1"));
        let msg = decode(json!({"type": "rate_limit_event", "session_id": "s2", "retry_after": 3}));
        assert_eq!(msg.session_id(), Some("s2"));
    }
}
