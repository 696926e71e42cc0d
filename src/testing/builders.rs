//! Convenience builders for constructing test messages.

use crate::types::content::{ContentBlock, TextBlock};
use crate::types::messages::*;

/// Model id stamped on builder messages.
const TEST_MODEL: &str = "claude-3-5-haiku-20241022";

/// Build the `system`/`init` message that opens a session.
#[must_use]
pub fn system_init(session_id: &str) -> Message {
    Message::System(SystemMessage {
        subtype: Some("init".into()),
        session_id: Some(session_id.into()),
        cwd: Some("/tmp".into()),
        model: Some(TEST_MODEL.into()),
        tools: vec!["Bash".into(), "Read".into()],
        ..Default::default()
    })
}

/// Build a non-init `system` message (e.g. a status update).
#[must_use]
pub fn system_status(session_id: &str) -> Message {
    Message::System(SystemMessage {
        subtype: Some("status".into()),
        session_id: Some(session_id.into()),
        ..Default::default()
    })
}

/// Build a `Message::Assistant` with text content.
#[must_use]
pub fn assistant_text(text: &str) -> Message {
    Message::Assistant(AssistantMessage {
        message: AssistantMessageInner {
            id: Some(format!("msg_{}", uuid::Uuid::new_v4().simple())),
            content: vec![ContentBlock::Text(TextBlock { text: text.into() })],
            model: Some(TEST_MODEL.into()),
            stop_reason: Some("end_turn".into()),
            usage: Some(Usage {
                input_tokens: 10,
                output_tokens: 5,
                ..Default::default()
            }),
            ..Default::default()
        },
        session_id: None,
        parent_tool_use_id: None,
        extra: Default::default(),
        raw: None,
    })
}

/// Build a successful `Message::Result`.
#[must_use]
pub fn result_success(session_id: &str) -> Message {
    Message::Result(ResultMessage {
        subtype: Some("success".into()),
        is_error: Some(false),
        duration_ms: Some(1000),
        duration_api_ms: Some(900),
        num_turns: Some(1),
        result: Some("Done.".into()),
        session_id: Some(session_id.into()),
        total_cost_usd: Some(0.001),
        ..Default::default()
    })
}

/// Build an error `Message::Result`.
#[must_use]
pub fn result_error(session_id: &str) -> Message {
    Message::Result(ResultMessage {
        subtype: Some("error_during_execution".into()),
        is_error: Some(true),
        session_id: Some(session_id.into()),
        ..Default::default()
    })
}
