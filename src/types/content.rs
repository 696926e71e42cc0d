//! Content block types carried inside assistant messages.
//!
//! Blocks are internally tagged on `"type"`, matching the NDJSON the CLI
//! writes. Only the assistant side is modelled; this crate never sends
//! structured user content. Block types without a variant here decode to
//! [`ContentBlock::Other`] and keep their JSON unchanged.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A single block of content within an assistant message.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    /// Plain-text content produced by the model.
    Text(TextBlock),

    /// A tool invocation requested by the model.
    ToolUse(ToolUseBlock),

    /// The result of a tool invocation, echoed back in the transcript.
    ToolResult(ToolResultBlock),

    /// Extended thinking content.
    Thinking(ThinkingBlock),

    /// Any other block (`redacted_thinking`, `server_tool_use`, `image`, ...),
    /// kept verbatim.
    Other(Value),
}

impl ContentBlock {
    /// Returns the text if this block is [`ContentBlock::Text`].
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(b) => Some(&b.text),
            _ => None,
        }
    }

    /// The wire `type` of this block, if it has one.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Text(_) => Some("text"),
            Self::ToolUse(_) => Some("tool_use"),
            Self::ToolResult(_) => Some("tool_result"),
            Self::Thinking(_) => Some("thinking"),
            Self::Other(v) => v.get("type").and_then(Value::as_str),
        }
    }
}

// ── Wire form ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownBlock {
    Text(TextBlock),
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
    Thinking(ThinkingBlock),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownBlockRef<'a> {
    Text(&'a TextBlock),
    ToolUse(&'a ToolUseBlock),
    ToolResult(&'a ToolResultBlock),
    Thinking(&'a ThinkingBlock),
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value.get("type").and_then(Value::as_str) {
            Some("text" | "tool_use" | "tool_result" | "thinking") => {
                let block = KnownBlock::deserialize(value).map_err(D::Error::custom)?;
                Ok(match block {
                    KnownBlock::Text(b) => Self::Text(b),
                    KnownBlock::ToolUse(b) => Self::ToolUse(b),
                    KnownBlock::ToolResult(b) => Self::ToolResult(b),
                    KnownBlock::Thinking(b) => Self::Thinking(b),
                })
            }
            _ => Ok(Self::Other(value)),
        }
    }
}

impl Serialize for ContentBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(b) => KnownBlockRef::Text(b).serialize(serializer),
            Self::ToolUse(b) => KnownBlockRef::ToolUse(b).serialize(serializer),
            Self::ToolResult(b) => KnownBlockRef::ToolResult(b).serialize(serializer),
            Self::Thinking(b) => KnownBlockRef::Thinking(b).serialize(serializer),
            Self::Other(v) => v.serialize(serializer),
        }
    }
}

// ── Block structs ────────────────────────────────────────────────────────────

/// A plain-text content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    /// The text produced by the model.
    pub text: String,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    /// Identifier correlating this call with its [`ToolResultBlock`].
    pub id: String,

    /// Name of the tool being invoked.
    pub name: String,

    /// Arguments passed to the tool.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub input: Value,
}

/// The result of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    /// The `id` from the corresponding [`ToolUseBlock`].
    pub tool_use_id: String,

    /// Whether the tool reported a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,

    /// Text or nested blocks, kept verbatim.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub content: Value,
}

/// Extended thinking produced by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingBlock {
    /// The thinking text.
    pub thinking: String,

    /// Opaque signature from the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_block_from_json() {
        let block: ContentBlock = serde_json::from_str(r#"{"type":"text","text":"hi"}"#).unwrap();
        assert_eq!(block.as_text(), Some("hi"));
    }

    #[test]
    fn tool_use_block_is_not_text() {
        let block: ContentBlock = serde_json::from_str(
            r#"{"type":"tool_use","id":"tu_1","name":"Bash","input":{"command":"ls"}}"#,
        )
        .unwrap();
        assert_eq!(block.as_text(), None);
        let ContentBlock::ToolUse(tool) = block else {
            panic!("expected ToolUse");
        };
        assert_eq!(tool.input["command"], "ls");
    }

    #[test]
    fn tool_result_accepts_string_or_blocks() {
        let text: ContentBlock =
            serde_json::from_str(r#"{"type":"tool_result","tool_use_id":"tu_1","content":"ok"}"#)
                .unwrap();
        let blocks: ContentBlock = serde_json::from_str(
            r#"{"type":"tool_result","tool_use_id":"tu_1","content":[{"type":"text","text":"ok"}],"is_error":true}"#,
        )
        .unwrap();
        assert!(matches!(text, ContentBlock::ToolResult(ref r) if r.is_error.is_none()));
        assert!(matches!(blocks, ContentBlock::ToolResult(ref r) if r.is_error == Some(true)));
    }

    #[test]
    fn unknown_block_type_is_kept_verbatim() {
        let raw = r#"{"type":"redacted_thinking","data":"x"}"#;
        let block: ContentBlock = serde_json::from_str(raw).unwrap();
        assert_eq!(block.kind(), Some("redacted_thinking"));
        assert_eq!(block.as_text(), None);
        assert!(matches!(block, ContentBlock::Other(ref v) if v["data"] == "x"));
        assert_eq!(serde_json::to_string(&block).unwrap(), raw);
    }

    #[test]
    fn known_block_with_bad_shape_is_rejected() {
        let err = serde_json::from_str::<ContentBlock>(r#"{"type":"text"}"#).unwrap_err();
        assert!(err.to_string().contains("text"), "got: {err}");
    }

    #[test]
    fn absent_optional_fields_are_not_serialised() {
        for raw in [
            r#"{"type":"thinking","thinking":"hm"}"#,
            r#"{"type":"tool_result","tool_use_id":"tu_1"}"#,
            r#"{"type":"tool_use","id":"tu_1","name":"Bash"}"#,
        ] {
            let block: ContentBlock = serde_json::from_str(raw).unwrap();
            assert_eq!(serde_json::to_string(&block).unwrap(), raw);
        }
    }
}
