//! Wire types for the CLI's NDJSON output.
//!
//! - [`content`]: content blocks inside assistant messages ([`ContentBlock`], …)
//! - [`messages`]: top-level stream messages ([`Message`], [`Usage`], …)

pub mod content;
pub mod messages;

pub use content::{ContentBlock, TextBlock, ThinkingBlock, ToolResultBlock, ToolUseBlock};

pub use messages::{
    AssistantMessage, AssistantMessageInner, Message, RateLimitEvent, ResultMessage,
    StreamEvent, SystemMessage, UnknownMessage, Usage, UserMessage,
};
