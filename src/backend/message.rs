//! The sealed message type streamed from a `QueryBackend` (spec §6). Kept
//! deliberately small and SDK-agnostic so no concrete backend's types leak
//! into the Runner.

/// One message from the backend's response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Assistant { content: String },
    ToolUse { tool_name: String },
    Result { session_id: String },
    Error { message: String },
    Unknown { raw: String },
}
