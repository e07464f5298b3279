//! Message Processor (L8): normalizes a backend message stream into the
//! pieces an `IterationSummary` needs.

use futures::stream::BoxStream;
use futures::StreamExt;

use crate::backend::message::Message;
use crate::logging::{IterationLogger, LogLevel};

#[derive(Debug, Default)]
pub struct ProcessedIteration {
    pub assistant_responses: Vec<String>,
    pub tools_used: Vec<String>,
    pub session_id: Option<String>,
    pub errors: Vec<String>,
}

/// Drains `stream`, logging every message via `logger`, and accumulates the
/// fields the Runner folds into its `IterationSummary`.
pub async fn process_stream(
    mut stream: BoxStream<'static, Message>,
    logger: &IterationLogger,
    step: &str,
) -> ProcessedIteration {
    let mut processed = ProcessedIteration::default();

    while let Some(message) = stream.next().await {
        match message {
            Message::Assistant { content } => {
                logger.log(LogLevel::Debug, format!("assistant: {content}"), Some(step));
                processed.assistant_responses.push(content);
            }
            Message::ToolUse { tool_name } => {
                logger.log(LogLevel::Debug, format!("tool use: {tool_name}"), Some(step));
                processed.tools_used.push(tool_name);
            }
            Message::Result { session_id } => {
                logger.log(LogLevel::Debug, format!("session: {session_id}"), Some(step));
                processed.session_id = Some(session_id);
            }
            Message::Error { message } => {
                logger.log(LogLevel::Warn, format!("backend error: {message}"), Some(step));
                processed.errors.push(message);
            }
            Message::Unknown { raw } => {
                logger.log(LogLevel::Debug, format!("unknown message: {raw}"), Some(step));
            }
        }
    }

    processed
}
