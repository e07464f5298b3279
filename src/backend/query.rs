//! `QueryBackend` (L7): an abstract async stream of typed messages from an
//! LLM-like service. The Runner depends only on this trait, never on a
//! concrete backend SDK.

use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::backend::message::Message;
use crate::definition::{PermissionMode, SandboxConfig};
use crate::errors::AgentRuntimeError;

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub cwd: PathBuf,
    pub session_id: Option<String>,
    pub allowed_tools: Vec<String>,
    pub permission_mode: PermissionMode,
    pub sandbox: Option<SandboxConfig>,
}

#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn query(&self, request: QueryRequest) -> Result<BoxStream<'static, Message>, AgentRuntimeError>;
}
