//! A `QueryBackend` that always reports "not wired up" (spec §6 treats the
//! backend SDK as a collaborator outside the core). Mirrors the teacher's
//! own `AnthropicCompletion::acall`, which returns a stub error rather than
//! fabricating an HTTP client — the CLI binary uses this until a caller
//! supplies a real backend via `RunnerDeps`.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::backend::message::Message;
use crate::backend::query::{QueryBackend, QueryRequest};
use crate::errors::AgentRuntimeError;

pub struct StubQueryBackend;

#[async_trait]
impl QueryBackend for StubQueryBackend {
    async fn query(&self, request: QueryRequest) -> Result<BoxStream<'static, Message>, AgentRuntimeError> {
        log::warn!(
            "StubQueryBackend.query: no concrete backend configured (prompt length {})",
            request.prompt.len()
        );
        Err(AgentRuntimeError::BackendStream(
            "no QueryBackend configured; construct RunnerDeps with a real backend".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn stub_backend_always_errors() {
        let backend = StubQueryBackend;
        let request = QueryRequest {
            prompt: "hi".to_string(),
            system_prompt: String::new(),
            cwd: PathBuf::from("."),
            session_id: None,
            allowed_tools: vec![],
            permission_mode: crate::definition::PermissionMode::Default,
            sandbox: None,
        };
        let result = backend.query(request).await;
        assert!(result.is_err());
    }
}
