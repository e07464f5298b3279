//! An in-memory `QueryBackend` test double. Not compiled into release
//! builds; used by this crate's own integration tests and available to
//! downstream callers who want to test their own agent definitions without
//! a real LLM.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;

use crate::backend::message::Message;
use crate::backend::query::{QueryBackend, QueryRequest};
use crate::errors::AgentRuntimeError;

/// Replays a fixed script of message batches, one batch per call to
/// `query`. The last batch repeats if `query` is called more times than
/// there are scripted batches.
pub struct FakeQueryBackend {
    script: Vec<Vec<Message>>,
    calls: Mutex<usize>,
    pub requests: Mutex<Vec<QueryRequest>>,
}

impl FakeQueryBackend {
    pub fn new(script: Vec<Vec<Message>>) -> Self {
        Self {
            script,
            calls: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl QueryBackend for FakeQueryBackend {
    async fn query(&self, request: QueryRequest) -> Result<BoxStream<'static, Message>, AgentRuntimeError> {
        let mut calls = self.calls.lock();
        let index = (*calls).min(self.script.len().saturating_sub(1));
        *calls += 1;
        self.requests.lock().push(request);

        let batch = self.script.get(index).cloned().unwrap_or_default();
        Ok(stream::iter(batch).boxed())
    }
}
