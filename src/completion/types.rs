//! Shared completion-subsystem types.

use async_trait::async_trait;

use crate::runner::summary::IterationSummary;

#[derive(Debug, Clone)]
pub struct CompletionCriteria {
    pub short: String,
    pub detail: String,
}

/// External resource probe for the `externalState` completion type (spec
/// §6). The core never parses runner-specific output; it only consumes the
/// probe's verdict.
#[async_trait]
pub trait ExternalProbe: Send + Sync {
    async fn probe(&self, resource_type: &str, id: &str) -> String;
}

/// Everything a completion handler's `is_complete` may need beyond the
/// `IterationSummary` itself.
pub struct CompletionContext<'a> {
    pub summary: &'a IterationSummary,
    /// Whether the step-flow engine reported `terminal=true` this
    /// iteration (backs `stepMachine`).
    pub step_flow_terminal: bool,
}

/// The pluggable decision module (spec §4.3). One implementation per
/// completion type; all share this shape.
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    fn build_initial_prompt(&self) -> String;
    fn build_continuation_prompt(&self, iteration: u32, last_summary: &IterationSummary) -> String;
    fn build_completion_criteria(&self) -> CompletionCriteria;
    async fn is_complete(&self, ctx: &CompletionContext<'_>) -> bool;
    fn get_completion_description(&self, summary: &IterationSummary) -> String;
}
