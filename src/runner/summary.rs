//! `IterationSummary`: what one iteration produced (spec §3).

use serde_json::{Map, Value};

use crate::action::ActionResult;

#[derive(Debug, Clone, Default)]
pub struct IterationSummary {
    pub iteration: u32,
    pub assistant_responses: Vec<String>,
    pub tools_used: Vec<String>,
    pub actions: Vec<ActionResult>,
    pub errors: Vec<String>,
    pub structured_output: Option<Map<String, Value>>,
    /// Set by the `completion-signal` action handler; consulted by the
    /// `keywordSignal`/`structuredSignal` completion handlers when they
    /// prefer an explicit signal over scanning text.
    pub completion_requested: bool,
    /// Incremented once per `check`-type action; backs `checkBudget`.
    pub check_count: u32,
}

impl IterationSummary {
    pub fn new(iteration: u32) -> Self {
        Self {
            iteration,
            ..Default::default()
        }
    }

    /// The last assistant message, or empty string if none arrived this
    /// iteration. Per the runtime's resolved "last message only" policy for
    /// `keywordSignal`.
    pub fn last_assistant_response(&self) -> &str {
        self.assistant_responses.last().map(String::as_str).unwrap_or("")
    }

    pub fn record_action(&mut self, result: ActionResult) {
        if result.action.action_type == "check" {
            self.check_count += 1;
        }
        if result.success && result.action.action_type == "completion-signal" {
            self.completion_requested = true;
        }
        if let Some(error) = &result.error {
            self.errors.push(error.clone());
        }
        self.actions.push(result);
    }
}
