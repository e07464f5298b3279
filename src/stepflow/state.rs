//! `StepFlowState`: the mutable, per-run state of the step-flow engine
//! (spec §3). Append-only history, never pruned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step_id: String,
    pub iteration: u32,
    pub intent: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFlowState {
    pub current_step_id: String,
    pub step_iteration: u32,
    pub total_iterations: u32,
    pub retry_count: u32,
    pub history: Vec<HistoryEntry>,
}

impl StepFlowState {
    pub fn new(entry_step: impl Into<String>) -> Self {
        Self {
            current_step_id: entry_step.into(),
            step_iteration: 0,
            total_iterations: 0,
            retry_count: 0,
            history: Vec::new(),
        }
    }

    pub fn record(&mut self, step_id: &str, intent: &str) {
        self.history.push(HistoryEntry {
            step_id: step_id.to_string(),
            iteration: self.total_iterations,
            intent: intent.to_string(),
            timestamp: Utc::now(),
        });
    }
}
