//! Shared action types: what the detector emits and what handlers return
//! (spec §3 `DetectedAction` / `ActionResult`).

use serde_json::{Map, Value};

/// One fenced action block found in assistant text.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedAction {
    pub action_type: String,
    pub content: Option<String>,
    /// Every JSON field other than `type` and `content`.
    pub metadata: Map<String, Value>,
    pub raw: String,
}

/// The outcome of executing one `DetectedAction`.
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub action: DetectedAction,
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok(action: DetectedAction, result: Option<Value>) -> Self {
        Self {
            action,
            success: true,
            result,
            error: None,
        }
    }

    pub fn failed(action: DetectedAction, error: impl Into<String>) -> Self {
        Self {
            action,
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}
