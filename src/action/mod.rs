//! The action subsystem: detection of fenced action blocks, dispatch to
//! handlers, and the pre-close validator gate.

pub mod detector;
pub mod handlers;
#[cfg(feature = "issue-tracker-http")]
pub mod issue_tracker_http;
pub mod types;
pub mod validate;

#[cfg(feature = "issue-tracker-http")]
pub use issue_tracker_http::HttpIssueTracker;

pub use detector::detect;
pub use handlers::{
    execute_actions, is_terminal, ActionContext, ActionHandler, CompletionSignalHandler,
    FileActionHandler, HandlerRegistry, IssueActionHandler, IssueTracker, LogActionHandler,
};
pub use types::{ActionResult, DetectedAction};
pub use validate::{AggregateValidationResult, GateOutcome, Validator, ValidatorRegistry, ValidatorResult};
