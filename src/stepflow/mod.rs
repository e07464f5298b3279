//! The step-flow engine (C1): state machine over declared steps.

mod engine;
mod state;

pub use engine::{StepFlowEngine, TransitionDecision};
pub use state::{HistoryEntry, StepFlowState};
