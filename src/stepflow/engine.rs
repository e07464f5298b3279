//! The Step-Flow Engine (C1): advances a state machine over declared steps
//! using the intent extracted from the LLM's structured output (spec §4.2).

use serde_json::Value;

use crate::definition::{FlowStepDefinition, StepsRegistry};
use crate::errors::StepFlowError;
use crate::stepflow::state::StepFlowState;

const RESERVED_INTENTS: &[&str] = &["next", "repeat", "handoff", "closing"];

/// The outcome of one `advance()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionDecision {
    pub next_step_id: String,
    /// True once a `closing` transition has been taken — the Runner
    /// combines this with the Completion Handler's verdict to decide
    /// whether the run is over.
    pub terminal: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StepFlowEngine;

impl StepFlowEngine {
    pub fn new() -> Self {
        Self
    }

    /// Advance `state` by one transition. Mutates `state` in place:
    /// appends to `history`, and on success updates `current_step_id`.
    pub fn advance(
        &self,
        registry: &StepsRegistry,
        state: &mut StepFlowState,
        step: &FlowStepDefinition,
        structured_output: Option<&Value>,
    ) -> Result<TransitionDecision, StepFlowError> {
        let current_step_id = state.current_step_id.clone();

        let intent = step
            .structured_gate
            .as_ref()
            .and_then(|gate| structured_output.and_then(|v| get_nested_str(v, &gate.intent_field)))
            .map(str::to_string);

        let intent = match intent {
            Some(intent) => intent,
            None => {
                if step.transitions.len() == 1 {
                    step.transitions.keys().next().unwrap().clone()
                } else {
                    return Err(StepFlowError::AmbiguousIntent {
                        step: current_step_id,
                        intent: "<missing>".to_string(),
                    });
                }
            }
        };

        if RESERVED_INTENTS.contains(&intent.as_str())
            && !step.phase.allowed_reserved_intents().contains(&intent.as_str())
        {
            return Err(StepFlowError::PhaseViolation {
                step: current_step_id,
                phase: format!("{:?}", step.phase),
                intent,
            });
        }

        let decision = match intent.as_str() {
            "next" => {
                let target = step.transitions.get("next").ok_or_else(|| {
                    StepFlowError::MissingNextTransition {
                        step: current_step_id.clone(),
                    }
                })?;
                state.retry_count = 0;
                self.resolve_target(registry, &current_step_id, target)?
            }
            "repeat" => {
                state.retry_count += 1;
                if let Some(max) = step.iterations.max {
                    if state.retry_count > max {
                        return Err(StepFlowError::RetryBudgetExceeded {
                            step: current_step_id,
                            count: state.retry_count,
                            max,
                        });
                    }
                }
                TransitionDecision {
                    next_step_id: current_step_id.clone(),
                    terminal: false,
                }
            }
            "handoff" => {
                let target = step.transitions.get("handoff").ok_or_else(|| {
                    StepFlowError::AmbiguousIntent {
                        step: current_step_id.clone(),
                        intent: "handoff".to_string(),
                    }
                })?;
                state.retry_count = 0;
                self.resolve_target(registry, &current_step_id, target)?
            }
            "closing" => {
                let target = step.transitions.get("closing").ok_or_else(|| {
                    StepFlowError::AmbiguousIntent {
                        step: current_step_id.clone(),
                        intent: "closing".to_string(),
                    }
                })?;
                state.retry_count = 0;
                let mut decision = self.resolve_target(registry, &current_step_id, target)?;
                decision.terminal = true;
                decision
            }
            other => {
                let target = step.transitions.get(other).ok_or_else(|| {
                    StepFlowError::AmbiguousIntent {
                        step: current_step_id.clone(),
                        intent: other.to_string(),
                    }
                })?;
                state.retry_count = 0;
                self.resolve_target(registry, &current_step_id, target)?
            }
        };

        state.record(&current_step_id, &intent);
        state.total_iterations += 1;
        if decision.next_step_id == current_step_id {
            state.step_iteration += 1;
        } else {
            state.step_iteration = 0;
        }
        state.current_step_id = decision.next_step_id.clone();

        Ok(decision)
    }

    fn resolve_target(
        &self,
        registry: &StepsRegistry,
        step: &str,
        target: &str,
    ) -> Result<TransitionDecision, StepFlowError> {
        if !registry.steps.contains_key(target) {
            return Err(StepFlowError::UnknownStep {
                step: step.to_string(),
                target: target.to_string(),
            });
        }
        Ok(TransitionDecision {
            next_step_id: target.to_string(),
            terminal: false,
        })
    }
}

/// Resolve a dotted path (`"next_action.action"`) against a JSON value,
/// returning the leaf as a string if it is one.
fn get_nested_str<'a>(value: &'a Value, path: &str) -> Option<&'a str> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    current.as_str()
}
