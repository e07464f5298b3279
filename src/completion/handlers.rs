//! One `CompletionHandler` implementation per completion type (spec §4.3),
//! plus the factory that decodes an already-validated `CompletionConfig`
//! into the live handler object.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::completion::types::{CompletionContext, CompletionCriteria, CompletionHandler, ExternalProbe};
use crate::definition::{
    CheckBudgetConfig, CompletionConfig, CompositeConfig, CompositeOperator, CustomConfig,
    ExternalStateConfig, IterationBudgetConfig, KeywordSignalConfig, StepMachineConfig,
    StructuredSignalConfig,
};
use crate::errors::LoaderError;
use crate::runner::summary::IterationSummary;

/// Dependencies completion handlers need beyond their own config: run
/// parameters (for `externalState`'s identifying parameter) and an
/// external-resource probe.
pub struct CompletionDeps {
    pub params: HashMap<String, Value>,
    pub probe: Option<Arc<dyn ExternalProbe>>,
}

pub fn build_handler(
    config: &CompletionConfig,
    deps: &CompletionDeps,
) -> Result<Box<dyn CompletionHandler>, LoaderError> {
    Ok(match config {
        CompletionConfig::ExternalState(c) => Box::new(ExternalStateHandler::new(c, deps)?),
        CompletionConfig::IterationBudget(c) => Box::new(IterationBudgetHandler::new(c)),
        CompletionConfig::CheckBudget(c) => Box::new(CheckBudgetHandler::new(c)),
        CompletionConfig::KeywordSignal(c) => Box::new(KeywordSignalHandler::new(c)),
        CompletionConfig::StructuredSignal(c) => Box::new(StructuredSignalHandler::new(c)),
        CompletionConfig::StepMachine(c) => Box::new(StepMachineHandler::new(c)),
        CompletionConfig::Composite(c) => Box::new(CompositeHandler::new(c, deps)?),
        CompletionConfig::Custom(c) => Box::new(CustomHandler::new(c)),
    })
}

pub struct ExternalStateHandler {
    resource_type: String,
    target_state: String,
    resource_id: String,
    probe: Arc<dyn ExternalProbe>,
}

impl ExternalStateHandler {
    pub fn new(config: &ExternalStateConfig, deps: &CompletionDeps) -> Result<Self, LoaderError> {
        let resource_id = deps
            .params
            .get(&config.identifying_param)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| LoaderError::InvalidCompletionConfig {
                kind: "externalState".to_string(),
                detail: format!(
                    "missing identifying parameter '{}'",
                    config.identifying_param
                ),
            })?;
        let probe = deps
            .probe
            .clone()
            .ok_or_else(|| LoaderError::InvalidCompletionConfig {
                kind: "externalState".to_string(),
                detail: "no external probe configured".to_string(),
            })?;
        Ok(Self {
            resource_type: config.resource_type.clone(),
            target_state: config.target_state.clone(),
            resource_id,
            probe,
        })
    }
}

#[async_trait]
impl CompletionHandler for ExternalStateHandler {
    fn build_initial_prompt(&self) -> String {
        format!(
            "Work on {} '{}' until it reaches state '{}'.",
            self.resource_type, self.resource_id, self.target_state
        )
    }

    fn build_continuation_prompt(&self, iteration: u32, _last_summary: &IterationSummary) -> String {
        format!(
            "Continue (iteration {iteration}). Target state for {} '{}' is still '{}'.",
            self.resource_type, self.resource_id, self.target_state
        )
    }

    fn build_completion_criteria(&self) -> CompletionCriteria {
        CompletionCriteria {
            short: format!("{} reaches {}", self.resource_type, self.target_state),
            detail: format!(
                "{} '{}' must report state '{}'",
                self.resource_type, self.resource_id, self.target_state
            ),
        }
    }

    async fn is_complete(&self, _ctx: &CompletionContext<'_>) -> bool {
        self.probe.probe(&self.resource_type, &self.resource_id).await == self.target_state
    }

    fn get_completion_description(&self, _summary: &IterationSummary) -> String {
        format!("waiting for {} to reach '{}'", self.resource_type, self.target_state)
    }
}

pub struct IterationBudgetHandler {
    max_iterations: u32,
}

impl IterationBudgetHandler {
    pub fn new(config: &IterationBudgetConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
        }
    }
}

#[async_trait]
impl CompletionHandler for IterationBudgetHandler {
    fn build_initial_prompt(&self) -> String {
        format!("You have up to {} iterations to complete this task.", self.max_iterations)
    }

    fn build_continuation_prompt(&self, iteration: u32, _last_summary: &IterationSummary) -> String {
        format!("Iteration {iteration} of {}.", self.max_iterations)
    }

    fn build_completion_criteria(&self) -> CompletionCriteria {
        CompletionCriteria {
            short: "iteration budget".to_string(),
            detail: format!("iteration >= {}", self.max_iterations),
        }
    }

    async fn is_complete(&self, ctx: &CompletionContext<'_>) -> bool {
        ctx.summary.iteration >= self.max_iterations
    }

    fn get_completion_description(&self, _summary: &IterationSummary) -> String {
        "iterationBudget reached".to_string()
    }
}

pub struct CheckBudgetHandler {
    max_checks: u32,
}

impl CheckBudgetHandler {
    pub fn new(config: &CheckBudgetConfig) -> Self {
        Self {
            max_checks: config.max_checks,
        }
    }
}

#[async_trait]
impl CompletionHandler for CheckBudgetHandler {
    fn build_initial_prompt(&self) -> String {
        format!("You may run up to {} checks.", self.max_checks)
    }

    fn build_continuation_prompt(&self, _iteration: u32, last_summary: &IterationSummary) -> String {
        format!("Checks used: {}/{}.", last_summary.check_count, self.max_checks)
    }

    fn build_completion_criteria(&self) -> CompletionCriteria {
        CompletionCriteria {
            short: "check budget".to_string(),
            detail: format!("check_count >= {}", self.max_checks),
        }
    }

    async fn is_complete(&self, ctx: &CompletionContext<'_>) -> bool {
        ctx.summary.check_count >= self.max_checks
    }

    fn get_completion_description(&self, _summary: &IterationSummary) -> String {
        "checkBudget reached".to_string()
    }
}

pub struct KeywordSignalHandler {
    completion_keyword: String,
}

impl KeywordSignalHandler {
    pub fn new(config: &KeywordSignalConfig) -> Self {
        Self {
            completion_keyword: config.completion_keyword.clone(),
        }
    }
}

#[async_trait]
impl CompletionHandler for KeywordSignalHandler {
    fn build_initial_prompt(&self) -> String {
        format!(
            "When you are finished, include the exact text '{}' in your reply.",
            self.completion_keyword
        )
    }

    fn build_continuation_prompt(&self, iteration: u32, _last_summary: &IterationSummary) -> String {
        format!("Iteration {iteration}. Remember to signal completion with '{}'.", self.completion_keyword)
    }

    fn build_completion_criteria(&self) -> CompletionCriteria {
        CompletionCriteria {
            short: "keyword signal".to_string(),
            detail: format!("last assistant message contains '{}'", self.completion_keyword),
        }
    }

    async fn is_complete(&self, ctx: &CompletionContext<'_>) -> bool {
        ctx.summary.completion_requested
            || ctx.summary.last_assistant_response().contains(&self.completion_keyword)
    }

    fn get_completion_description(&self, _summary: &IterationSummary) -> String {
        format!("keyword '{}' observed", self.completion_keyword)
    }
}

pub struct StructuredSignalHandler {
    signal_field: String,
    signal_type: String,
    required_fields: HashMap<String, Value>,
}

impl StructuredSignalHandler {
    pub fn new(config: &StructuredSignalConfig) -> Self {
        Self {
            signal_field: config.signal_field.clone(),
            signal_type: config.signal_type.clone(),
            required_fields: config.required_fields.clone(),
        }
    }
}

#[async_trait]
impl CompletionHandler for StructuredSignalHandler {
    fn build_initial_prompt(&self) -> String {
        format!(
            "Set '{}' to '{}' in your structured output when done.",
            self.signal_field, self.signal_type
        )
    }

    fn build_continuation_prompt(&self, iteration: u32, _last_summary: &IterationSummary) -> String {
        format!("Iteration {iteration}.")
    }

    fn build_completion_criteria(&self) -> CompletionCriteria {
        CompletionCriteria {
            short: "structured signal".to_string(),
            detail: format!("{} == '{}' with required fields", self.signal_field, self.signal_type),
        }
    }

    async fn is_complete(&self, ctx: &CompletionContext<'_>) -> bool {
        if ctx.summary.completion_requested {
            return true;
        }
        let Some(output) = &ctx.summary.structured_output else {
            return false;
        };
        let signal_matches = output
            .get(&self.signal_field)
            .and_then(Value::as_str)
            .map(|v| v == self.signal_type)
            .unwrap_or(false);
        if !signal_matches {
            return false;
        }
        self.required_fields
            .iter()
            .all(|(k, v)| output.get(k) == Some(v))
    }

    fn get_completion_description(&self, _summary: &IterationSummary) -> String {
        format!("structured signal '{}' observed", self.signal_type)
    }
}

pub struct StepMachineHandler;

impl StepMachineHandler {
    pub fn new(_config: &StepMachineConfig) -> Self {
        Self
    }
}

#[async_trait]
impl CompletionHandler for StepMachineHandler {
    fn build_initial_prompt(&self) -> String {
        "Follow the declared step flow to completion.".to_string()
    }

    fn build_continuation_prompt(&self, iteration: u32, _last_summary: &IterationSummary) -> String {
        format!("Iteration {iteration}. Continue following the step flow.")
    }

    fn build_completion_criteria(&self) -> CompletionCriteria {
        CompletionCriteria {
            short: "step machine terminal".to_string(),
            detail: "step-flow engine reports terminal=true".to_string(),
        }
    }

    async fn is_complete(&self, ctx: &CompletionContext<'_>) -> bool {
        ctx.step_flow_terminal
    }

    fn get_completion_description(&self, _summary: &IterationSummary) -> String {
        "step flow reached a terminal step".to_string()
    }
}

pub struct CompositeHandler {
    operator: CompositeOperator,
    children: Vec<Box<dyn CompletionHandler>>,
}

impl CompositeHandler {
    pub fn new(config: &CompositeConfig, deps: &CompletionDeps) -> Result<Self, LoaderError> {
        let children = config
            .children
            .iter()
            .map(|child| build_handler(child, deps))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            operator: config.operator,
            children,
        })
    }
}

#[async_trait]
impl CompletionHandler for CompositeHandler {
    fn build_initial_prompt(&self) -> String {
        self.children
            .first()
            .map(|c| c.build_initial_prompt())
            .unwrap_or_default()
    }

    fn build_continuation_prompt(&self, iteration: u32, last_summary: &IterationSummary) -> String {
        self.children
            .first()
            .map(|c| c.build_continuation_prompt(iteration, last_summary))
            .unwrap_or_default()
    }

    fn build_completion_criteria(&self) -> CompletionCriteria {
        CompletionCriteria {
            short: format!("composite ({:?})", self.operator),
            detail: format!("{} children combined with {:?}", self.children.len(), self.operator),
        }
    }

    async fn is_complete(&self, ctx: &CompletionContext<'_>) -> bool {
        match self.operator {
            CompositeOperator::And => {
                for child in &self.children {
                    if !child.is_complete(ctx).await {
                        return false;
                    }
                }
                true
            }
            CompositeOperator::Or => {
                for child in &self.children {
                    if child.is_complete(ctx).await {
                        return true;
                    }
                }
                false
            }
            CompositeOperator::First => match self.children.first() {
                Some(child) => child.is_complete(ctx).await,
                None => false,
            },
        }
    }

    fn get_completion_description(&self, summary: &IterationSummary) -> String {
        match self.children.first() {
            Some(child) => child.get_completion_description(summary),
            None => "composite with no children".to_string(),
        }
    }
}

/// Delegates to an out-of-core handler loaded by path. The core treats it
/// as opaque; without a dynamic-loading mechanism this never self-reports
/// completion, matching the spec's "treated as opaque" framing.
pub struct CustomHandler {
    path: String,
}

impl CustomHandler {
    pub fn new(config: &CustomConfig) -> Self {
        Self {
            path: config.path.clone(),
        }
    }
}

#[async_trait]
impl CompletionHandler for CustomHandler {
    fn build_initial_prompt(&self) -> String {
        String::new()
    }

    fn build_continuation_prompt(&self, _iteration: u32, _last_summary: &IterationSummary) -> String {
        String::new()
    }

    fn build_completion_criteria(&self) -> CompletionCriteria {
        CompletionCriteria {
            short: "custom".to_string(),
            detail: format!("delegated to '{}'", self.path),
        }
    }

    async fn is_complete(&self, ctx: &CompletionContext<'_>) -> bool {
        ctx.summary.completion_requested
    }

    fn get_completion_description(&self, _summary: &IterationSummary) -> String {
        format!("custom handler '{}'", self.path)
    }
}
