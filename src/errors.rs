//! Error types for the agent execution runtime.
//!
//! Each variant corresponds to one of the error kinds named in the runtime's
//! error-handling design: prompt resolution, lifecycle transitions, step-flow
//! routing, the pre-close validation gate, action execution, and the backend
//! adapter. `AgentRuntimeError` is the single error type the public API
//! returns; more specific errors convert into it via `#[from]`.

use thiserror::Error;

/// Errors raised while resolving a prompt (system or step).
#[derive(Debug, Error)]
pub enum PromptError {
    /// Neither the user file nor the embedded fallback had content for this key.
    #[error("no prompt found for '{key}' (checked file and fallback)")]
    NotFound { key: String },

    /// A `{name}` placeholder had no value and `allowMissingVariables` was false.
    #[error("unresolved variable '{name}' in prompt '{key}'")]
    UnresolvedVariable { key: String, name: String },

    /// The prompt file existed but could not be read.
    #[error("failed to read prompt file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the lifecycle state machine.
#[derive(Debug, Error)]
#[error("invalid lifecycle transition: action '{action}' is not valid from state '{from}'")]
pub struct InvalidTransition {
    pub from: String,
    pub action: String,
}

/// Errors raised by the step-flow engine.
#[derive(Debug, Error)]
pub enum StepFlowError {
    #[error("step '{step}' emitted intent '{intent}' which has no configured transition")]
    AmbiguousIntent { step: String, intent: String },

    #[error("step '{step}' has no transition named 'next'")]
    MissingNextTransition { step: String },

    #[error("step '{step}' references unknown next step '{target}'")]
    UnknownStep { step: String, target: String },

    #[error("step '{step}' (phase {phase}) may not emit intent '{intent}'")]
    PhaseViolation {
        step: String,
        phase: String,
        intent: String,
    },

    #[error("step '{step}' retry count {count} exceeded max {max}")]
    RetryBudgetExceeded { step: String, count: u32, max: u32 },

    #[error("entry step '{0}' is not defined in the steps registry")]
    UnknownEntryStep(String),

    #[error("step '{step}' structured output did not match its declared schema: {detail}")]
    SchemaMismatch { step: String, detail: String },
}

/// Errors raised by the pre-close validator gate.
#[derive(Debug, Error)]
pub enum ValidationBlock {
    #[error("missing validation results")]
    MissingValidationObject,

    #[error("required validation field '{field}' is false")]
    RequiredFieldFalse { field: String },

    #[error("evidence contradicts claims: {detail}")]
    EvidenceContradiction { detail: String },

    #[error("validator '{name}' failed: {error}")]
    ValidatorFailed { name: String, error: String },

    #[error("Validator error: {0}")]
    ValidatorException(String),
}

/// Errors raised while loading an `AgentDefinition` or `StepsRegistry`.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown completion type '{0}'")]
    UnknownCompletionType(String),

    #[error("completion config invalid for type '{kind}': {detail}")]
    InvalidCompletionConfig { kind: String, detail: String },

    #[error("step '{step}' transitions to unknown step '{target}'")]
    DanglingTransition { step: String, target: String },

    #[error("entry step '{0}' is not defined")]
    UnknownEntryStep(String),

    #[error("unknown field(s) in definition: {0}")]
    UnknownFields(String),
}

/// The top-level error type returned by the runtime's public API.
#[derive(Debug, Error)]
pub enum AgentRuntimeError {
    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Lifecycle(#[from] InvalidTransition),

    #[error(transparent)]
    StepFlow(#[from] StepFlowError),

    #[error(transparent)]
    Validation(#[from] ValidationBlock),

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("backend stream error: {0}")]
    BackendStream(String),

    #[error("action execution error: {0}")]
    ActionExec(String),

    #[error("run cancelled")]
    Cancelled,
}
