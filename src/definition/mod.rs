//! Load-once declarative configuration (L2 Step Registry and the
//! `AgentDefinition` it's paired with).

mod agent_definition;
mod loader;
mod steps_registry;

pub use agent_definition::{
    ActionsConfig, AgentDefinition, BoundariesConfig, CheckBudgetConfig, CompletionConfig,
    CompositeConfig, CompositeOperator, CustomConfig, ExecutionConfig, ExternalStateConfig,
    FinalizeConfig, FlowConfig, IntegrationsConfig, IterationBudgetConfig, KeywordSignalConfig,
    OnFailurePolicy, ParameterDecl, ParameterType, ParameterValidation, PermissionMode,
    PreCloseValidationConfig, RunnerSpec, SandboxConfig, StepMachineConfig, StructuredSignalConfig,
    WorktreeConfig,
};
pub use loader::{list_agents, load_agent_definition, load_steps_registry, AgentDirectory};
pub use steps_registry::{
    CustomVariableDecl, CustomVariableSource, EntryStep, FlowStepDefinition, PromptRef,
    StepIterationsConfig, StepPhase, StepsRegistry, StructuredGate,
};
