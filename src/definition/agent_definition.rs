//! `AgentDefinition`: the immutable, load-once declaration of an agent's
//! role, completion rule, and boundary constraints (spec §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::LoaderError;

/// One declared CLI/run parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ParameterDecl {
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub cli: Option<String>,
    #[serde(default)]
    pub validation: Option<ParameterValidation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterValidation {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default, rename = "enum")]
    pub enum_values: Option<Vec<String>>,
}

/// The `runner.flow` sub-section: prompt locations and model defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct FlowConfig {
    #[serde(default)]
    pub system_prompt_path: Option<String>,
    #[serde(default)]
    pub prompt_registry_path: Option<String>,
    #[serde(default)]
    pub fallback_directory: Option<String>,
    #[serde(default)]
    pub structured_output_schema_base: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub auto_response: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompositeOperator {
    And,
    Or,
    First,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ExternalStateConfig {
    pub resource_type: String,
    pub target_state: String,
    pub identifying_param: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct IterationBudgetConfig {
    pub max_iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CheckBudgetConfig {
    pub max_checks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct KeywordSignalConfig {
    pub completion_keyword: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct StructuredSignalConfig {
    pub signal_field: String,
    pub signal_type: String,
    #[serde(default)]
    pub required_fields: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepMachineConfig {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompositeConfig {
    pub operator: CompositeOperator,
    pub children: Vec<CompletionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomConfig {
    pub path: String,
}

/// The sealed completion-type tagged union (spec §4.3). Decoded once at
/// load time; `serde`'s internally-tagged representation rejects unknown
/// `type` values and type/config mismatches as deserialize errors, so an
/// unrecognized variant fails at load, not at first `isComplete` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "camelCase")]
pub enum CompletionConfig {
    ExternalState(ExternalStateConfig),
    IterationBudget(IterationBudgetConfig),
    CheckBudget(CheckBudgetConfig),
    KeywordSignal(KeywordSignalConfig),
    StructuredSignal(StructuredSignalConfig),
    StepMachine(StepMachineConfig),
    Composite(CompositeConfig),
    Custom(CustomConfig),
}

impl CompletionConfig {
    /// Construction-time validation that can't be expressed by the schema
    /// alone (e.g. "non-empty string").
    pub fn validate(&self) -> Result<(), LoaderError> {
        match self {
            CompletionConfig::KeywordSignal(c) if c.completion_keyword.is_empty() => {
                Err(LoaderError::InvalidCompletionConfig {
                    kind: "keywordSignal".to_string(),
                    detail: "completionKeyword must be non-empty".to_string(),
                })
            }
            CompletionConfig::Composite(c) => {
                if matches!(c.operator, CompositeOperator::First) && c.children.is_empty() {
                    return Err(LoaderError::InvalidCompletionConfig {
                        kind: "composite".to_string(),
                        detail: "'first' operator requires at least one child".to_string(),
                    });
                }
                for child in &c.children {
                    child.validate()?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    Default,
    Plan,
    AcceptEdits,
    BypassPermissions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SandboxConfig {
    #[serde(default)]
    pub network_trusted_domains: Vec<String>,
    #[serde(default)]
    pub filesystem_allowed_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct BoundariesConfig {
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default = "default_permission_mode")]
    pub permission_mode: PermissionMode,
    #[serde(default)]
    pub sandbox: Option<SandboxConfig>,
}

fn default_permission_mode() -> PermissionMode {
    PermissionMode::Default
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct IntegrationsConfig {
    #[serde(default)]
    pub issue_tracker_enabled: bool,
    #[serde(default)]
    pub label_mapping: HashMap<String, String>,
    #[serde(default)]
    pub default_closure_action: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct WorktreeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub base_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct FinalizeConfig {
    #[serde(default)]
    pub auto_merge: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub create_pr: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub worktree: Option<WorktreeConfig>,
    #[serde(default)]
    pub finalize: Option<FinalizeConfig>,
}

/// Fenced action-block scanning configuration (`runner.actions`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ActionsConfig {
    #[serde(default = "default_output_format")]
    pub output_format: String,
    pub types: Vec<String>,
    #[serde(default)]
    pub terminal_types: Vec<String>,
    #[serde(default)]
    pub pre_close_validation: Option<PreCloseValidationConfig>,
}

fn default_output_format() -> String {
    "action".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailurePolicy {
    Block,
    Warn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PreCloseValidationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub validators: Vec<String>,
    #[serde(default = "default_on_failure")]
    pub on_failure: OnFailurePolicy,
}

fn default_true() -> bool {
    true
}

fn default_on_failure() -> OnFailurePolicy {
    OnFailurePolicy::Block
}

/// The full `runner` block of an `AgentDefinition`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerSpec {
    pub flow: FlowConfig,
    pub completion: CompletionConfig,
    pub boundaries: BoundariesConfig,
    #[serde(default)]
    pub integrations: IntegrationsConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    pub actions: ActionsConfig,
}

/// The immutable agent declaration loaded once per run (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AgentDefinition {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: HashMap<String, ParameterDecl>,
    pub runner: RunnerSpec,
}

impl AgentDefinition {
    pub fn validate(&self) -> Result<(), LoaderError> {
        self.runner.completion.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "name": "fix-issue",
            "displayName": "Fix Issue",
            "parameters": {},
            "runner": {
                "flow": {},
                "completion": {"type": "iterationBudget", "config": {"maxIterations": 5}},
                "boundaries": {"allowedTools": ["read", "write"]},
                "actions": {"types": ["log", "file"]}
            }
        }"#
    }

    #[test]
    fn parses_minimal_definition() {
        let def: AgentDefinition = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(def.name, "fix-issue");
        assert!(def.validate().is_ok());
        assert!(matches!(
            def.runner.completion,
            CompletionConfig::IterationBudget(_)
        ));
    }

    #[test]
    fn rejects_unknown_completion_type() {
        let json = sample_json().replace("iterationBudget", "totallyMadeUp");
        let result: Result<AgentDefinition, _> = serde_json::from_str(&json);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_empty_keyword_signal() {
        let json = sample_json().replace(
            r#"{"type": "iterationBudget", "config": {"maxIterations": 5}}"#,
            r#"{"type": "keywordSignal", "config": {"completionKeyword": ""}}"#,
        );
        let def: AgentDefinition = serde_json::from_str(&json).unwrap();
        assert!(def.validate().is_err());
    }

    #[test]
    fn rejects_unknown_top_level_field() {
        let json = sample_json().replace(
            "\"name\": \"fix-issue\",",
            "\"name\": \"fix-issue\", \"bogus\": true,",
        );
        let result: Result<AgentDefinition, _> = serde_json::from_str(&json);
        assert!(result.is_err());
    }
}
