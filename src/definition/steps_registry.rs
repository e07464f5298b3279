//! `StepsRegistry`: the declared set of flow steps, their prompts, gates,
//! and transitions (spec §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::LoaderError;

/// Where a step's entry point lives: either a single step for every mode,
/// or a mapping from a named mode to its entry step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryStep {
    Single(String),
    ByMode(HashMap<String, String>),
}

impl EntryStep {
    pub fn for_mode(&self, mode: Option<&str>) -> Option<&str> {
        match self {
            EntryStep::Single(step) => Some(step.as_str()),
            EntryStep::ByMode(map) => mode
                .and_then(|m| map.get(m))
                .or_else(|| map.get("default"))
                .map(String::as_str),
        }
    }

    fn all_steps(&self) -> Vec<&str> {
        match self {
            EntryStep::Single(step) => vec![step.as_str()],
            EntryStep::ByMode(map) => map.values().map(String::as_str).collect(),
        }
    }
}

/// Either a direct prompt file path, or a C3L-addressed reference resolved
/// as `{c1}/{c2}/{c3}/f_{edition}_{adaptation}.md`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptRef {
    Direct {
        path: String,
        #[serde(default)]
        fallback: Option<String>,
    },
    C3L {
        c1: String,
        c2: String,
        c3: String,
        #[serde(default = "default_edition")]
        edition: String,
        #[serde(default = "default_adaptation")]
        adaptation: String,
        #[serde(default)]
        fallback: Option<String>,
    },
}

fn default_edition() -> String {
    "v1".to_string()
}

fn default_adaptation() -> String {
    "default".to_string()
}

/// Where a declared custom variable's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CustomVariableSource {
    Stdin,
    ExternalService,
    Computed,
    Parameter,
    Context,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CustomVariableDecl {
    pub source: CustomVariableSource,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct StructuredGate {
    pub schema_ref: String,
    pub intent_field: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct StepIterationsConfig {
    #[serde(default)]
    pub min: Option<u32>,
    #[serde(default)]
    pub max: Option<u32>,
}

/// The phase tag that bounds which intents a step may legally emit
/// (spec §4.2 "Phase rules").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepPhase {
    Initial,
    Continuation,
    Verification,
    Closure,
}

impl StepPhase {
    /// Reserved intents this phase may legally emit, per spec §4.2.
    pub fn allowed_reserved_intents(&self) -> &'static [&'static str] {
        match self {
            StepPhase::Initial => &["next", "repeat"],
            StepPhase::Continuation => &["next", "repeat", "handoff"],
            StepPhase::Verification => &["next", "repeat"],
            StepPhase::Closure => &["closing", "repeat"],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct FlowStepDefinition {
    pub phase: StepPhase,
    pub prompt: PromptRef,
    #[serde(default)]
    pub uv_variables: Vec<String>,
    #[serde(default)]
    pub custom_variables: HashMap<String, CustomVariableDecl>,
    #[serde(default)]
    pub structured_gate: Option<StructuredGate>,
    #[serde(default)]
    pub transitions: HashMap<String, String>,
    #[serde(default)]
    pub iterations: StepIterationsConfig,
}

impl FlowStepDefinition {
    /// True if this step has no outgoing transitions at all — a terminal
    /// step, which per spec §3 must be reachable only via `closing`.
    pub fn is_terminal(&self) -> bool {
        self.transitions.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct StepsRegistry {
    pub version: String,
    pub base_path: String,
    pub entry_step: EntryStep,
    pub steps: HashMap<String, FlowStepDefinition>,
}

impl StepsRegistry {
    /// Validates the invariants from spec §3: every `entryStep` exists,
    /// every transition target exists, and terminal steps are reachable
    /// only via a `closing` transition.
    pub fn validate(&self) -> Result<(), LoaderError> {
        for entry in self.entry_step.all_steps() {
            if !self.steps.contains_key(entry) {
                return Err(LoaderError::UnknownEntryStep(entry.to_string()));
            }
        }

        for (step_id, step) in &self.steps {
            for target in step.transitions.values() {
                if !self.steps.contains_key(target) {
                    return Err(LoaderError::DanglingTransition {
                        step: step_id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        for (step_id, step) in &self.steps {
            if !step.is_terminal() {
                continue;
            }
            for other in self.steps.values() {
                for (intent, target) in &other.transitions {
                    if target == step_id && intent != "closing" {
                        return Err(LoaderError::InvalidCompletionConfig {
                            kind: "stepsRegistry".to_string(),
                            detail: format!(
                                "terminal step '{step_id}' is reachable by non-closing intent '{intent}'"
                            ),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_json() -> &'static str {
        r#"{
            "version": "1",
            "basePath": "prompts",
            "entryStep": "initial.issue",
            "steps": {
                "initial.issue": {
                    "phase": "initial",
                    "prompt": {"path": "initial.md"},
                    "transitions": {"next": "continuation.issue"}
                },
                "continuation.issue": {
                    "phase": "continuation",
                    "prompt": {"path": "continuation.md"},
                    "transitions": {"closing": "closure.issue"}
                },
                "closure.issue": {
                    "phase": "closure",
                    "prompt": {"path": "closure.md"}
                }
            }
        }"#
    }

    #[test]
    fn valid_registry_passes_validation() {
        let reg: StepsRegistry = serde_json::from_str(registry_json()).unwrap();
        assert!(reg.validate().is_ok());
    }

    #[test]
    fn dangling_transition_is_rejected() {
        let json = registry_json().replace(
            r#""next": "continuation.issue""#,
            r#""next": "nonexistent.step""#,
        );
        let reg: StepsRegistry = serde_json::from_str(&json).unwrap();
        assert!(reg.validate().is_err());
    }

    #[test]
    fn unknown_entry_step_is_rejected() {
        let json = registry_json().replace(
            "\"entryStep\": \"initial.issue\"",
            "\"entryStep\": \"nope\"",
        );
        let reg: StepsRegistry = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            reg.validate(),
            Err(LoaderError::UnknownEntryStep(_))
        ));
    }
}
