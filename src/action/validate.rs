//! Pre-Close Validator Gate (L5 + spec §4.6): self-report check, evidence
//! consistency check, then a sequential run of a pluggable validator
//! registry. Grounded in the guardrail pattern (a callable that can block
//! a terminal output), generalized from task output to terminal actions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::action::types::DetectedAction;
use crate::definition::{OnFailurePolicy, PreCloseValidationConfig};
use crate::errors::ValidationBlock;

/// The result of a single named validator.
#[derive(Debug, Clone)]
pub struct ValidatorResult {
    pub valid: bool,
    pub error: Option<String>,
    pub details: Vec<String>,
}

impl ValidatorResult {
    pub fn pass() -> Self {
        Self {
            valid: true,
            error: None,
            details: Vec::new(),
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            details: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AggregateValidationResult {
    pub results: HashMap<String, ValidatorResult>,
}

impl AggregateValidationResult {
    pub fn all_valid(&self) -> bool {
        self.results.values().all(|r| r.valid)
    }
}

/// A pluggable pre-close validator. Validators run sequentially because a
/// later one may depend on an earlier one's side effects.
#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;
    async fn validate(&self, action: &DetectedAction) -> ValidatorResult;
}

/// Holds named validators. Constructed per `Runner` (dependency injection),
/// not as a process-global, per the runtime's registry design note.
#[derive(Default, Clone)]
pub struct ValidatorRegistry {
    validators: HashMap<String, Arc<dyn Validator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, validator: Arc<dyn Validator>) {
        self.validators.insert(validator.name().to_string(), validator);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Validator>> {
        self.validators.get(name)
    }
}

/// What the gate decided about one terminal action.
#[derive(Debug)]
pub enum GateOutcome {
    Pass,
    Blocked(ValidationBlock),
    /// Action may proceed, but carries a recorded warning.
    Warned(String),
}

/// Runs the pre-close gate for one terminal action.
pub async fn run_gate(
    action: &DetectedAction,
    config: &PreCloseValidationConfig,
    registry: &ValidatorRegistry,
) -> GateOutcome {
    if !config.enabled {
        return GateOutcome::Pass;
    }

    let validation = match action.metadata.get("validation").and_then(Value::as_object) {
        Some(obj) => obj,
        None => {
            return GateOutcome::Blocked(ValidationBlock::MissingValidationObject);
        }
    };

    for field in &config.required_fields {
        match validation.get(field) {
            Some(Value::Bool(true)) => {}
            _ => {
                return GateOutcome::Blocked(ValidationBlock::RequiredFieldFalse {
                    field: field.clone(),
                });
            }
        }
    }

    if let Some(evidence) = action.metadata.get("evidence").and_then(Value::as_object) {
        if let Some(detail) = find_contradiction(validation, evidence) {
            return GateOutcome::Blocked(ValidationBlock::EvidenceContradiction { detail });
        }
    }

    let mut aggregate = AggregateValidationResult::default();
    for name in &config.validators {
        let result = match registry.get(name) {
            Some(validator) => validator.validate(action).await,
            None => ValidatorResult::fail(format!("Validator error: unknown validator '{name}'")),
        };
        if !result.valid {
            aggregate.results.insert(name.clone(), result);
        } else {
            aggregate.results.insert(name.clone(), result);
        }
    }

    if !aggregate.all_valid() {
        let failure = aggregate
            .results
            .iter()
            .find(|(_, r)| !r.valid)
            .map(|(name, r)| (name.clone(), r.error.clone().unwrap_or_default()))
            .unwrap_or_default();

        let block = ValidationBlock::ValidatorFailed {
            name: failure.0,
            error: failure.1,
        };

        return match config.on_failure {
            OnFailurePolicy::Block => GateOutcome::Blocked(block),
            OnFailurePolicy::Warn => GateOutcome::Warned(block.to_string()),
        };
    }

    GateOutcome::Pass
}

/// Cross-checks self-reported `validation` fields against raw `evidence`
/// output. Generalizes the spec's literal example (`git_clean: true` vs. a
/// non-empty `git_status_output`) to any `"{x}_clean"` / `"{x}_status_output"`
/// pairing.
fn find_contradiction(validation: &Map<String, Value>, evidence: &Map<String, Value>) -> Option<String> {
    for (key, value) in validation {
        let Some(base) = key.strip_suffix("_clean") else {
            continue;
        };
        if value != &Value::Bool(true) {
            continue;
        }
        let evidence_key = format!("{base}_status_output");
        if let Some(Value::String(output)) = evidence.get(&evidence_key) {
            if !output.trim().is_empty() {
                return Some(format!(
                    "{key}=true but {evidence_key} is not empty: {output:?}"
                ));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action_with_metadata(metadata: Value) -> DetectedAction {
        DetectedAction {
            action_type: "issue-action".to_string(),
            content: None,
            metadata: metadata.as_object().unwrap().clone(),
            raw: String::new(),
        }
    }

    fn config() -> PreCloseValidationConfig {
        PreCloseValidationConfig {
            enabled: true,
            required_fields: vec!["git_clean".to_string()],
            validators: Vec::new(),
            on_failure: OnFailurePolicy::Block,
        }
    }

    #[tokio::test]
    async fn blocks_on_missing_validation_object() {
        let action = action_with_metadata(json!({"action": "close", "issue": 123}));
        let outcome = run_gate(&action, &config(), &ValidatorRegistry::new()).await;
        assert!(matches!(
            outcome,
            GateOutcome::Blocked(ValidationBlock::MissingValidationObject)
        ));
    }

    #[tokio::test]
    async fn blocks_on_false_required_field() {
        let action = action_with_metadata(json!({"validation": {"git_clean": false}}));
        let outcome = run_gate(&action, &config(), &ValidatorRegistry::new()).await;
        assert!(matches!(
            outcome,
            GateOutcome::Blocked(ValidationBlock::RequiredFieldFalse { .. })
        ));
    }

    #[tokio::test]
    async fn blocks_on_evidence_contradiction() {
        let action = action_with_metadata(json!({
            "validation": {"git_clean": true},
            "evidence": {"git_status_output": " M foo.ts"}
        }));
        let outcome = run_gate(&action, &config(), &ValidatorRegistry::new()).await;
        assert!(matches!(
            outcome,
            GateOutcome::Blocked(ValidationBlock::EvidenceContradiction { .. })
        ));
    }

    #[tokio::test]
    async fn passes_when_disabled() {
        let action = action_with_metadata(json!({}));
        let mut cfg = config();
        cfg.enabled = false;
        let outcome = run_gate(&action, &cfg, &ValidatorRegistry::new()).await;
        assert!(matches!(outcome, GateOutcome::Pass));
    }

    #[tokio::test]
    async fn passes_with_clean_evidence() {
        let action = action_with_metadata(json!({
            "validation": {"git_clean": true},
            "evidence": {"git_status_output": ""}
        }));
        let outcome = run_gate(&action, &config(), &ValidatorRegistry::new()).await;
        assert!(matches!(outcome, GateOutcome::Pass));
    }
}
