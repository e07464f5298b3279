//! Ambient hook surface: optional observers over step transitions and
//! backend calls. Not named in the core component list — this is
//! observability scaffolding a caller may attach to a `Runner`, grounded in
//! the teacher's `AgentHook`/`StepHook`/`ModelHook`/`HookRegistry` pattern
//! (default no-op methods, advisory errors that are logged and swallowed).

use async_trait::async_trait;
use serde_json::Value;

/// What a `StepHook::before_step` wants to happen next.
#[derive(Debug, Clone)]
pub enum StepAction {
    Continue,
    Skip,
    ReplaceInput(Value),
}

/// Error type for hook invocations. Hooks should not panic; the registry
/// logs and continues (hooks are advisory, never load-bearing).
#[derive(Debug, Clone)]
pub struct HookError {
    pub message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for HookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HookError: {}", self.message)
    }
}

impl std::error::Error for HookError {}

impl From<&str> for HookError {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Observes (and may gate) step transitions.
#[async_trait]
pub trait StepHook: Send + Sync + 'static {
    fn before_step(&self, _step_id: &str, _input: &Value) -> Result<StepAction, HookError> {
        Ok(StepAction::Continue)
    }

    fn after_step(&self, _step_id: &str, _output: &Value, _success: bool) -> Result<(), HookError> {
        Ok(())
    }
}

/// Observes query-backend calls.
#[async_trait]
pub trait ModelHook: Send + Sync + 'static {
    fn before_query(&self, _step_id: &str, _session_id: Option<&str>) -> Result<(), HookError> {
        Ok(())
    }

    fn after_query(&self, _step_id: &str, _message_count: usize, _success: bool) -> Result<(), HookError> {
        Ok(())
    }
}

/// Holds caller-registered hooks. Constructed per `Runner`, never process-
/// global, per the runtime's dependency-injected-registry design note.
#[derive(Default)]
pub struct HookRegistry {
    pub step_hooks: Vec<Box<dyn StepHook>>,
    pub model_hooks: Vec<Box<dyn ModelHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_step_hook(&mut self, hook: impl StepHook) {
        self.step_hooks.push(Box::new(hook));
    }

    pub fn register_model_hook(&mut self, hook: impl ModelHook) {
        self.model_hooks.push(Box::new(hook));
    }

    /// Invoke all step hooks; returns `Skip`/`ReplaceInput` from the first
    /// hook that requests one, otherwise `Continue`.
    pub fn invoke_before_step(&self, step_id: &str, input: &Value) -> StepAction {
        for hook in &self.step_hooks {
            match hook.before_step(step_id, input) {
                Ok(StepAction::Skip) => return StepAction::Skip,
                Ok(StepAction::ReplaceInput(v)) => return StepAction::ReplaceInput(v),
                Ok(StepAction::Continue) => {}
                Err(e) => log::warn!("StepHook.before_step error: {e}"),
            }
        }
        StepAction::Continue
    }

    pub fn invoke_after_step(&self, step_id: &str, output: &Value, success: bool) {
        for hook in &self.step_hooks {
            if let Err(e) = hook.after_step(step_id, output, success) {
                log::warn!("StepHook.after_step error: {e}");
            }
        }
    }

    pub fn invoke_before_query(&self, step_id: &str, session_id: Option<&str>) {
        for hook in &self.model_hooks {
            if let Err(e) = hook.before_query(step_id, session_id) {
                log::warn!("ModelHook.before_query error: {e}");
            }
        }
    }

    pub fn invoke_after_query(&self, step_id: &str, message_count: usize, success: bool) {
        for hook in &self.model_hooks {
            if let Err(e) = hook.after_query(step_id, message_count, success) {
                log::warn!("ModelHook.after_query error: {e}");
            }
        }
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("step_hooks", &self.step_hooks.len())
            .field("model_hooks", &self.model_hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DenyHook;
    impl StepHook for DenyHook {
        fn before_step(&self, _step_id: &str, _input: &Value) -> Result<StepAction, HookError> {
            Ok(StepAction::Skip)
        }
    }

    #[test]
    fn registry_starts_empty() {
        let registry = HookRegistry::new();
        assert_eq!(registry.step_hooks.len(), 0);
    }

    #[test]
    fn skip_from_one_hook_short_circuits() {
        let mut registry = HookRegistry::new();
        registry.register_step_hook(DenyHook);
        let action = registry.invoke_before_step("a", &Value::Null);
        assert!(matches!(action, StepAction::Skip));
    }
}
