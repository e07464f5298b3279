//! The Iteration Loop / Runner (C2, spec §4.7): drives one agent run to
//! completion. Grounded in `agents::crew_agent_executor::CrewAgentExecutor`
//! (message setup, iteration bound, parse-then-dispatch loop), generalized
//! from ReAct/native-tool dispatch into the ten-step algorithm this runtime
//! specifies: resolve prompt, call the backend, process the stream, detect
//! and execute actions, advance the step-flow engine, ask the completion
//! handler, and stop on completion, terminal step, or the hard iteration
//! cap.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::action::{
    detect, execute_actions, ActionContext, HandlerRegistry, IssueTracker, ValidatorRegistry,
};
use crate::backend::processor::process_stream;
use crate::backend::{QueryBackend, QueryRequest};
use crate::completion::{build_handler, CompletionContext, CompletionDeps, CompletionHandler, ExternalProbe};
use crate::definition::{AgentDefinition, StepsRegistry};
use crate::errors::{AgentRuntimeError, StepFlowError};
use crate::hooks::{HookRegistry, StepAction};
use crate::lifecycle::{Lifecycle, RunResult};
use crate::logging::{IterationLogger, LogFormat, LogLevel, LogWriter};
use crate::prompt::{PromptResolver, PromptVariables};
use crate::runner::options::RunOptions;
use crate::runner::summary::IterationSummary;
use crate::stepflow::{StepFlowEngine, StepFlowState};

/// Absolute backstop on iteration count, independent of any completion
/// handler's own budget (spec §4.7).
pub const DEFAULT_HARD_CAP: u32 = 50;

/// Retry cap applied to a step-flow error on a step that declares no
/// `iterations.max` of its own (spec §7: "Record and repeat; after step's
/// iterations.max, fail").
const DEFAULT_STEP_FLOW_RETRY_CAP: u32 = 3;

/// Everything a `Runner` needs beyond the static `AgentDefinition` /
/// `StepsRegistry` pair: the backend, registries, and ambient collaborators.
/// Constructed per run so registries stay dependency-injected rather than
/// process-global, per the runtime's design note.
pub struct RunnerDeps {
    pub backend: Arc<dyn QueryBackend>,
    pub handler_registry: HandlerRegistry,
    pub validator_registry: ValidatorRegistry,
    pub probe: Option<Arc<dyn ExternalProbe>>,
    pub issue_tracker: Option<Arc<dyn IssueTracker>>,
    pub hooks: HookRegistry,
    pub prompt_base_dir: PathBuf,
    pub log_writer: Box<dyn LogWriter>,
    pub log_format: LogFormat,
    pub iteration_timeout: Option<Duration>,
    pub hard_cap: u32,
}

impl RunnerDeps {
    pub fn new(
        backend: Arc<dyn QueryBackend>,
        prompt_base_dir: impl Into<PathBuf>,
        log_writer: Box<dyn LogWriter>,
    ) -> Self {
        Self {
            backend,
            handler_registry: HandlerRegistry::with_builtins(),
            validator_registry: ValidatorRegistry::new(),
            probe: None,
            issue_tracker: None,
            hooks: HookRegistry::new(),
            prompt_base_dir: prompt_base_dir.into(),
            log_writer,
            log_format: LogFormat::Jsonl,
            iteration_timeout: None,
            hard_cap: DEFAULT_HARD_CAP,
        }
    }

    pub fn with_handler_registry(mut self, registry: HandlerRegistry) -> Self {
        self.handler_registry = registry;
        self
    }

    pub fn with_validator_registry(mut self, registry: ValidatorRegistry) -> Self {
        self.validator_registry = registry;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn ExternalProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_issue_tracker(mut self, tracker: Arc<dyn IssueTracker>) -> Self {
        self.issue_tracker = Some(tracker);
        self
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_iteration_timeout(mut self, timeout: Duration) -> Self {
        self.iteration_timeout = Some(timeout);
        self
    }

    pub fn with_hard_cap(mut self, cap: u32) -> Self {
        self.hard_cap = cap;
        self
    }
}

/// Drives one `AgentDefinition` + `StepsRegistry` pair through the
/// iteration loop for a single run.
pub struct Runner {
    definition: AgentDefinition,
    steps_registry: StepsRegistry,
    resolver: PromptResolver,
    backend: Arc<dyn QueryBackend>,
    handler_registry: HandlerRegistry,
    validator_registry: ValidatorRegistry,
    completion_handler: Box<dyn CompletionHandler>,
    logger: Arc<IterationLogger>,
    hooks: HookRegistry,
    issue_tracker: Option<Arc<dyn IssueTracker>>,
    iteration_timeout: Option<Duration>,
    hard_cap: u32,
    lifecycle: Lifecycle,
    /// Per-step count of recovered step-flow errors (spec §7), reset once
    /// that step advances successfully.
    step_flow_retries: HashMap<String, u32>,
}

impl Runner {
    /// Build a `Runner`. `params` seeds the `CompletionDeps` used to
    /// construct the completion handler (e.g. `externalState`'s identifying
    /// parameter) — pass the same params the eventual `RunOptions` will
    /// carry.
    pub fn new(
        definition: AgentDefinition,
        steps_registry: StepsRegistry,
        params: HashMap<String, Value>,
        deps: RunnerDeps,
        verbose: bool,
    ) -> Result<Self, AgentRuntimeError> {
        let completion_deps = CompletionDeps {
            params,
            probe: deps.probe,
        };
        let completion_handler = build_handler(&definition.runner.completion, &completion_deps)?;

        let resolver = PromptResolver::new(deps.prompt_base_dir);
        let logger = Arc::new(IterationLogger::new(deps.log_writer, deps.log_format, verbose));

        Ok(Self {
            definition,
            steps_registry,
            resolver,
            backend: deps.backend,
            handler_registry: deps.handler_registry,
            validator_registry: deps.validator_registry,
            completion_handler,
            logger,
            hooks: deps.hooks,
            issue_tracker: deps.issue_tracker,
            iteration_timeout: deps.iteration_timeout,
            hard_cap: deps.hard_cap,
            lifecycle: Lifecycle::new(),
            step_flow_retries: HashMap::new(),
        })
    }

    pub fn logger(&self) -> Arc<IterationLogger> {
        self.logger.clone()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Run the agent to completion. `cancel` is polled at every suspension
    /// point (before each iteration, and implicitly via the backend's own
    /// timeout-wrapped await) so an external signal can stop the run
    /// promptly, per spec §5.
    pub async fn run(
        &mut self,
        options: &RunOptions,
        cancel: Arc<AtomicBool>,
    ) -> Result<RunResult, AgentRuntimeError> {
        self.lifecycle.initialize()?;
        self.lifecycle.start()?; // Initializing -> Ready
        self.lifecycle.start()?; // Ready -> Running

        let mode = options
            .params
            .get("mode")
            .and_then(Value::as_str)
            .map(str::to_string);
        let entry = self
            .steps_registry
            .entry_step
            .for_mode(mode.as_deref())
            .map(str::to_string)
            .ok_or_else(|| StepFlowError::UnknownEntryStep(mode.unwrap_or_default()))?;

        let mut state = StepFlowState::new(entry);
        let engine = StepFlowEngine::new();
        let vars = build_prompt_variables(options);

        let system_prompt = match self.resolver.resolve_system(&vars) {
            Ok(resolved) => {
                self.logger.log(
                    LogLevel::Debug,
                    &format!("system prompt resolved from {:?}", resolved.source),
                    None,
                );
                resolved.content
            }
            Err(e) => return self.fail_run(0, format!("system prompt resolution failed: {e}")),
        };

        let mut session_id: Option<String> = None;
        let mut summaries: Vec<IterationSummary> = Vec::new();
        let mut iteration: u32 = 0;

        loop {
            if cancel.load(Ordering::SeqCst) {
                return self.fail_run(iteration, "run cancelled");
            }

            let step_id = state.current_step_id.clone();
            let step_def = match self.steps_registry.steps.get(&step_id) {
                Some(s) => s.clone(),
                None => {
                    return self.fail_run(iteration, format!("current step '{step_id}' vanished from registry"))
                }
            };

            let step_action = self.hooks.invoke_before_step(&step_id, &Value::Null);
            if matches!(step_action, StepAction::Skip) {
                self.logger
                    .log(LogLevel::Info, "step skipped by hook", Some(&step_id));
                summaries.push(IterationSummary::new(iteration));
                iteration += 1;
                if iteration >= self.hard_cap {
                    return self.fail_run(iteration, "hard iteration cap reached after hook skip");
                }
                continue;
            }

            let iter_vars = match &step_action {
                StepAction::ReplaceInput(value) => {
                    let mut v = vars.clone();
                    v.input_text = Some(match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    });
                    v
                }
                _ => vars.clone(),
            };

            let resolved = match self.resolver.resolve_prompt_ref(&step_def.prompt, &step_id, &iter_vars) {
                Ok(r) => {
                    self.logger.log(
                        LogLevel::Debug,
                        &format!("step '{step_id}' prompt resolved from {:?}", r.source),
                        Some(&step_id),
                    );
                    r
                }
                Err(e) => return self.fail_run(iteration, format!("prompt resolution failed: {e}")),
            };

            let prompt = if iteration == 0 {
                resolved.content
            } else {
                let last = summaries.last().expect("iteration > 0 implies a prior summary");
                format!(
                    "{}\n\n{}",
                    resolved.content,
                    self.completion_handler.build_continuation_prompt(iteration, last)
                )
            };

            self.hooks.invoke_before_query(&step_id, session_id.as_deref());

            let request = QueryRequest {
                prompt,
                system_prompt: system_prompt.clone(),
                cwd: options.cwd.clone(),
                session_id: session_id.clone(),
                allowed_tools: self.definition.runner.boundaries.allowed_tools.clone(),
                permission_mode: self.definition.runner.boundaries.permission_mode,
                sandbox: self.definition.runner.boundaries.sandbox.clone(),
            };

            let mut summary = IterationSummary::new(iteration);

            let queried = match self.iteration_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, self.backend.query(request)).await {
                    Ok(inner) => inner,
                    Err(_) => {
                        let msg = format!("iteration {iteration} timed out after {timeout:?}");
                        self.logger.log(LogLevel::Warn, &msg, Some(&step_id));
                        summary.errors.push(msg);
                        self.hooks.invoke_after_query(&step_id, 0, false);
                        summaries.push(summary);
                        iteration += 1;
                        if iteration >= self.hard_cap {
                            return self.fail_run(iteration, "hard iteration cap reached after timeout");
                        }
                        continue;
                    }
                },
                None => self.backend.query(request).await,
            };

            let stream = match queried {
                Ok(s) => s,
                Err(e) => return self.fail_run(iteration, format!("backend query failed: {e}")),
            };

            let processed = process_stream(stream, &self.logger, &step_id).await;
            self.hooks.invoke_after_query(
                &step_id,
                processed.assistant_responses.len() + processed.tools_used.len(),
                processed.errors.is_empty(),
            );

            summary.assistant_responses = processed.assistant_responses;
            summary.tools_used = processed.tools_used;
            summary.errors.extend(processed.errors);
            if let Some(sid) = processed.session_id {
                session_id = Some(sid);
            }

            let concatenated = summary.assistant_responses.join("\n");
            let structured_output = parse_structured_output(&concatenated);
            summary.structured_output = structured_output.clone();

            let detected = detect(
                &concatenated,
                &self.definition.runner.actions.output_format,
                &self.definition.runner.actions.types,
            );

            let action_ctx = ActionContext {
                cwd: options.cwd.clone(),
                logger: self.logger.clone(),
                issue_tracker: self.issue_tracker.clone(),
            };

            let results = execute_actions(
                detected,
                &self.handler_registry,
                &action_ctx,
                &self.definition.runner.actions.terminal_types,
                self.definition.runner.actions.pre_close_validation.as_ref(),
                &self.validator_registry,
            )
            .await;

            for result in results {
                summary.record_action(result);
            }

            let step_flow_terminal = if step_def.is_terminal() {
                true
            } else {
                let structured_value = structured_output.clone().map(Value::Object);
                match engine.advance(&self.steps_registry, &mut state, &step_def, structured_value.as_ref()) {
                    Ok(decision) => {
                        self.step_flow_retries.remove(&step_id);
                        decision.terminal
                    }
                    // Retry budget exhaustion is itself the hard-failure signal
                    // (spec §7) — every other step-flow error is recorded on
                    // the iteration and the engine repeats the step, only
                    // escalating once that step's own retry budget is spent.
                    Err(e @ StepFlowError::RetryBudgetExceeded { .. }) => {
                        return self.fail_run(iteration, format!("step-flow error: {e}"));
                    }
                    Err(e) => {
                        let msg = format!("step-flow error: {e}");
                        self.logger.log(LogLevel::Warn, &msg, Some(&step_id));
                        summary.errors.push(msg);

                        let retries = self.step_flow_retries.entry(step_id.clone()).or_insert(0);
                        *retries += 1;
                        let max = step_def.iterations.max.unwrap_or(DEFAULT_STEP_FLOW_RETRY_CAP);
                        if *retries > max {
                            let reason = format!(
                                "step '{step_id}' exceeded its step-flow retry budget after repeated errors"
                            );
                            return self.fail_run(iteration, reason);
                        }
                        false
                    }
                }
            };

            let step_output = structured_output.clone().map(Value::Object).unwrap_or(Value::Null);
            self.hooks
                .invoke_after_step(&step_id, &step_output, summary.errors.is_empty());

            let ctx = CompletionContext {
                summary: &summary,
                step_flow_terminal,
            };
            let complete = self.completion_handler.is_complete(&ctx).await;

            summaries.push(summary);
            iteration += 1;

            if complete || step_flow_terminal {
                let reason = self
                    .completion_handler
                    .get_completion_description(summaries.last().unwrap());
                self.lifecycle.complete(reason, iteration)?;
                return Ok(self.lifecycle.stop().unwrap());
            }

            if iteration >= self.hard_cap {
                return self.fail_run(iteration, "hard iteration cap reached");
            }
        }
    }

    fn fail_run(&mut self, iterations: u32, reason: impl Into<String>) -> Result<RunResult, AgentRuntimeError> {
        let reason = reason.into();
        self.logger.log(LogLevel::Error, &reason, None);
        self.lifecycle.fail(reason, iterations)?;
        Ok(self.lifecycle.stop().unwrap())
    }
}

fn build_prompt_variables(options: &RunOptions) -> PromptVariables {
    let mut custom_variables = HashMap::new();
    for (key, value) in &options.params {
        let as_text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        custom_variables.insert(key.clone(), as_text);
    }
    let input_text = options
        .params
        .get("input")
        .and_then(Value::as_str)
        .map(str::to_string);

    PromptVariables {
        custom_variables,
        uv_variables: HashMap::new(),
        input_text,
        context: None,
    }
}

static JSON_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```json\s*\n([\s\S]*?)\n```").unwrap());

/// Recover a step's structured output from its concatenated assistant text:
/// the whole text if it parses as a JSON object, else the first fenced
/// ` ```json ``` ` block that does.
fn parse_structured_output(text: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text.trim()) {
        return Some(map);
    }
    let captures = JSON_FENCE.captures(text)?;
    let body = captures.get(1)?.as_str();
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeQueryBackend;
    use crate::backend::Message;
    use crate::definition::{
        ActionsConfig, AgentDefinition, BoundariesConfig, CompletionConfig, EntryStep,
        FlowConfig, FlowStepDefinition, IterationBudgetConfig, PromptRef, RunnerSpec, StepIterationsConfig,
        StepPhase, StepsRegistry,
    };
    use crate::logging::MemoryWriter;
    use std::collections::HashMap as Map2;

    fn minimal_definition(max_iterations: u32) -> AgentDefinition {
        AgentDefinition {
            name: "test-agent".to_string(),
            display_name: "Test Agent".to_string(),
            description: String::new(),
            parameters: Map2::new(),
            runner: RunnerSpec {
                flow: FlowConfig {
                    system_prompt_path: None,
                    prompt_registry_path: None,
                    fallback_directory: None,
                    structured_output_schema_base: None,
                    default_model: None,
                    auto_response: None,
                },
                completion: CompletionConfig::IterationBudget(IterationBudgetConfig { max_iterations }),
                boundaries: BoundariesConfig {
                    allowed_tools: Vec::new(),
                    permission_mode: crate::definition::PermissionMode::Default,
                    sandbox: None,
                },
                integrations: Default::default(),
                execution: Default::default(),
                actions: ActionsConfig {
                    output_format: "action".to_string(),
                    types: vec!["log".to_string()],
                    terminal_types: Vec::new(),
                    pre_close_validation: None,
                },
            },
        }
    }

    fn single_step_registry() -> StepsRegistry {
        let mut steps = Map2::new();
        steps.insert(
            "only".to_string(),
            FlowStepDefinition {
                phase: StepPhase::Initial,
                prompt: PromptRef::Direct {
                    path: "step.md".to_string(),
                    fallback: Some("Work on it.".to_string()),
                },
                uv_variables: Vec::new(),
                custom_variables: Map2::new(),
                structured_gate: None,
                transitions: Map2::new(),
                iterations: StepIterationsConfig::default(),
            },
        );
        StepsRegistry {
            version: "1".to_string(),
            base_path: "prompts".to_string(),
            entry_step: EntryStep::Single("only".to_string()),
            steps,
        }
    }

    #[tokio::test]
    async fn iteration_budget_terminates_after_configured_count() {
        let dir = tempfile::tempdir().unwrap();
        let definition = minimal_definition(2);
        let registry = single_step_registry();
        let script = vec![
            vec![Message::Assistant { content: "working".to_string() }],
            vec![Message::Assistant { content: "still working".to_string() }],
            vec![Message::Assistant { content: "should not be reached".to_string() }],
        ];
        let backend = Arc::new(FakeQueryBackend::new(script));
        let deps = RunnerDeps::new(backend.clone(), dir.path(), Box::new(MemoryWriter::new()));
        let mut runner = Runner::new(definition, registry, Map2::new(), deps, false).unwrap();

        let options = RunOptions::new("test-agent", dir.path());
        let result = runner.run(&options, Arc::new(AtomicBool::new(false))).await.unwrap();

        assert!(result.success);
        assert_eq!(result.iterations, 2);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn session_id_is_threaded_across_iterations() {
        let dir = tempfile::tempdir().unwrap();
        let definition = minimal_definition(2);
        let registry = single_step_registry();
        let script = vec![
            vec![
                Message::Assistant { content: "one".to_string() },
                Message::Result { session_id: "sess-1".to_string() },
            ],
            vec![Message::Assistant { content: "two".to_string() }],
        ];
        let backend = Arc::new(FakeQueryBackend::new(script));
        let deps = RunnerDeps::new(backend.clone(), dir.path(), Box::new(MemoryWriter::new()));
        let mut runner = Runner::new(definition, registry, Map2::new(), deps, false).unwrap();

        let options = RunOptions::new("test-agent", dir.path());
        runner.run(&options, Arc::new(AtomicBool::new(false))).await.unwrap();

        let requests = backend.requests.lock();
        assert_eq!(requests[0].session_id, None);
        assert_eq!(requests[1].session_id, Some("sess-1".to_string()));
    }

    #[tokio::test]
    async fn cancellation_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let definition = minimal_definition(50);
        let registry = single_step_registry();
        let script = vec![vec![Message::Assistant { content: "x".to_string() }]];
        let backend = Arc::new(FakeQueryBackend::new(script));
        let deps = RunnerDeps::new(backend, dir.path(), Box::new(MemoryWriter::new()));
        let mut runner = Runner::new(definition, registry, Map2::new(), deps, false).unwrap();

        let options = RunOptions::new("test-agent", dir.path());
        let cancel = Arc::new(AtomicBool::new(true));
        let result = runner.run(&options, cancel).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.reason, "run cancelled");
    }

    #[tokio::test]
    async fn ambiguous_intent_is_recovered_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut definition = minimal_definition(50);
        definition.runner.completion = CompletionConfig::StepMachine(Default::default());

        let mut steps = Map2::new();
        steps.insert(
            "a".to_string(),
            FlowStepDefinition {
                phase: StepPhase::Continuation,
                prompt: PromptRef::Direct {
                    path: "a.md".to_string(),
                    fallback: Some("Step A.".to_string()),
                },
                uv_variables: Vec::new(),
                custom_variables: Map2::new(),
                structured_gate: Some(crate::definition::StructuredGate {
                    schema_ref: "a.schema.json".to_string(),
                    intent_field: "next_action.action".to_string(),
                }),
                transitions: [("next".to_string(), "b".to_string()), ("handoff".to_string(), "c".to_string())]
                    .into_iter()
                    .collect(),
                iterations: StepIterationsConfig::default(),
            },
        );
        steps.insert(
            "b".to_string(),
            FlowStepDefinition {
                phase: StepPhase::Closure,
                prompt: PromptRef::Direct {
                    path: "b.md".to_string(),
                    fallback: Some("Step B.".to_string()),
                },
                uv_variables: Vec::new(),
                custom_variables: Map2::new(),
                structured_gate: None,
                transitions: Map2::new(),
                iterations: StepIterationsConfig::default(),
            },
        );
        let registry = StepsRegistry {
            version: "1".to_string(),
            base_path: "prompts".to_string(),
            entry_step: EntryStep::Single("a".to_string()),
            steps,
        };

        let script = vec![
            // No structured output at all, and "a" has two transitions: the
            // engine can't resolve an intent and returns AmbiguousIntent.
            vec![Message::Assistant { content: "thinking out loud".to_string() }],
            // Now declares an intent; the retried step advances normally.
            vec![Message::Assistant {
                content: "```json\n{\"next_action\": {\"action\": \"next\"}}\n```".to_string(),
            }],
        ];
        let backend = Arc::new(FakeQueryBackend::new(script));
        let deps = RunnerDeps::new(backend.clone(), dir.path(), Box::new(MemoryWriter::new()));
        let mut runner = Runner::new(definition, registry, Map2::new(), deps, false).unwrap();

        let options = RunOptions::new("test-agent", dir.path());
        let result = runner.run(&options, Arc::new(AtomicBool::new(false))).await.unwrap();

        assert!(result.success);
        assert_eq!(result.iterations, 2);
        assert_eq!(backend.call_count(), 2);
    }
}
