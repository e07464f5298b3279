//! Action Handlers (L4) and the Action Executor (spec §4.5). Grounded in
//! the tool-call dispatch pattern (`async_trait`, per-call usage tracking)
//! generalized from tool invocation to action-block dispatch, with the
//! registry constructed per `Runner` rather than process-global.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Value};

use crate::action::types::{ActionResult, DetectedAction};
use crate::action::validate::{run_gate, GateOutcome, ValidatorRegistry};
use crate::definition::PreCloseValidationConfig;
use crate::logging::{IterationLogger, LogLevel};

/// Abstract external issue tracker, kept out of the action-handler type
/// signature per the runtime's "no backend SDK types leak" design note.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn comment(&self, issue: u64, body: &str) -> Result<(), String>;
    async fn set_label(&self, issue: u64, label: &str) -> Result<(), String>;
    async fn close(&self, issue: u64) -> Result<(), String>;
}

/// Shared context every action handler receives.
pub struct ActionContext {
    pub cwd: PathBuf,
    pub logger: Arc<IterationLogger>,
    pub issue_tracker: Option<Arc<dyn IssueTracker>>,
}

/// One executable action type.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn action_type(&self) -> &str;
    async fn handle(&self, action: &DetectedAction, ctx: &ActionContext) -> ActionResult;
}

/// Holds the built-in and any caller-registered handlers, keyed by action
/// type. Constructed per `Runner`.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the four built-in handlers pre-registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LogActionHandler));
        registry.register(Arc::new(FileActionHandler));
        registry.register(Arc::new(IssueActionHandler));
        registry.register(Arc::new(CompletionSignalHandler));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(handler.action_type().to_string(), handler);
    }

    pub fn get(&self, action_type: &str) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(action_type)
    }
}

pub struct LogActionHandler;

#[async_trait]
impl ActionHandler for LogActionHandler {
    fn action_type(&self) -> &str {
        "log"
    }

    async fn handle(&self, action: &DetectedAction, ctx: &ActionContext) -> ActionResult {
        let message = action.content.clone().unwrap_or_default();
        ctx.logger.log(LogLevel::Info, message, None);
        ActionResult::ok(action.clone(), None)
    }
}

pub struct FileActionHandler;

#[async_trait]
impl ActionHandler for FileActionHandler {
    fn action_type(&self) -> &str {
        "file"
    }

    async fn handle(&self, action: &DetectedAction, ctx: &ActionContext) -> ActionResult {
        let Some(filename) = action.metadata.get("filename").and_then(Value::as_str) else {
            return ActionResult::failed(action.clone(), "missing 'filename' in metadata");
        };
        let content = action.content.clone().unwrap_or_default();
        let append = action
            .metadata
            .get("append")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let path = resolve_under(&ctx.cwd, filename);
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ActionResult::failed(action.clone(), format!("create_dir_all failed: {e}"));
            }
        }

        let result = if append {
            use tokio::io::AsyncWriteExt;
            match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
            {
                Ok(mut f) => f.write_all(content.as_bytes()).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            }
        } else {
            tokio::fs::write(&path, content.as_bytes())
                .await
                .map_err(|e| e.to_string())
        };

        match result {
            Ok(()) => ActionResult::ok(action.clone(), Some(json!({"path": path.display().to_string()}))),
            Err(e) => ActionResult::failed(action.clone(), e),
        }
    }
}

fn resolve_under(cwd: &Path, filename: &str) -> PathBuf {
    let candidate = Path::new(filename);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        cwd.join(candidate)
    }
}

pub struct IssueActionHandler;

#[async_trait]
impl ActionHandler for IssueActionHandler {
    fn action_type(&self) -> &str {
        "issue-action"
    }

    async fn handle(&self, action: &DetectedAction, ctx: &ActionContext) -> ActionResult {
        let Some(tracker) = ctx.issue_tracker.as_ref() else {
            return ActionResult::failed(action.clone(), "no issue tracker configured");
        };
        let Some(sub_action) = action.metadata.get("action").and_then(Value::as_str) else {
            return ActionResult::failed(action.clone(), "missing 'action' in metadata");
        };
        let Some(issue) = action.metadata.get("issue").and_then(Value::as_u64) else {
            return ActionResult::failed(action.clone(), "missing 'issue' in metadata");
        };
        let body = action.content.clone().unwrap_or_default();

        let outcome = match sub_action {
            "progress" | "question" | "blocked" => tracker.comment(issue, &body).await,
            "close" => tracker.close(issue).await,
            other => Err(format!("unknown issue-action '{other}'")),
        };

        if let (Some(label), "progress" | "question" | "blocked") =
            (action.metadata.get("label").and_then(Value::as_str), sub_action)
        {
            let _ = tracker.set_label(issue, label).await;
        }

        match outcome {
            Ok(()) => ActionResult::ok(action.clone(), Some(json!({"issue": issue, "action": sub_action}))),
            Err(e) => ActionResult::failed(action.clone(), e),
        }
    }
}

pub struct CompletionSignalHandler;

#[async_trait]
impl ActionHandler for CompletionSignalHandler {
    fn action_type(&self) -> &str {
        "completion-signal"
    }

    async fn handle(&self, action: &DetectedAction, _ctx: &ActionContext) -> ActionResult {
        ActionResult::ok(action.clone(), Some(json!({"completion_requested": true})))
    }
}

/// True if `action` is declared terminal: either its bare type, or its
/// `"{type}:{action}"` combination (e.g. `"issue-action:close"`), appears in
/// `terminal_types`.
pub fn is_terminal(action: &DetectedAction, terminal_types: &[String]) -> bool {
    if terminal_types.iter().any(|t| t == &action.action_type) {
        return true;
    }
    if let Some(sub) = action.metadata.get("action").and_then(Value::as_str) {
        let combo = format!("{}:{}", action.action_type, sub);
        if terminal_types.iter().any(|t| t == &combo) {
            return true;
        }
    }
    false
}

/// Executes all detected actions for one iteration. Terminal actions pass
/// through the pre-close gate first. All actions run concurrently; the
/// returned `Vec` preserves detection order regardless of completion order.
pub async fn execute_actions(
    actions: Vec<DetectedAction>,
    registry: &HandlerRegistry,
    ctx: &ActionContext,
    terminal_types: &[String],
    pre_close_config: Option<&PreCloseValidationConfig>,
    validator_registry: &ValidatorRegistry,
) -> Vec<ActionResult> {
    let futures = actions.into_iter().map(|action| async move {
        if is_terminal(&action, terminal_types) {
            if let Some(config) = pre_close_config {
                match run_gate(&action, config, validator_registry).await {
                    GateOutcome::Blocked(block) => {
                        return ActionResult::failed(action, block.to_string());
                    }
                    GateOutcome::Warned(warning) => {
                        log::warn!("pre-close gate warning for '{}': {warning}", action.action_type);
                    }
                    GateOutcome::Pass => {}
                }
            }
        }

        match registry.get(&action.action_type) {
            Some(handler) => handler.handle(&action, ctx).await,
            None => ActionResult::failed(
                action.clone(),
                format!("no handler registered for action type '{}'", action.action_type),
            ),
        }
    });

    join_all(futures).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{IterationLogger, LogFormat, MemoryWriter};
    use serde_json::json;

    fn ctx() -> (ActionContext, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let logger = Arc::new(IterationLogger::new(
            Box::new(MemoryWriter::new()),
            LogFormat::Jsonl,
            false,
        ));
        (
            ActionContext {
                cwd: dir.path().to_path_buf(),
                logger,
                issue_tracker: None,
            },
            dir,
        )
    }

    fn action(action_type: &str, content: Option<&str>, metadata: Value) -> DetectedAction {
        DetectedAction {
            action_type: action_type.to_string(),
            content: content.map(str::to_string),
            metadata: metadata.as_object().unwrap().clone(),
            raw: String::new(),
        }
    }

    #[tokio::test]
    async fn file_handler_writes_content() {
        let (context, dir) = ctx();
        let handler = FileActionHandler;
        let a = action("file", Some("hello"), json!({"filename": "out.txt", "append": false}));
        let result = handler.handle(&a, &context).await;
        assert!(result.success);
        let written = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(written, "hello");
    }

    #[tokio::test]
    async fn file_handler_requires_filename() {
        let (context, _dir) = ctx();
        let handler = FileActionHandler;
        let a = action("file", Some("x"), json!({}));
        let result = handler.handle(&a, &context).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn execute_actions_preserves_detection_order() {
        let (context, _dir) = ctx();
        let registry = HandlerRegistry::with_builtins();
        let validators = ValidatorRegistry::new();
        let actions = vec![
            action("log", Some("first"), json!({})),
            action("log", Some("second"), json!({})),
            action("log", Some("third"), json!({})),
        ];
        let results = execute_actions(actions, &registry, &context, &[], None, &validators).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].action.content.as_deref(), Some("first"));
        assert_eq!(results[1].action.content.as_deref(), Some("second"));
        assert_eq!(results[2].action.content.as_deref(), Some("third"));
    }

    #[tokio::test]
    async fn is_terminal_matches_type_and_subaction() {
        let terminal_types = vec!["issue-action:close".to_string()];
        let close = action("issue-action", None, json!({"action": "close", "issue": 1}));
        let comment = action("issue-action", None, json!({"action": "progress", "issue": 1}));
        assert!(is_terminal(&close, &terminal_types));
        assert!(!is_terminal(&comment, &terminal_types));
    }
}
