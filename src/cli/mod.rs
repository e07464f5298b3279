//! CLI surface (spec §6): a collaborator, not core. Hand-rolled argument
//! scanning in the teacher's `cli::mod::parse_command` style (string-literal
//! matching, no external arg-parsing crate) — the flag surface is small
//! enough that `clap` would be more machinery than the task needs, matching
//! the teacher's own choice to avoid it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::backend::StubQueryBackend;
use crate::definition::{list_agents, AgentDirectory, ParameterDecl, ParameterType};
use crate::logging::FileWriter;
use crate::runner::{Runner, RunnerDeps, RunOptions};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("--agent <name> is required (or pass --list to enumerate agents)")]
    MissingAgent,

    #[error("required parameter '--{0}' was not supplied")]
    MissingRequiredParameter(String),

    #[error("parameter '--{name}' expected a {expected} value, got '{value}'")]
    InvalidParameterType {
        name: String,
        expected: &'static str,
        value: String,
    },

    #[error("parameter '--{name}' failed validation: {detail}")]
    ValidationFailed { name: String, detail: String },
}

/// Parsed, not-yet-validated command-line input.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub agent: Option<String>,
    pub list: bool,
    pub init: bool,
    pub cwd: Option<PathBuf>,
    pub verbose: bool,
    /// Every other `--flag [value]` pair, keyed by flag name without the
    /// leading `--`. Boolean flags (no following value, or followed by
    /// another flag) are recorded as `"true"`.
    pub extra: HashMap<String, String>,
}

/// Scan `args` (typically `std::env::args().skip(1).collect::<Vec<_>>()`)
/// into `CliArgs`. Unrecognized `--name` flags are accepted speculatively
/// and validated later against the loaded agent's declared parameters.
pub fn parse_args(args: &[String]) -> CliArgs {
    let mut parsed = CliArgs::default();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "--agent" => {
                parsed.agent = args.get(i + 1).cloned();
                i += 2;
            }
            "--list" => {
                parsed.list = true;
                i += 1;
            }
            "--init" => {
                parsed.init = true;
                i += 1;
            }
            "--cwd" => {
                parsed.cwd = args.get(i + 1).map(PathBuf::from);
                i += 2;
            }
            "--verbose" => {
                parsed.verbose = true;
                i += 1;
            }
            flag if flag.starts_with("--") => {
                let name = flag.trim_start_matches("--").to_string();
                let next_is_value = args
                    .get(i + 1)
                    .map(|v| !v.starts_with("--"))
                    .unwrap_or(false);
                if next_is_value {
                    parsed.extra.insert(name, args[i + 1].clone());
                    i += 2;
                } else {
                    parsed.extra.insert(name, "true".to_string());
                    i += 1;
                }
            }
            _ => {
                i += 1;
            }
        }
    }
    parsed
}

/// Validate `extra` flags against an agent's declared parameters, producing
/// the `params` map a `RunOptions` carries. A declared parameter with no
/// `cli` mapping is never settable from the command line.
pub fn resolve_params(
    extra: &HashMap<String, String>,
    declared: &HashMap<String, ParameterDecl>,
) -> Result<HashMap<String, Value>, CliError> {
    let mut resolved = HashMap::new();

    for (param_name, decl) in declared {
        let Some(cli_flag) = decl.cli.as_deref() else {
            continue;
        };
        let flag_key = cli_flag.trim_start_matches("--");

        let raw = match extra.get(flag_key) {
            Some(v) => Some(v.clone()),
            None => None,
        };

        let value = match raw {
            Some(text) => Some(coerce(param_name, &text, decl.param_type)?),
            None => decl.default.clone(),
        };

        let Some(value) = value else {
            if decl.required {
                return Err(CliError::MissingRequiredParameter(param_name.clone()));
            }
            continue;
        };

        if let Some(validation) = &decl.validation {
            validate_value(param_name, &value, validation)?;
        }

        resolved.insert(param_name.clone(), value);
    }

    Ok(resolved)
}

fn coerce(name: &str, text: &str, param_type: ParameterType) -> Result<Value, CliError> {
    match param_type {
        ParameterType::String => Ok(Value::String(text.to_string())),
        ParameterType::Number => text
            .parse::<f64>()
            .map(|n| Value::from(n))
            .map_err(|_| CliError::InvalidParameterType {
                name: name.to_string(),
                expected: "number",
                value: text.to_string(),
            }),
        ParameterType::Boolean => match text {
            "true" | "1" | "yes" => Ok(Value::Bool(true)),
            "false" | "0" | "no" => Ok(Value::Bool(false)),
            _ => Err(CliError::InvalidParameterType {
                name: name.to_string(),
                expected: "boolean",
                value: text.to_string(),
            }),
        },
    }
}

fn validate_value(
    name: &str,
    value: &Value,
    validation: &crate::definition::ParameterValidation,
) -> Result<(), CliError> {
    if let Some(n) = value.as_f64() {
        if let Some(min) = validation.min {
            if n < min {
                return Err(CliError::ValidationFailed {
                    name: name.to_string(),
                    detail: format!("{n} is below minimum {min}"),
                });
            }
        }
        if let Some(max) = validation.max {
            if n > max {
                return Err(CliError::ValidationFailed {
                    name: name.to_string(),
                    detail: format!("{n} is above maximum {max}"),
                });
            }
        }
    }

    if let Some(text) = value.as_str() {
        if let Some(pattern) = &validation.pattern {
            let re = regex::Regex::new(pattern).map_err(|e| CliError::ValidationFailed {
                name: name.to_string(),
                detail: format!("invalid pattern '{pattern}': {e}"),
            })?;
            if !re.is_match(text) {
                return Err(CliError::ValidationFailed {
                    name: name.to_string(),
                    detail: format!("'{text}' does not match pattern '{pattern}'"),
                });
            }
        }
        if let Some(enum_values) = &validation.enum_values {
            if !enum_values.iter().any(|v| v == text) {
                return Err(CliError::ValidationFailed {
                    name: name.to_string(),
                    detail: format!("'{text}' is not one of {enum_values:?}"),
                });
            }
        }
    }

    Ok(())
}

/// Scaffold a new agent directory: `agent.json`, `steps_registry.json`, and
/// an empty `prompts/`/`schemas/` pair, per spec §6 "On-disk layout".
pub fn scaffold_agent(agents_root: &std::path::Path, name: &str) -> std::io::Result<PathBuf> {
    let root = agents_root.join(name);
    std::fs::create_dir_all(root.join("prompts"))?;
    std::fs::create_dir_all(root.join("schemas"))?;

    let agent_json = serde_json::json!({
        "name": name,
        "displayName": name,
        "parameters": {},
        "runner": {
            "flow": {},
            "completion": {"type": "iterationBudget", "config": {"maxIterations": 10}},
            "boundaries": {"allowedTools": []},
            "actions": {"types": ["log"]}
        }
    });
    std::fs::write(root.join("agent.json"), serde_json::to_string_pretty(&agent_json)?)?;

    let steps_registry = serde_json::json!({
        "version": "1",
        "basePath": "prompts",
        "entryStep": "initial",
        "steps": {
            "initial": {
                "phase": "initial",
                "prompt": {"path": "initial.md", "fallback": "Begin working on the task."}
            }
        }
    });
    std::fs::write(
        root.join("steps_registry.json"),
        serde_json::to_string_pretty(&steps_registry)?,
    )?;

    Ok(root)
}

/// What `run` decided before exiting: the process exit code, plus whatever
/// diagnostic text should be printed (to stdout on success, stderr on
/// failure), per spec §6 "Exit codes".
pub struct CliOutcome {
    pub exit_code: i32,
    pub message: String,
}

impl CliOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self { exit_code: 0, message: message.into() }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self { exit_code: 1, message: message.into() }
    }
}

/// Drive the parsed `CliArgs` to completion: `--list`, `--init`, or a real
/// run against an agent loaded from `agents_root`. `cancel` is handed
/// straight through to the `Runner` so a `ctrlc` handler installed by the
/// binary entrypoint can interrupt an in-flight run.
pub async fn dispatch(
    args: CliArgs,
    agents_root: &Path,
    cancel: Arc<AtomicBool>,
) -> CliOutcome {
    if args.list {
        return match list_agents(agents_root) {
            Ok(names) if names.is_empty() => CliOutcome::ok("(no agents found)"),
            Ok(names) => CliOutcome::ok(names.join("\n")),
            Err(e) => CliOutcome::failed(format!("failed to list agents: {e}")),
        };
    }

    let Some(agent_name) = args.agent.clone() else {
        return CliOutcome::failed(CliError::MissingAgent.to_string());
    };

    if args.init {
        return match scaffold_agent(agents_root, &agent_name) {
            Ok(root) => CliOutcome::ok(format!("scaffolded agent at {}", root.display())),
            Err(e) => CliOutcome::failed(format!("failed to scaffold agent '{agent_name}': {e}")),
        };
    }

    run_agent(&agent_name, args, agents_root, cancel).await
}

async fn run_agent(
    agent_name: &str,
    args: CliArgs,
    agents_root: &Path,
    cancel: Arc<AtomicBool>,
) -> CliOutcome {
    let directory = AgentDirectory::new(agents_root, agent_name);
    let (definition, steps_registry) = match directory.load() {
        Ok(pair) => pair,
        Err(e) => return CliOutcome::failed(format!("failed to load agent '{agent_name}': {e}")),
    };

    let params = match resolve_params(&args.extra, &definition.parameters) {
        Ok(p) => p,
        Err(e) => return CliOutcome::failed(e.to_string()),
    };

    let cwd = args.cwd.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut options = RunOptions::new(agent_name, cwd.clone()).with_verbose(args.verbose);
    for (key, value) in params.clone() {
        options = options.with_param(key, value);
    }

    let log_path = directory.root.join("logs").join(format!("{agent_name}.jsonl"));
    let writer = match FileWriter::create(&log_path) {
        Ok(w) => Box::new(w),
        Err(e) => return CliOutcome::failed(format!("failed to open log file: {e}")),
    };

    let deps = RunnerDeps::new(
        Arc::new(StubQueryBackend),
        directory.prompts_dir(),
        writer,
    );

    let mut runner = match Runner::new(definition, steps_registry, params, deps, args.verbose) {
        Ok(r) => r,
        Err(e) => return CliOutcome::failed(format!("failed to construct runner: {e}")),
    };

    match runner.run(&options, cancel).await {
        Ok(result) if result.success => {
            CliOutcome::ok(format!("run succeeded after {} iteration(s): {}", result.iterations, result.reason))
        }
        Ok(result) => {
            CliOutcome::failed(format!("run failed after {} iteration(s): {}", result.iterations, result.reason))
        }
        Err(e) => CliOutcome::failed(format!("run errored: {e}")),
    }
}

/// Install a `ctrlc` handler that flips the returned flag on SIGINT,
/// mirroring the teacher's own graceful-shutdown wiring.
pub fn install_cancel_handler() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    let _ = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    });
    cancel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_agent_and_cwd_flags() {
        let args = vec![
            "--agent".to_string(),
            "fix-issue".to_string(),
            "--cwd".to_string(),
            "/tmp/work".to_string(),
            "--verbose".to_string(),
        ];
        let parsed = parse_args(&args);
        assert_eq!(parsed.agent.as_deref(), Some("fix-issue"));
        assert_eq!(parsed.cwd, Some(PathBuf::from("/tmp/work")));
        assert!(parsed.verbose);
    }

    #[test]
    fn boolean_flag_without_value_is_recorded_as_true() {
        let args = vec!["--dry-run".to_string(), "--agent".to_string(), "x".to_string()];
        let parsed = parse_args(&args);
        assert_eq!(parsed.extra.get("dry-run").map(String::as_str), Some("true"));
    }

    #[test]
    fn resolve_params_applies_declared_default() {
        let mut declared = HashMap::new();
        declared.insert(
            "issue".to_string(),
            ParameterDecl {
                param_type: ParameterType::Number,
                required: false,
                default: Some(Value::from(1)),
                cli: Some("--issue".to_string()),
                validation: None,
            },
        );
        let resolved = resolve_params(&HashMap::new(), &declared).unwrap();
        assert_eq!(resolved.get("issue"), Some(&Value::from(1.0)));
    }

    #[test]
    fn resolve_params_rejects_missing_required() {
        let mut declared = HashMap::new();
        declared.insert(
            "issue".to_string(),
            ParameterDecl {
                param_type: ParameterType::Number,
                required: true,
                default: None,
                cli: Some("--issue".to_string()),
                validation: None,
            },
        );
        let err = resolve_params(&HashMap::new(), &declared).unwrap_err();
        assert!(matches!(err, CliError::MissingRequiredParameter(_)));
    }

    #[test]
    fn resolve_params_enforces_enum_validation() {
        let mut declared = HashMap::new();
        declared.insert(
            "mode".to_string(),
            ParameterDecl {
                param_type: ParameterType::String,
                required: true,
                default: None,
                cli: Some("--mode".to_string()),
                validation: Some(crate::definition::ParameterValidation {
                    min: None,
                    max: None,
                    pattern: None,
                    enum_values: Some(vec!["fast".to_string(), "thorough".to_string()]),
                }),
            },
        );
        let mut extra = HashMap::new();
        extra.insert("mode".to_string(), "slow".to_string());
        let err = resolve_params(&extra, &declared).unwrap_err();
        assert!(matches!(err, CliError::ValidationFailed { .. }));
    }
}
