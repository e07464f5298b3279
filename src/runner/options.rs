//! `RunOptions`: the resolved input a caller (the CLI, or any other
//! embedder) hands to a `Runner`. Not part of the original data model —
//! the Runner's constructor needs a concrete type instead of an `Any`-typed
//! boundary, grounded in the teacher's `CrewAgentExecutor` constructor
//! taking a concrete execution-context struct rather than loose arguments.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub agent_name: String,
    pub cwd: PathBuf,
    pub params: HashMap<String, Value>,
    pub verbose: bool,
}

impl RunOptions {
    pub fn new(agent_name: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            agent_name: agent_name.into(),
            cwd: cwd.into(),
            params: HashMap::new(),
            verbose: false,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}
