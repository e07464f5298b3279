//! On-disk loading of an `AgentDefinition` and its `StepsRegistry`
//! (spec §6 "On-disk layout per agent").

use std::fs;
use std::path::Path;

use crate::definition::{AgentDefinition, StepsRegistry};
use crate::errors::LoaderError;

pub fn load_agent_definition(path: impl AsRef<Path>) -> Result<AgentDefinition, LoaderError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| LoaderError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let def: AgentDefinition =
        serde_json::from_str(&raw).map_err(|source| LoaderError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    def.validate()?;
    Ok(def)
}

pub fn load_steps_registry(path: impl AsRef<Path>) -> Result<StepsRegistry, LoaderError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| LoaderError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let registry: StepsRegistry =
        serde_json::from_str(&raw).map_err(|source| LoaderError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    registry.validate()?;
    Ok(registry)
}

/// The on-disk `.agent/{name}/` directory, resolved from an agents root and
/// a name.
pub struct AgentDirectory {
    pub root: std::path::PathBuf,
}

impl AgentDirectory {
    pub fn new(agents_root: impl AsRef<Path>, name: &str) -> Self {
        Self {
            root: agents_root.as_ref().join(name),
        }
    }

    pub fn agent_json(&self) -> std::path::PathBuf {
        self.root.join("agent.json")
    }

    pub fn steps_registry_json(&self) -> std::path::PathBuf {
        self.root.join("steps_registry.json")
    }

    pub fn prompts_dir(&self) -> std::path::PathBuf {
        self.root.join("prompts")
    }

    pub fn schemas_dir(&self) -> std::path::PathBuf {
        self.root.join("schemas")
    }

    pub fn load(&self) -> Result<(AgentDefinition, StepsRegistry), LoaderError> {
        let def = load_agent_definition(self.agent_json())?;
        let registry = load_steps_registry(self.steps_registry_json())?;
        Ok((def, registry))
    }
}

/// Enumerate agent names available under an agents root (for `--list`).
pub fn list_agents(agents_root: impl AsRef<Path>) -> std::io::Result<Vec<String>> {
    let root = agents_root.as_ref();
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                if entry.path().join("agent.json").is_file() {
                    names.push(name.to_string());
                }
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_is_io_error() {
        let err = load_agent_definition("/nonexistent/agent.json").unwrap_err();
        assert!(matches!(err, LoaderError::Io { .. }));
    }

    #[test]
    fn list_agents_finds_only_dirs_with_agent_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a/agent.json"), "{}").unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();

        let names = list_agents(dir.path()).unwrap();
        assert_eq!(names, vec!["a".to_string()]);
    }
}
