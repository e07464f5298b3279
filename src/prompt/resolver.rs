//! Two-tier prompt resolution: a file on disk, falling back to the embedded
//! default pack, with `{name}`-style variable substitution.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::Value as YamlValue;

use crate::definition::PromptRef;
use crate::errors::PromptError;
use crate::prompt::fallback;

/// Where a resolved prompt's content came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    File(PathBuf),
    Fallback,
}

/// A fully substituted prompt, tagged with its origin.
#[derive(Debug, Clone)]
pub struct ResolvedPrompt {
    pub content: String,
    pub source: PromptSource,
    /// YAML frontmatter parsed from the file, if present and valid.
    pub frontmatter: Option<YamlValue>,
}

/// Variables available for substitution, in descending precedence:
/// `custom_variables` overrides `uv_variables`, which overrides the
/// ambient `input_text`/`context` values.
#[derive(Debug, Clone, Default)]
pub struct PromptVariables {
    pub custom_variables: HashMap<String, String>,
    pub uv_variables: HashMap<String, String>,
    pub input_text: Option<String>,
    pub context: Option<String>,
}

impl PromptVariables {
    fn resolve(&self, name: &str) -> Option<&str> {
        if let Some(v) = self.custom_variables.get(name) {
            return Some(v);
        }
        if let Some(stripped) = name.strip_prefix("uv-") {
            if let Some(v) = self.uv_variables.get(stripped) {
                return Some(v);
            }
        }
        match name {
            "inputText" => self.input_text.as_deref(),
            "context" => self.context.as_deref(),
            _ => None,
        }
    }
}

/// Resolves system and step prompts for one agent, preferring files under
/// `base_dir` and falling back to the embedded defaults.
pub struct PromptResolver {
    base_dir: PathBuf,
    /// `{c1}/{c2}/{c3}/f_{edition}_{adaptation}.md`, with the braces
    /// literally substituted. Configurable per the runtime's path-template
    /// design note.
    path_template: String,
    allow_missing_variables: bool,
}

impl PromptResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            path_template: "{c1}/{c2}/{c3}/f_{edition}_{adaptation}.md".to_string(),
            allow_missing_variables: false,
        }
    }

    pub fn with_path_template(mut self, template: impl Into<String>) -> Self {
        self.path_template = template.into();
        self
    }

    pub fn with_allow_missing_variables(mut self, allow: bool) -> Self {
        self.allow_missing_variables = allow;
        self
    }

    /// Resolve the system prompt: `<base_dir>/system.md`, falling back to
    /// the embedded default.
    pub fn resolve_system(&self, vars: &PromptVariables) -> Result<ResolvedPrompt, PromptError> {
        let path = self.base_dir.join("system.md");
        self.resolve_from(&path, fallback::SYSTEM, "system", vars)
    }

    /// Resolve a step's prompt from its declared `PromptRef`, whether a
    /// direct path or a C3L-addressed reference, using a per-reference
    /// fallback string when one is declared instead of the embedded default.
    pub fn resolve_prompt_ref(
        &self,
        prompt_ref: &PromptRef,
        step: &str,
        vars: &PromptVariables,
    ) -> Result<ResolvedPrompt, PromptError> {
        let mut merged = vars.clone();
        merged
            .custom_variables
            .entry("step".to_string())
            .or_insert_with(|| step.to_string());

        match prompt_ref {
            PromptRef::Direct { path, fallback } => {
                let full = self.base_dir.join(path);
                let fallback_text = fallback.as_deref().unwrap_or(fallback::STEP_DEFAULT);
                self.resolve_from(&full, fallback_text, step, &merged)
            }
            PromptRef::C3L {
                c1,
                c2,
                c3,
                edition,
                adaptation,
                fallback,
            } => {
                let rel = self
                    .path_template
                    .replace("{c1}", c1)
                    .replace("{c2}", c2)
                    .replace("{c3}", c3)
                    .replace("{edition}", edition)
                    .replace("{adaptation}", adaptation);
                let full = self.base_dir.join(rel);
                let fallback_text = fallback.as_deref().unwrap_or(fallback::STEP_DEFAULT);
                self.resolve_from(&full, fallback_text, step, &merged)
            }
        }
    }

    fn resolve_from(
        &self,
        path: &Path,
        fallback_template: &str,
        key: &str,
        vars: &PromptVariables,
    ) -> Result<ResolvedPrompt, PromptError> {
        let (raw, source) = match fs::read_to_string(path) {
            Ok(text) => (text, PromptSource::File(path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (fallback_template.to_string(), PromptSource::Fallback)
            }
            Err(source) => {
                return Err(PromptError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let (frontmatter, body) = strip_frontmatter(&raw, path);
        let content = substitute(&body, vars, key, self.allow_missing_variables)?;

        Ok(ResolvedPrompt {
            content,
            source,
            frontmatter,
        })
    }
}

/// Strips a leading `---\n ... \n---\n` YAML frontmatter block, if present.
/// Invalid YAML is logged and the raw text is returned unstripped, per the
/// runtime's warn-and-continue policy.
fn strip_frontmatter(raw: &str, path: &Path) -> (Option<YamlValue>, String) {
    let Some(rest) = raw.strip_prefix("---\n") else {
        return (None, raw.to_string());
    };
    let Some(end) = rest.find("\n---\n") else {
        return (None, raw.to_string());
    };
    let (yaml_block, body) = rest.split_at(end);
    let body = &body[5..]; // skip "\n---\n"

    match serde_yaml::from_str::<YamlValue>(yaml_block) {
        Ok(value) => (Some(value), body.to_string()),
        Err(e) => {
            log::warn!(
                "invalid YAML frontmatter in '{}', using raw content: {e}",
                path.display()
            );
            (None, raw.to_string())
        }
    }
}

/// Replaces `{name}` placeholders in `template` using `vars`. Unresolved
/// placeholders are errors unless `allow_missing` is set, in which case they
/// are left untouched.
fn substitute(
    template: &str,
    vars: &PromptVariables,
    key: &str,
    allow_missing: bool,
) -> Result<String, PromptError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    let bytes = template.as_bytes();

    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i + 1..].find('}') {
                let name = &template[i + 1..i + 1 + end];
                if is_placeholder_name(name) {
                    match vars.resolve(name) {
                        Some(value) => {
                            out.push_str(value);
                            i += end + 2;
                            continue;
                        }
                        None if allow_missing => {
                            out.push_str(&template[i..i + 1 + end + 1]);
                            i += end + 2;
                            continue;
                        }
                        None => {
                            return Err(PromptError::UnresolvedVariable {
                                key: key.to_string(),
                                name: name.to_string(),
                            });
                        }
                    }
                }
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    let _ = chars.peek();
    Ok(out)
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> PromptVariables {
        let mut custom = HashMap::new();
        custom.insert("role".to_string(), "Reviewer".to_string());
        custom.insert("goal".to_string(), "find bugs".to_string());
        custom.insert("backstory".to_string(), "a careful reader".to_string());
        PromptVariables {
            custom_variables: custom,
            ..Default::default()
        }
    }

    #[test]
    fn falls_back_to_embedded_system_prompt_when_no_file_present() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = PromptResolver::new(dir.path());
        let resolved = resolver.resolve_system(&vars()).unwrap();
        assert_eq!(resolved.source, PromptSource::Fallback);
        assert!(resolved.content.contains("Reviewer"));
    }

    #[test]
    fn prefers_file_over_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("system.md"), "Custom for {role}.").unwrap();
        let resolver = PromptResolver::new(dir.path());
        let resolved = resolver.resolve_system(&vars()).unwrap();
        assert_eq!(
            resolved.source,
            PromptSource::File(dir.path().join("system.md"))
        );
        assert_eq!(resolved.content, "Custom for Reviewer.");
    }

    #[test]
    fn unresolved_variable_is_an_error_by_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("system.md"), "Hello {missing}.").unwrap();
        let resolver = PromptResolver::new(dir.path());
        let err = resolver.resolve_system(&vars()).unwrap_err();
        assert!(matches!(err, PromptError::UnresolvedVariable { .. }));
    }

    #[test]
    fn strips_valid_yaml_frontmatter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("system.md"),
            "---\nedition: v2\n---\nBody for {role}.",
        )
        .unwrap();
        let resolver = PromptResolver::new(dir.path());
        let resolved = resolver.resolve_system(&vars()).unwrap();
        assert_eq!(resolved.content, "Body for Reviewer.");
        assert!(resolved.frontmatter.is_some());
    }

    #[test]
    fn uv_prefixed_variables_resolve_through_uv_map() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("system.md"), "Value: {uv-token}").unwrap();
        let resolver = PromptResolver::new(dir.path());
        let mut v = vars();
        v.uv_variables.insert("token".to_string(), "abc123".to_string());
        let resolved = resolver.resolve_system(&v).unwrap();
        assert_eq!(resolved.content, "Value: abc123");
    }
}
