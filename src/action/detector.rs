//! Action Detector (L3): scans assistant text for fenced, typed JSON action
//! blocks (spec §4.4). Grounded in the ReAct-style lexical scanning used for
//! Thought/Action/Action-Input parsing, adapted to fenced JSON blocks.

use regex::Regex;
use serde_json::Value;

use crate::action::types::DetectedAction;

/// Scan `text` for ` ```<output_format> ... ``` ` blocks containing a JSON
/// object with a `type` field in `allowed_types`. Blocks that are not valid
/// JSON, have no `type`, or have a `type` outside `allowed_types` are
/// silently dropped — they are free-form commentary, not actions.
pub fn detect(text: &str, output_format: &str, allowed_types: &[String]) -> Vec<DetectedAction> {
    let pattern = format!(
        r"```{}\s*\n([\s\S]*?)\n```",
        regex::escape(output_format)
    );
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    let mut actions = Vec::new();
    for captures in re.captures_iter(text) {
        let raw_block = captures.get(0).map(|m| m.as_str()).unwrap_or_default();
        let body = match captures.get(1) {
            Some(m) => m.as_str(),
            None => continue,
        };

        let parsed: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(_) => continue,
        };

        let Some(obj) = parsed.as_object() else {
            continue;
        };

        let Some(action_type) = obj.get("type").and_then(Value::as_str) else {
            continue;
        };

        if !allowed_types.iter().any(|t| t == action_type) {
            continue;
        }

        let content = obj.get("content").and_then(Value::as_str).map(str::to_string);

        let metadata = obj
            .iter()
            .filter(|(k, _)| k.as_str() != "type" && k.as_str() != "content")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        actions.push(DetectedAction {
            action_type: action_type.to_string(),
            content,
            metadata,
            raw: raw_block.to_string(),
        });
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types() -> Vec<String> {
        vec!["log".to_string(), "issue-action".to_string()]
    }

    #[test]
    fn detects_single_valid_block() {
        let text = "Here is my plan.\n```action\n{\"type\": \"log\", \"content\": \"did a thing\"}\n```\nDone.";
        let actions = detect(text, "action", &types());
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, "log");
        assert_eq!(actions[0].content.as_deref(), Some("did a thing"));
    }

    #[test]
    fn drops_malformed_json_silently() {
        let text = "```action\n{not json}\n```";
        assert!(detect(text, "action", &types()).is_empty());
    }

    #[test]
    fn drops_unknown_type_silently() {
        let text = "```action\n{\"type\": \"nuke\", \"content\": \"x\"}\n```";
        assert!(detect(text, "action", &types()).is_empty());
    }

    #[test]
    fn metadata_excludes_type_and_content() {
        let text = "```action\n{\"type\": \"issue-action\", \"content\": \"c\", \"action\": \"close\", \"issue\": 42}\n```";
        let actions = detect(text, "action", &types());
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].metadata.len(), 2);
        assert_eq!(actions[0].metadata.get("issue").unwrap(), &Value::from(42));
    }

    #[test]
    fn detects_multiple_blocks_in_detection_order() {
        let text = "```action\n{\"type\": \"log\", \"content\": \"first\"}\n```\nmore text\n```action\n{\"type\": \"log\", \"content\": \"second\"}\n```";
        let actions = detect(text, "action", &types());
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].content.as_deref(), Some("first"));
        assert_eq!(actions[1].content.as_deref(), Some("second"));
    }
}
