//! Extracting a decision from raw model output.
//!
//! Models wrap JSON in prose and code fences; the extractor scans for
//! the first balanced object literal, respecting string escapes, and
//! the rest of the reply is ignored.

use crate::errors::AgentError;
use crate::types::AgentAction;

/// First balanced `{...}` in the text, or None.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// A parsed and validated decision: the action plus the model's stated
/// reasoning.
#[derive(Debug)]
pub struct ParsedDecision {
    pub action: AgentAction,
    pub reasoning: String,
}

/// Parse raw model output into a validated decision.
pub fn parse_decision(raw: &str) -> Result<ParsedDecision, AgentError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| AgentError::InvalidDecision("no JSON object in reply".into()))?;
    let mut value: serde_json::Value = serde_json::from_str(json)
        .map_err(|err| AgentError::InvalidDecision(format!("malformed JSON: {err}")))?;

    let reasoning = value
        .as_object_mut()
        .and_then(|obj| obj.remove("reasoning"))
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();

    let action: AgentAction = serde_json::from_value(value)
        .map_err(|err| AgentError::InvalidDecision(format!("unrecognized action: {err}")))?;
    action.validate()?;

    Ok(ParsedDecision { action, reasoning })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_from_fenced_prose() {
        let raw = "Sure, here is my decision:\n```json\n{\"action\": \"wait\", \"ms\": 500}\n```\nDone.";
        assert_eq!(
            extract_json_object(raw),
            Some("{\"action\": \"wait\", \"ms\": 500}")
        );
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_matching() {
        let raw = r#"{"action": "finish", "summary": "clicked the {weird} button"}"#;
        assert_eq!(extract_json_object(raw), Some(raw));
    }

    #[test]
    fn unbalanced_text_yields_none() {
        assert_eq!(extract_json_object("{\"a\": 1"), None);
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn parse_pulls_reasoning_out() {
        let parsed = parse_decision(
            r#"{"action": "navigate", "url": "https://example.com", "reasoning": "start at the homepage"}"#,
        )
        .map_err(|e| e.to_string())
        .unwrap();
        assert_eq!(parsed.reasoning, "start at the homepage");
        assert_eq!(parsed.action.name(), "navigate");
    }

    #[test]
    fn invalid_shape_is_distinguished_from_no_json() {
        let no_json = parse_decision("I refuse to answer.").unwrap_err();
        assert!(no_json.to_string().contains("no JSON object"));

        let bad_shape = parse_decision(r#"{"action": "fly"}"#).unwrap_err();
        assert!(bad_shape.to_string().contains("unrecognized action"));
    }

    #[test]
    fn semantic_validation_runs_after_parse() {
        let err = parse_decision(r#"{"action": "scroll", "dx": 0, "dy": 0}"#).unwrap_err();
        assert!(err.to_string().contains("non-zero"));
    }
}
