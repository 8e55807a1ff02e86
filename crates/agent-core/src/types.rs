//! Agent states, actions, and run records.

use crate::errors::AgentError;
use browser_session::TextScope;
use chrono::{DateTime, Utc};
use element_locator::ElementQuery;
use serde::{Deserialize, Serialize};
use webpilot_core_types::RunId;

/// Lifecycle of one run. `Completed` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Initializing,
    Running,
    Completed,
    Failed,
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Completed | AgentState::Failed)
    }
}

/// Element reference as the model expresses it; converted into a
/// locator query before resolution.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TargetSpec {
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl TargetSpec {
    pub fn is_empty(&self) -> bool {
        self.selector.is_none()
            && self.role.is_none()
            && self.text.is_none()
            && self.description.is_none()
    }

    pub fn to_query(&self, scope: TextScope) -> ElementQuery {
        ElementQuery {
            selector: self.selector.clone(),
            role: self.role.clone(),
            name: self.name.clone(),
            text: self.text.clone(),
            scope,
            description: self.description.clone(),
        }
    }
}

/// Closed set of actions the model may request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentAction {
    Navigate {
        url: String,
    },
    Click {
        target: TargetSpec,
    },
    Type {
        target: TargetSpec,
        /// Literal text to type.
        #[serde(default)]
        text: Option<String>,
        /// A question whose answer should be typed instead, resolved
        /// through the qa cache.
        #[serde(default)]
        question: Option<String>,
    },
    Scroll {
        #[serde(default)]
        dx: f64,
        #[serde(default)]
        dy: f64,
    },
    Wait {
        ms: u64,
    },
    Finish {
        summary: String,
    },
}

/// Longest wait the model is allowed to request.
pub const MAX_WAIT_MS: u64 = 30_000;

impl AgentAction {
    pub fn name(&self) -> &'static str {
        match self {
            AgentAction::Navigate { .. } => "navigate",
            AgentAction::Click { .. } => "click",
            AgentAction::Type { .. } => "type",
            AgentAction::Scroll { .. } => "scroll",
            AgentAction::Wait { .. } => "wait",
            AgentAction::Finish { .. } => "finish",
        }
    }

    /// Shape checks beyond what deserialization enforces.
    pub fn validate(&self) -> Result<(), AgentError> {
        match self {
            AgentAction::Navigate { url } => {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(AgentError::InvalidDecision(format!(
                        "navigate url must be absolute http(s), got {url:?}"
                    )));
                }
            }
            AgentAction::Click { target } => {
                if target.is_empty() {
                    return Err(AgentError::InvalidDecision(
                        "click requires a non-empty target".into(),
                    ));
                }
            }
            AgentAction::Type {
                target,
                text,
                question,
            } => {
                if target.is_empty() {
                    return Err(AgentError::InvalidDecision(
                        "type requires a non-empty target".into(),
                    ));
                }
                match (text, question) {
                    (Some(_), None) | (None, Some(_)) => {}
                    _ => {
                        return Err(AgentError::InvalidDecision(
                            "type requires exactly one of text or question".into(),
                        ))
                    }
                }
            }
            AgentAction::Scroll { dx, dy } => {
                if *dx == 0.0 && *dy == 0.0 {
                    return Err(AgentError::InvalidDecision(
                        "scroll requires a non-zero delta".into(),
                    ));
                }
            }
            AgentAction::Wait { ms } => {
                if *ms == 0 || *ms > MAX_WAIT_MS {
                    return Err(AgentError::InvalidDecision(format!(
                        "wait must be between 1 and {MAX_WAIT_MS} ms"
                    )));
                }
            }
            AgentAction::Finish { .. } => {}
        }
        Ok(())
    }
}

/// One recorded step of the loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Decision {
    pub step: u32,
    pub action: AgentAction,
    pub reasoning: String,
    pub at: DateTime<Utc>,
    /// None means the action succeeded; otherwise the error text.
    pub error: Option<String>,
}

/// Final record of a run, serializable for reporting.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub goal: String,
    pub state: AgentState,
    pub steps_taken: u32,
    pub decisions: Vec<Decision>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub final_url: Option<String>,
    /// Base64 PNG of the last capture taken before the run ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_screenshot_b64: Option<String>,
    pub summary: Option<String>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(AgentState::Completed.is_terminal());
        assert!(AgentState::Failed.is_terminal());
        assert!(!AgentState::Running.is_terminal());
    }

    #[test]
    fn tagged_action_deserializes() {
        let action: AgentAction = serde_json::from_str(
            r#"{"action": "click", "target": {"text": "Sign in"}}"#,
        )
        .map_err(|e| e.to_string())
        .unwrap();
        assert_eq!(action.name(), "click");
        assert!(action.validate().is_ok());
    }

    #[test]
    fn unknown_action_is_rejected_at_parse() {
        let result: Result<AgentAction, _> =
            serde_json::from_str(r#"{"action": "teleport"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn type_requires_exactly_one_payload() {
        let both: AgentAction = serde_json::from_str(
            r##"{"action": "type", "target": {"selector": "#q"}, "text": "a", "question": "b"}"##,
        )
        .unwrap();
        assert!(both.validate().is_err());

        let neither: AgentAction =
            serde_json::from_str(r##"{"action": "type", "target": {"selector": "#q"}}"##).unwrap();
        assert!(neither.validate().is_err());

        let question: AgentAction = serde_json::from_str(
            r##"{"action": "type", "target": {"selector": "#q"}, "question": "Your age?"}"##,
        )
        .unwrap();
        assert!(question.validate().is_ok());
    }

    #[test]
    fn relative_navigate_url_is_invalid() {
        let action = AgentAction::Navigate {
            url: "/dashboard".into(),
        };
        assert!(action.validate().is_err());
    }

    #[test]
    fn excessive_wait_is_invalid() {
        assert!(AgentAction::Wait { ms: 60_000 }.validate().is_err());
        assert!(AgentAction::Wait { ms: 500 }.validate().is_ok());
    }
}
