//! Prompt assembly for the decide step.

use crate::types::Decision;

/// Context for one prompt.
pub struct PromptContext<'a> {
    pub goal: &'a str,
    /// Externally supplied profile or context data (user details,
    /// preferences) the model may draw on while acting.
    pub profile: Option<&'a str>,
    pub url: &'a str,
    pub title: &'a str,
    pub step: u32,
    pub max_steps: u32,
    pub recent: &'a [Decision],
    /// Set when focus just moved to a newly opened page.
    pub popup_note: bool,
}

/// Build the user prompt: goal, page context, and the tail of the
/// decision history so the model sees what it already tried.
pub fn build_prompt(ctx: &PromptContext<'_>) -> String {
    let mut out = String::with_capacity(512);
    out.push_str(&format!("Goal: {}\n", ctx.goal));
    if let Some(profile) = ctx.profile {
        out.push_str(&format!("Profile context: {profile}\n"));
    }
    out.push_str(&format!("Current URL: {}\n", ctx.url));
    if !ctx.title.is_empty() {
        out.push_str(&format!("Page title: {}\n", ctx.title));
    }
    out.push_str(&format!("Step {} of {}\n", ctx.step, ctx.max_steps));
    if ctx.popup_note {
        out.push_str("Note: a new tab or popup just opened and now has focus.\n");
    }

    if ctx.recent.is_empty() {
        out.push_str("No actions taken yet.\n");
    } else {
        out.push_str("Recent actions:\n");
        for decision in ctx.recent {
            let outcome = match &decision.error {
                None => "ok".to_string(),
                Some(err) => format!("failed: {err}"),
            };
            out.push_str(&format!(
                "  {}. {} ({}) -> {}\n",
                decision.step,
                decision.action.name(),
                decision.reasoning,
                outcome
            ));
        }
    }

    out.push_str("Decide the next action.\n");
    out
}
