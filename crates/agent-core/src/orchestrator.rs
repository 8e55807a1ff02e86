//! The perceive-decide-act loop.
//!
//! Each step captures the focused page, asks the reasoning provider
//! for one action, and executes it through the locator and humanizer.
//! Action failures are recorded and the loop continues; only decide
//! failures after the first step, a dead session, or an exhausted step
//! budget end a run as `Failed`.

use crate::capture;
use crate::errors::AgentError;
use crate::parse::{parse_decision, ParsedDecision};
use crate::prompt::{build_prompt, PromptContext};
use crate::provider::{QaBridge, ReasoningProvider, ReasoningRequest, VisionBridge};
use crate::types::{AgentAction, AgentState, Decision, RunReport};
use base64::Engine;
use browser_session::{DriverError, SessionHandle, SessionManager, TextScope};
use chrono::Utc;
use element_locator::{
    ElementResolver, FallbackResolver, HealingResolver, LocatorConfig, ResolvedTarget,
    SelectorCache,
};
use qa_cache::QaCache;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use stealth::{Humanizer, HumanizerConfig};
use tracing::{info, warn};
use webpilot_core_types::RunId;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Hard cap on loop iterations per run.
    pub max_steps: u32,
    /// How many trailing decisions go into each prompt.
    pub history_window: usize,
    /// Captures wider than this are downscaled before upload.
    pub capture_max_width: u32,
    /// Synthetic wait length when the first decide attempt fails.
    pub retry_wait_ms: u64,
    /// Fixed pause between steps, applied regardless of outcome.
    pub step_delay_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 20,
            history_window: 5,
            capture_max_width: 1024,
            retry_wait_ms: 2_000,
            step_delay_ms: 500,
        }
    }
}

/// Drives runs against a session.
pub struct Orchestrator {
    session: Arc<SessionManager>,
    provider: Arc<dyn ReasoningProvider>,
    resolver: Arc<dyn ElementResolver>,
    humanizer: Arc<Humanizer>,
    qa: Option<Arc<QaCache>>,
    config: AgentConfig,
}

impl Orchestrator {
    /// Default wiring: healing resolver with the provider as the
    /// vision fallback, and a stock humanizer.
    pub fn new(
        session: Arc<SessionManager>,
        provider: Arc<dyn ReasoningProvider>,
        config: AgentConfig,
    ) -> Self {
        let fallback = FallbackResolver::new(LocatorConfig::default())
            .with_vision(Arc::new(VisionBridge::new(provider.clone())));
        let resolver = Arc::new(HealingResolver::new(
            Arc::new(fallback),
            Arc::new(SelectorCache::new()),
        ));
        Self {
            session,
            provider,
            resolver,
            humanizer: Arc::new(Humanizer::new(HumanizerConfig::default())),
            qa: None,
            config,
        }
    }

    pub fn with_humanizer(mut self, humanizer: Arc<Humanizer>) -> Self {
        self.humanizer = humanizer;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ElementResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_qa_cache(mut self, cache: Arc<QaCache>) -> Self {
        self.qa = Some(cache);
        self
    }

    /// Run one goal to completion. Errors are folded into the report
    /// rather than returned, so callers always get the full record.
    pub async fn run(&self, goal: &str) -> RunReport {
        self.run_with_context(goal, None).await
    }

    /// Like [`run`](Self::run), with externally supplied profile or
    /// context data included in every prompt.
    pub async fn run_with_context(&self, goal: &str, profile: Option<&str>) -> RunReport {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let mut state = AgentState::Initializing;
        let mut decisions: Vec<Decision> = Vec::new();
        let mut error = None;
        let mut summary = None;
        let mut final_url = None;
        let mut final_screenshot = None;
        let mut steps_taken = 0;
        let mut last_page_count = 0usize;
        info!(run_id = %run_id, goal, "run starting");

        'run: {
            match self.session.acquire().await {
                Ok(_) => state = AgentState::Running,
                Err(err) => {
                    state = AgentState::Failed;
                    error = Some(format!("session unavailable: {err}"));
                    break 'run;
                }
            }

            for step in 1..=self.config.max_steps {
                steps_taken = step;
                let handle = match self.session.acquire().await {
                    Ok(handle) => handle,
                    Err(err) => {
                        state = AgentState::Failed;
                        error = Some(format!("session lost: {err}"));
                        break 'run;
                    }
                };

                let page_count = match handle.browser.pages().await {
                    Ok(pages) => pages.len(),
                    Err(_) => last_page_count,
                };
                let popup_note = step > 1 && page_count > last_page_count;
                last_page_count = page_count;

                let url = handle.page.current_url().await.unwrap_or_default();
                let title = handle.page.title().await.unwrap_or_default();
                let screenshot = match handle.page.screenshot().await {
                    Ok(png) => Some(capture::downscale(png, self.config.capture_max_width)),
                    Err(err) => {
                        warn!(step, error = %err, "capture failed; deciding without a screenshot");
                        None
                    }
                };

                let recent_start = decisions
                    .len()
                    .saturating_sub(self.config.history_window);
                let prompt = build_prompt(&PromptContext {
                    goal,
                    profile,
                    url: &url,
                    title: &title,
                    step,
                    max_steps: self.config.max_steps,
                    recent: &decisions[recent_start..],
                    popup_note,
                });
                let request = ReasoningRequest {
                    prompt,
                    screenshot_png: screenshot.as_ref().map(|c| c.png.clone()),
                };

                let decided = match self.provider.decide(&request).await {
                    Ok(raw) => parse_decision(&raw),
                    Err(err) => Err(err),
                };
                let parsed = match decided {
                    Ok(parsed) => parsed,
                    Err(err) if step == 1 => {
                        // The very first decision gets one grace
                        // period; pages often settle during it.
                        warn!(error = %err, "first decision failed; waiting before retry");
                        ParsedDecision {
                            action: AgentAction::Wait {
                                ms: self.config.retry_wait_ms,
                            },
                            reasoning: format!("retrying after decide error: {err}"),
                        }
                    }
                    Err(err) => {
                        state = AgentState::Failed;
                        error = Some(err.to_string());
                        break 'run;
                    }
                };

                info!(
                    step,
                    action = parsed.action.name(),
                    reasoning = %parsed.reasoning,
                    "decided"
                );

                if let AgentAction::Finish { summary: text } = &parsed.action {
                    summary = Some(text.clone());
                    decisions.push(Decision {
                        step,
                        action: parsed.action.clone(),
                        reasoning: parsed.reasoning,
                        at: Utc::now(),
                        error: None,
                    });
                    final_url = handle.page.current_url().await.ok();
                    final_screenshot = screenshot.as_ref().map(|c| {
                        base64::engine::general_purpose::STANDARD.encode(&c.png)
                    });
                    state = AgentState::Completed;
                    if let Err(err) = self.session.save().await {
                        warn!(error = %err, "identity persistence after completion failed");
                    }
                    break 'run;
                }

                let outcome = self.perform(&handle, &parsed.action).await;
                let action_error = outcome.err().map(|err| err.to_string());
                if let Some(err) = &action_error {
                    warn!(step, error = %err, "action failed; continuing");
                    // Give the page a moment to settle before the next
                    // look at it.
                    self.humanizer.pause(&self.humanizer.config().generic).await;
                }
                decisions.push(Decision {
                    step,
                    action: parsed.action,
                    reasoning: parsed.reasoning,
                    at: Utc::now(),
                    error: action_error,
                });
                final_url = handle.page.current_url().await.ok();
                if self.config.step_delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(self.config.step_delay_ms)).await;
                }
            }

            state = AgentState::Failed;
            error = Some(format!(
                "step budget of {} exhausted",
                self.config.max_steps
            ));
        }

        info!(run_id = %run_id, state = ?state, steps = steps_taken, "run finished");
        RunReport {
            run_id,
            goal: goal.to_string(),
            state,
            steps_taken,
            decisions,
            started_at,
            finished_at: Utc::now(),
            final_url,
            final_screenshot_b64: final_screenshot,
            summary,
            error,
        }
    }

    async fn perform(
        &self,
        handle: &SessionHandle,
        action: &AgentAction,
    ) -> Result<(), AgentError> {
        let page = handle.page.as_ref();
        match action {
            AgentAction::Navigate { url } => {
                page.navigate(url, self.session.config().nav_timeout())
                    .await?;
                self.humanizer
                    .pause(&self.humanizer.config().navigation)
                    .await;
            }
            AgentAction::Click { target } => {
                let query = target.to_query(TextScope::Clickable);
                let resolved = self.resolver.resolve(page, &query).await?;
                match resolved.target {
                    ResolvedTarget::Handle(el) => {
                        let bbox = page
                            .bounding_box(&el)
                            .await?
                            .ok_or_else(|| DriverError::ElementGone(el.0.clone()))?;
                        self.humanizer.click(page, bbox.center(), Some(&el)).await?;
                    }
                    ResolvedTarget::Coordinates(point) => {
                        self.humanizer.click(page, point, None).await?;
                    }
                }
            }
            AgentAction::Type {
                target,
                text,
                question,
            } => {
                let query = target.to_query(TextScope::Fields);
                let resolved = self.resolver.resolve(page, &query).await?;
                let value = match (text, question) {
                    (Some(text), _) => text.clone(),
                    (None, Some(question)) => self.answer_question(question).await?,
                    (None, None) => {
                        return Err(AgentError::InvalidDecision(
                            "type action carried no payload".into(),
                        ))
                    }
                };
                match resolved.target {
                    ResolvedTarget::Handle(el) => page.focus(&el).await?,
                    ResolvedTarget::Coordinates(point) => {
                        self.humanizer.click(page, point, None).await?;
                    }
                }
                self.humanizer.type_text(page, &value).await?;
            }
            AgentAction::Scroll { dx, dy } => {
                self.humanizer.scroll(page, *dx, *dy).await?;
                self.humanizer.pause(&self.humanizer.config().reading).await;
            }
            AgentAction::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            AgentAction::Finish { .. } => {}
        }
        Ok(())
    }

    async fn answer_question(&self, question: &str) -> Result<String, AgentError> {
        match &self.qa {
            Some(cache) => {
                let bridge = QaBridge::new(self.provider.clone());
                Ok(cache.query_with_fallback(question, &bridge).await?)
            }
            None => self.provider.answer(question).await,
        }
    }
}

/// Serialize a run report as pretty JSON.
pub async fn write_report(report: &RunReport, path: &Path) -> Result<(), AgentError> {
    let bytes = serde_json::to_vec_pretty(report)
        .map_err(|err| AgentError::Report(err.to_string()))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| AgentError::Report(err.to_string()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|err| AgentError::Report(err.to_string()))?;
    Ok(())
}
