//! The reasoning provider seam.
//!
//! Everything model-shaped goes through [`ReasoningProvider`], so the
//! loop can run against the HTTP client in production and a scripted
//! mock in tests. Bridges adapt the provider to the vision-locator and
//! qa-answer traits of the lower crates.

use crate::errors::AgentError;
use async_trait::async_trait;
use element_locator::{LocatorError, VisionHit, VisionLocator};
use parking_lot::Mutex;
use qa_cache::{AnswerProvider, QaError};
use std::collections::VecDeque;
use std::sync::Arc;

/// One perception snapshot sent to the model.
#[derive(Clone, Debug)]
pub struct ReasoningRequest {
    /// Full textual prompt: goal, page context, history.
    pub prompt: String,
    /// Downscaled PNG of the current viewport, when capture succeeded.
    pub screenshot_png: Option<Vec<u8>>,
}

/// Model backend for decisions, coordinate lookups, and free-form
/// answers.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    /// Decide the next action. Returns the raw model reply; parsing
    /// happens in the loop so parse failures share the decide-error
    /// policy.
    async fn decide(&self, request: &ReasoningRequest) -> Result<String, AgentError>;

    /// Find a described target in a screenshot.
    async fn locate(
        &self,
        screenshot_png: &[u8],
        description: &str,
    ) -> Result<Option<VisionHit>, AgentError>;

    /// Answer a free-form question (security prompts, form fields).
    async fn answer(&self, question: &str) -> Result<String, AgentError>;
}

/// Adapts the provider to the locator crate's vision seam.
pub struct VisionBridge {
    provider: Arc<dyn ReasoningProvider>,
}

impl VisionBridge {
    pub fn new(provider: Arc<dyn ReasoningProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl VisionLocator for VisionBridge {
    async fn locate(
        &self,
        screenshot_png: &[u8],
        description: &str,
    ) -> Result<Option<VisionHit>, LocatorError> {
        self.provider
            .locate(screenshot_png, description)
            .await
            .map_err(|err| LocatorError::Vision(err.to_string()))
    }
}

/// Adapts the provider to the qa cache's fallback seam.
pub struct QaBridge {
    provider: Arc<dyn ReasoningProvider>,
}

impl QaBridge {
    pub fn new(provider: Arc<dyn ReasoningProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl AnswerProvider for QaBridge {
    async fn answer(&self, question: &str) -> Result<String, QaError> {
        self.provider
            .answer(question)
            .await
            .map_err(|err| QaError::Provider(err.to_string()))
    }
}

/// Scripted provider for tests: replies are consumed in order, and
/// every prompt is recorded for assertions.
#[derive(Default)]
pub struct MockReasoningProvider {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
    answers: Mutex<VecDeque<String>>,
    hits: Mutex<VecDeque<Option<VisionHit>>>,
}

impl MockReasoningProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, raw: impl Into<String>) -> Self {
        self.replies.lock().push_back(Ok(raw.into()));
        self
    }

    pub fn reply_error(self, message: impl Into<String>) -> Self {
        self.replies.lock().push_back(Err(message.into()));
        self
    }

    pub fn canned_answer(self, answer: impl Into<String>) -> Self {
        self.answers.lock().push_back(answer.into());
        self
    }

    pub fn vision_hit(self, hit: Option<VisionHit>) -> Self {
        self.hits.lock().push_back(hit);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ReasoningProvider for MockReasoningProvider {
    async fn decide(&self, request: &ReasoningRequest) -> Result<String, AgentError> {
        self.prompts.lock().push(request.prompt.clone());
        match self.replies.lock().pop_front() {
            Some(Ok(raw)) => Ok(raw),
            Some(Err(message)) => Err(AgentError::Provider(message)),
            None => Err(AgentError::Provider("mock replies exhausted".into())),
        }
    }

    async fn locate(
        &self,
        _screenshot_png: &[u8],
        _description: &str,
    ) -> Result<Option<VisionHit>, AgentError> {
        Ok(self.hits.lock().pop_front().flatten())
    }

    async fn answer(&self, _question: &str) -> Result<String, AgentError> {
        self.answers
            .lock()
            .pop_front()
            .ok_or_else(|| AgentError::Provider("mock answers exhausted".into()))
    }
}
