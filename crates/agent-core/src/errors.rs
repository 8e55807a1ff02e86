//! Agent error types.

use browser_session::DriverError;
use element_locator::LocatorError;
use qa_cache::QaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The reasoning provider failed to produce a decision.
    #[error("reasoning provider failed: {0}")]
    Provider(String),

    /// The model replied but the reply was not a usable decision.
    #[error("invalid decision: {0}")]
    InvalidDecision(String),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error(transparent)]
    Qa(#[from] QaError),

    #[error("report io error: {0}")]
    Report(String),
}
