//! Error types for the session layer.

use thiserror::Error;

/// Errors surfaced by the browser driver and session manager.
#[derive(Debug, Error, Clone)]
pub enum DriverError {
    /// Browser process could not be started. Fatal, never retried here.
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// Navigation did not complete.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The page handle refers to a closed target.
    #[error("page is closed")]
    PageClosed,

    /// A previously tagged element is no longer reachable.
    #[error("element no longer attached: {0}")]
    ElementGone(String),

    /// Low-level CDP transport failure.
    #[error("cdp i/o failure: {0}")]
    Cdp(String),

    /// Injected script failed or returned an unexpected shape.
    #[error("script evaluation failed: {0}")]
    Script(String),

    /// A per-operation deadline elapsed.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Identity state could not be read or written.
    #[error("identity state persistence failed: {0}")]
    Persistence(String),
}

impl DriverError {
    /// Timeouts and transport hiccups are worth one more attempt;
    /// launch failures and detached elements are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriverError::Timeout(_) | DriverError::Cdp(_) | DriverError::PageClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(DriverError::Timeout("nav".into()).is_retryable());
        assert!(DriverError::Cdp("socket".into()).is_retryable());
        assert!(!DriverError::Launch("no chrome".into()).is_retryable());
        assert!(!DriverError::ElementGone("#btn".into()).is_retryable());
    }
}
