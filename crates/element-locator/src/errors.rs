//! Locator error types.

use browser_session::DriverError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocatorError {
    /// Every strategy was tried and none produced a verified match.
    #[error("no element found for {query}")]
    NotFound { query: String },

    /// The underlying driver failed mid-resolution.
    #[error("driver failure during resolution: {0}")]
    Driver(#[from] DriverError),

    /// The vision locator failed outright (not "no match").
    #[error("vision locator failed: {0}")]
    Vision(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_query() {
        let err = LocatorError::NotFound {
            query: "text \"Submit\"".into(),
        };
        assert!(err.to_string().contains("Submit"));
    }
}
