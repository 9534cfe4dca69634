//! Structured error types for the overlay engine.
//!
//! `EngineError` provides pattern-matchable errors for the few operations
//! that can genuinely fail. Most runtime failures (missing elements, backend
//! outages) are recovered locally and never surface as errors; see the
//! orchestrator for the fallback paths.
//!
//! # The Error Boundary Rule
//!
//! > **No internal error text ever reaches the overlay.**
//!
//! When a failure has to be shown to the user, the notification content comes
//! from [`EngineError::safe_message`], never from `Display`.
//!
//! # Example
//!
//! ```ignore
//! use overlay_engine::{EngineError, StateMachine};
//!
//! match machine.transition("qualityGreat", ()) {
//!     Ok(()) => {}
//!     Err(EngineError::UnknownState { name }) => eprintln!("not registered: {}", name),
//!     Err(e) => eprintln!("other engine error: {}", e),
//! }
//! ```

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

/// Result type for overlay engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

// =============================================================================
// Error Category
// =============================================================================

/// Coarse category of an engine error.
///
/// # Exposure Rules
///
/// - `Programming`: caller referenced something that was never registered
/// - `Host`: the host page did not contain what the configuration promised
/// - `Remote`: backend or storage failure, NEVER expose details
/// - `Configuration`: invalid settings, safe to expose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller referenced an unregistered state or similar contract breach.
    Programming,
    /// Expected host element is missing.
    Host,
    /// Backend or storage failure.
    Remote,
    /// Invalid configuration.
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Programming => write!(f, "programming_error"),
            ErrorCategory::Host => write!(f, "host_error"),
            ErrorCategory::Remote => write!(f, "remote_error"),
            ErrorCategory::Configuration => write!(f, "configuration_error"),
        }
    }
}

// =============================================================================
// Engine Error
// =============================================================================

/// Structured error type for overlay engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A transition referenced a state name that was never registered.
    #[error("unknown state: {name}")]
    UnknownState {
        /// The requested state name.
        name: String,
    },

    /// A selector from the host configuration matched nothing.
    #[error("element not found for selector {selector}")]
    ElementNotFound {
        /// The selector that was queried.
        selector: String,
    },

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The analysis backend failed (network, non-2xx status, bad payload).
    #[error("backend error: {0}")]
    Backend(String),

    /// The key-value store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Create an unknown-state error.
    pub fn unknown_state(name: impl Into<String>) -> Self {
        EngineError::UnknownState { name: name.into() }
    }

    /// Return the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::UnknownState { .. } => ErrorCategory::Programming,
            EngineError::ElementNotFound { .. } => ErrorCategory::Host,
            EngineError::Config(_) => ErrorCategory::Configuration,
            EngineError::Backend(_) | EngineError::Storage(_) => ErrorCategory::Remote,
            EngineError::Serialization(_) => ErrorCategory::Remote,
        }
    }

    /// Return a sanitized message suitable for the overlay.
    ///
    /// Only configuration errors expose their details.
    pub fn safe_message(&self) -> Cow<'static, str> {
        match self {
            EngineError::Config(msg) => format!("Invalid settings: {}", msg).into(),
            EngineError::ElementNotFound { .. } => "The chat input could not be found".into(),
            EngineError::Backend(_) | EngineError::Serialization(_) => {
                "The analysis service is unavailable right now".into()
            }
            EngineError::Storage(_) => "Settings could not be loaded".into(),
            EngineError::UnknownState { .. } => "Something went wrong".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_state_display() {
        let err = EngineError::unknown_state("qualityGreat");
        assert!(err.to_string().contains("unknown state"));
        assert!(err.to_string().contains("qualityGreat"));
        assert_eq!(err.category(), ErrorCategory::Programming);
    }

    #[test]
    fn test_error_is_pattern_matchable() {
        let err = EngineError::ElementNotFound {
            selector: "#prompt-textarea".into(),
        };

        match &err {
            EngineError::ElementNotFound { selector } => {
                assert_eq!(selector, "#prompt-textarea");
            }
            _ => panic!("Expected ElementNotFound"),
        }
    }

    #[test]
    fn test_remote_errors_never_leak_details() {
        let err = EngineError::Backend("connection refused to 10.0.0.7:8443".into());
        let msg = err.safe_message();
        assert!(!msg.contains("10.0.0.7"));
        assert_eq!(err.category(), ErrorCategory::Remote);

        let err = EngineError::Storage("quota exceeded for key auth_token".into());
        assert!(!err.safe_message().contains("auth_token"));
    }

    #[test]
    fn test_config_error_exposes_details() {
        let err = EngineError::Config("poll_interval_ms must be greater than zero".into());
        assert!(err.safe_message().contains("poll_interval_ms"));
        assert_eq!(
            err.to_string(),
            "invalid configuration: poll_interval_ms must be greater than zero"
        );
    }

    #[test]
    fn test_serialization_error_from_serde() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: EngineError = parse.unwrap_err().into();
        assert!(matches!(err, EngineError::Serialization(_)));
        assert_eq!(err.category().to_string(), "remote_error");
    }
}
