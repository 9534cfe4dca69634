//! Notifications raised by the orchestrator, and once-per-kind failure logging.

use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::EngineError;
use crate::notification::{Notification, Priority};
use crate::quality::QualityMetrics;

use super::OrchestratorInner;

pub const WELCOME_ID: &str = "welcome";
pub const EMPTY_PROMPT_ID: &str = "empty-prompt";
pub const QUALITY_TIP_ID: &str = "quality-tip";
pub const QUALITY_BREAKDOWN_ID: &str = "quality-breakdown";
pub const SUGGESTIONS_ID: &str = "suggestions";
pub const REFINE_ERROR_ID: &str = "refine-error";

pub fn welcome() -> Notification {
    Notification::new(
        WELCOME_ID,
        Priority::Low,
        "Prompt Overlay is ready. Click the button next to the chat box for suggestions.",
    )
}

pub fn empty_prompt(duration: Duration) -> Notification {
    Notification::new(EMPTY_PROMPT_ID, Priority::Low, "Type a prompt first.")
        .with_duration(duration)
}

/// Advice naming the weakest axis of a poor prompt.
pub fn quality_tip(metrics: &QualityMetrics, duration: Duration) -> Notification {
    let (axis, _) = metrics.weakest();
    Notification::new(
        QUALITY_TIP_ID,
        Priority::Low,
        format!("Your prompt could use more {}.", axis),
    )
    .with_duration(duration)
}

pub fn quality_breakdown(metrics: &QualityMetrics, duration: Duration) -> Notification {
    Notification::new(QUALITY_BREAKDOWN_ID, Priority::Low, metrics.summary())
        .with_duration(duration)
}

/// Suggestions stay up until dismissed or cleared by an injection.
pub fn suggestions(items: &[String]) -> Notification {
    let content = items
        .iter()
        .map(|s| format!("• {}", s))
        .collect::<Vec<_>>()
        .join("\n");
    Notification::new(SUGGESTIONS_ID, Priority::Medium, content)
}

pub fn refine_error(error: &EngineError, duration: Duration) -> Notification {
    Notification::new(REFINE_ERROR_ID, Priority::High, error.safe_message()).with_duration(duration)
}

/// Remote operations whose failures are logged once at `warn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Preferences,
    Onboarding,
    Quality,
    Suggestions,
    Refine,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Preferences => "preferences",
            FailureKind::Onboarding => "onboarding",
            FailureKind::Quality => "quality",
            FailureKind::Suggestions => "suggestions",
            FailureKind::Refine => "refine",
        };
        f.write_str(name)
    }
}

impl OrchestratorInner {
    /// First failure of each kind is a warning; repeats drop to debug.
    pub(super) fn report_failure(&self, kind: FailureKind, error: &EngineError) {
        let first = self.warned.borrow_mut().insert(kind);
        if first {
            warn!(
                kind = %kind,
                category = %error.category(),
                error = %error,
                "remote call failed, using fallback"
            );
        } else {
            debug!(kind = %kind, error = %error, "remote call failed again");
        }
    }
}
