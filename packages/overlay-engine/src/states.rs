//! Button state names and the payload carried by transitions.

use crate::quality::QualityMetrics;

pub const IDLE: &str = "idle";
pub const TYPING: &str = "typing";
pub const TYPING_STOPPED: &str = "typingStopped";
pub const LOADING: &str = "loading";
pub const ANALYZING: &str = "analyzing";
pub const SUCCESS_IDLE: &str = "successIdle";
pub const SUCCESS_WITH_REVIEW: &str = "successWithReview";
pub const QUALITY_BAD: &str = "qualityBad";
pub const QUALITY_OK: &str = "qualityOk";
pub const QUALITY_GOOD: &str = "qualityGood";

/// Every state the button can be in.
pub const ALL: [&str; 10] = [
    IDLE,
    TYPING,
    TYPING_STOPPED,
    LOADING,
    ANALYZING,
    SUCCESS_IDLE,
    SUCCESS_WITH_REVIEW,
    QUALITY_BAD,
    QUALITY_OK,
    QUALITY_GOOD,
];

/// States reachable while the injection lock is held.
pub const LOCK_ALLOWED: [&str; 3] = [SUCCESS_IDLE, SUCCESS_WITH_REVIEW, IDLE];

/// Quality states.
pub const QUALITY: [&str; 3] = [QUALITY_BAD, QUALITY_OK, QUALITY_GOOD];

pub fn is_quality(name: &str) -> bool {
    QUALITY.contains(&name)
}

/// Data carried alongside a button transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum StatePayload {
    #[default]
    None,
    /// Scores that produced a quality state.
    Quality(QualityMetrics),
    /// Suggestions offered after an activation.
    Suggestions(Vec<String>),
    /// Text that was just written into the chat field.
    Injected(String),
}

/// Informational transition graph, as registered on the machine.
pub(crate) fn declared_transitions(name: &str) -> &'static [&'static str] {
    match name {
        IDLE => &[TYPING, TYPING_STOPPED, LOADING],
        TYPING => &[IDLE, TYPING_STOPPED],
        TYPING_STOPPED => &[TYPING, IDLE, ANALYZING, LOADING],
        ANALYZING => &[QUALITY_BAD, QUALITY_OK, QUALITY_GOOD, TYPING_STOPPED, TYPING, IDLE],
        LOADING => &[SUCCESS_WITH_REVIEW, SUCCESS_IDLE, TYPING_STOPPED, IDLE],
        SUCCESS_IDLE | SUCCESS_WITH_REVIEW => &[IDLE, TYPING],
        QUALITY_BAD | QUALITY_OK | QUALITY_GOOD => {
            &[TYPING, IDLE, LOADING, QUALITY_BAD, QUALITY_OK, QUALITY_GOOD]
        }
        _ => &[],
    }
}
