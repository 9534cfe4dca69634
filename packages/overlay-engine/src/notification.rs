//! Notification values and their presentation seam.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stable identifier of a notification. Re-submitting the same id replaces
/// the earlier entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotificationId(String);

impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotificationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Notification priority. Ordering is `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Highest first.
    pub const DESCENDING: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub(crate) fn index(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// A short-lived advisory message shown in the overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub priority: Priority,
    pub content: String,
    /// `None` means persistent: it stays until removed or preempted.
    pub duration: Option<Duration>,
}

impl Notification {
    /// A persistent notification. Chain [`Notification::with_duration`] to
    /// make it expire.
    pub fn new(
        id: impl Into<NotificationId>,
        priority: Priority,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            priority,
            content: content.into(),
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_duration_ms(self, ms: u64) -> Self {
        self.with_duration(Duration::from_millis(ms))
    }

    pub fn persistent(mut self) -> Self {
        self.duration = None;
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.duration.is_none()
    }
}

/// Renders the active notification.
///
/// The scheduler calls these only after its own state is settled, so an
/// implementation may query the scheduler freely.
pub trait NotificationPresenter {
    fn show(&self, notification: &Notification);
    fn hide(&self, id: &NotificationId);
}
